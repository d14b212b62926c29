use mongodb::bson::Bson;
use serde_json::Value;
use uuid::Uuid;

use crate::mongo::ValueState;

/// Stable identity of a pipeline stage. Async query completions are routed
/// by this id rather than by list position, so a response still finds its
/// slot (or is dropped) after the list has been edited underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(Uuid);

impl StageId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

pub const STAGE_OPERATORS: &[StageOperator] = &[
    StageOperator::AddFields,
    StageOperator::Bucket,
    StageOperator::BucketAuto,
    StageOperator::CollStats,
    StageOperator::Count,
    StageOperator::Documents,
    StageOperator::Facet,
    StageOperator::GeoNear,
    StageOperator::GraphLookup,
    StageOperator::Group,
    StageOperator::IndexStats,
    StageOperator::Limit,
    StageOperator::Lookup,
    StageOperator::Match,
    StageOperator::Merge,
    StageOperator::Out,
    StageOperator::Project,
    StageOperator::Redact,
    StageOperator::ReplaceWith,
    StageOperator::ReplaceRoot,
    StageOperator::Sample,
    StageOperator::Search,
    StageOperator::SearchMeta,
    StageOperator::Set,
    StageOperator::Skip,
    StageOperator::Sort,
    StageOperator::SortByCount,
    StageOperator::UnionWith,
    StageOperator::Unset,
    StageOperator::Unwind,
];

/// The closed set of aggregation stage operators offered by the builder.
/// Static configuration, not discovered from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOperator {
    AddFields,
    Bucket,
    BucketAuto,
    CollStats,
    Count,
    Documents,
    Facet,
    GeoNear,
    GraphLookup,
    Group,
    IndexStats,
    Limit,
    Lookup,
    Match,
    Merge,
    Out,
    Project,
    Redact,
    ReplaceWith,
    ReplaceRoot,
    Sample,
    Search,
    SearchMeta,
    Set,
    Skip,
    Sort,
    SortByCount,
    UnionWith,
    Unset,
    Unwind,
}

impl StageOperator {
    pub const fn tag(self) -> &'static str {
        match self {
            StageOperator::AddFields => "$addFields",
            StageOperator::Bucket => "$bucket",
            StageOperator::BucketAuto => "$bucketAuto",
            StageOperator::CollStats => "$collStats",
            StageOperator::Count => "$count",
            StageOperator::Documents => "$documents",
            StageOperator::Facet => "$facet",
            StageOperator::GeoNear => "$geoNear",
            StageOperator::GraphLookup => "$graphLookup",
            StageOperator::Group => "$group",
            StageOperator::IndexStats => "$indexStats",
            StageOperator::Limit => "$limit",
            StageOperator::Lookup => "$lookup",
            StageOperator::Match => "$match",
            StageOperator::Merge => "$merge",
            StageOperator::Out => "$out",
            StageOperator::Project => "$project",
            StageOperator::Redact => "$redact",
            StageOperator::ReplaceWith => "$replaceWith",
            StageOperator::ReplaceRoot => "$replaceRoot",
            StageOperator::Sample => "$sample",
            StageOperator::Search => "$search",
            StageOperator::SearchMeta => "$searchMeta",
            StageOperator::Set => "$set",
            StageOperator::Skip => "$skip",
            StageOperator::Sort => "$sort",
            StageOperator::SortByCount => "$sortByCount",
            StageOperator::UnionWith => "$unionWith",
            StageOperator::Unset => "$unset",
            StageOperator::Unwind => "$unwind",
        }
    }
}

impl Default for StageOperator {
    fn default() -> Self {
        StageOperator::Match
    }
}

impl std::fmt::Display for StageOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A stage body keeps the raw text exactly as typed so no keystroke is ever
/// lost, plus the canonical re-serialized form whenever the raw text
/// currently parses as JSON. Queries submit the canonical form when present
/// and fall back to the raw text otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageBody {
    raw: String,
    canonical: Option<String>,
}

impl StageBody {
    pub fn new<S: Into<String>>(text: S) -> Self {
        let raw = text.into();
        let canonical = canonicalize_json(&raw);
        Self { raw, canonical }
    }

    pub fn set(&mut self, text: String) {
        self.canonical = canonicalize_json(&text);
        self.raw = text;
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn canonical(&self) -> Option<&str> {
        self.canonical.as_deref()
    }

    pub fn is_valid(&self) -> bool {
        self.canonical.is_some()
    }

    /// The text a query submits for this stage.
    pub fn as_submitted(&self) -> &str {
        self.canonical.as_deref().unwrap_or(&self.raw)
    }
}

impl Default for StageBody {
    fn default() -> Self {
        Self::new("{}")
    }
}

fn canonicalize_json(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    serde_json::to_string(&value).ok()
}

#[derive(Debug, Clone)]
pub struct StageInput {
    pub id: StageId,
    pub operator: StageOperator,
    pub body: StageBody,
    pub collapsed: bool,
}

impl StageInput {
    fn default_stage(id: StageId) -> Self {
        Self { id, operator: StageOperator::default(), body: StageBody::default(), collapsed: false }
    }
}

#[derive(Debug, Clone)]
pub struct StageOutput {
    pub id: StageId,
    pub state: ValueState,
    pub documents: Vec<Bson>,
    pub error: Option<String>,
}

impl StageOutput {
    fn empty(id: StageId) -> Self {
        Self { id, state: ValueState::Unloaded, documents: Vec::new(), error: None }
    }
}

/// One stage of a prefix query: the operator tag plus the body text as it
/// will be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageQuerySpec {
    pub operator: StageOperator,
    pub body: String,
}

/// The cumulative sub-pipeline for one stage panel: stages `0..=i` of the
/// input list, keyed by the stage whose panel displays the result.
#[derive(Debug, Clone)]
pub struct PrefixQuery {
    pub stage_id: StageId,
    pub stages: Vec<StageQuerySpec>,
}

/// Ordered stage inputs with an index-aligned output list. Every mutation
/// replaces whole entries, so the render layer only ever observes complete
/// snapshots; inputs and outputs at the same index always share a `StageId`.
#[derive(Debug, Clone)]
pub struct PipelineState {
    sample_count: u32,
    inputs: Vec<StageInput>,
    outputs: Vec<StageOutput>,
}

impl PipelineState {
    pub fn new(sample_count: u32) -> Self {
        let id = StageId::new();
        Self {
            sample_count,
            inputs: vec![StageInput::default_stage(id)],
            outputs: vec![StageOutput::empty(id)],
        }
    }

    pub fn inputs(&self) -> &[StageInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[StageOutput] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Negative and unparseable input both clamp to zero.
    pub fn set_sample_count(&mut self, text: &str) {
        self.sample_count = match text.trim().parse::<i64>() {
            Ok(value) => u32::try_from(value.max(0)).unwrap_or(u32::MAX),
            Err(_) => 0,
        };
    }

    pub fn any_loading(&self) -> bool {
        self.outputs.iter().any(|output| output.state.is_loading())
    }

    pub fn add_stage(&mut self) -> StageId {
        let id = StageId::new();
        self.inputs.push(StageInput::default_stage(id));
        self.outputs.push(StageOutput::empty(id));
        debug_assert!(self.is_aligned());
        id
    }

    /// Splices a default stage immediately after the given one. Returns the
    /// new stage's id, or `None` when the anchor no longer exists.
    pub fn insert_after(&mut self, anchor: StageId) -> Option<StageId> {
        let index = self.index_of(anchor)?;
        let id = StageId::new();
        self.inputs.insert(index + 1, StageInput::default_stage(id));
        self.outputs.insert(index + 1, StageOutput::empty(id));
        debug_assert!(self.is_aligned());
        Some(id)
    }

    pub fn delete(&mut self, id: StageId) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        self.inputs.remove(index);
        self.outputs.remove(index);
        debug_assert!(self.is_aligned());
        true
    }

    pub fn set_operator(&mut self, id: StageId, operator: StageOperator) {
        if let Some(stage) = self.input_mut(id) {
            stage.operator = operator;
        }
    }

    pub fn set_body(&mut self, id: StageId, text: String) {
        if let Some(stage) = self.input_mut(id) {
            stage.body.set(text);
        }
    }

    pub fn toggle_collapsed(&mut self, id: StageId) {
        if let Some(stage) = self.input_mut(id) {
            stage.collapsed = !stage.collapsed;
        }
    }

    /// One query per stage, each carrying the cumulative prefix of the
    /// current input list. Collapsed flags do not participate.
    pub fn prefix_queries(&self) -> Vec<PrefixQuery> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(index, stage)| PrefixQuery {
                stage_id: stage.id,
                stages: self.inputs[..=index]
                    .iter()
                    .map(|prefix_stage| StageQuerySpec {
                        operator: prefix_stage.operator,
                        body: prefix_stage.body.as_submitted().to_string(),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Marks every output as in flight and returns the queries to dispatch.
    pub fn begin_refresh(&mut self) -> Vec<PrefixQuery> {
        for output in &mut self.outputs {
            output.state = ValueState::Loading;
            output.error = None;
        }
        self.prefix_queries()
    }

    /// Routes a completion to its slot. A completion whose stage has been
    /// deleted meanwhile finds no slot and reports `false`.
    pub fn complete(&mut self, id: StageId, result: Result<Vec<Bson>, String>) -> bool {
        let Some(output) = self.outputs.iter_mut().find(|output| output.id == id) else {
            return false;
        };
        output.state = ValueState::Loaded;
        match result {
            Ok(documents) => {
                output.documents = documents;
                output.error = None;
            }
            Err(error) => {
                output.documents = Vec::new();
                output.error = Some(error);
            }
        }
        true
    }

    /// Cascade invalidation: drops all cached outputs back to `Unloaded`.
    pub fn invalidate_outputs(&mut self) {
        for output in &mut self.outputs {
            output.state = ValueState::Unloaded;
            output.documents = Vec::new();
            output.error = None;
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.inputs.len() == self.outputs.len()
            && self
                .inputs
                .iter()
                .zip(&self.outputs)
                .all(|(input, output)| input.id == output.id)
    }

    fn index_of(&self, id: StageId) -> Option<usize> {
        self.inputs.iter().position(|stage| stage.id == id)
    }

    fn input_mut(&mut self, id: StageId) -> Option<&mut StageInput> {
        self.inputs.iter_mut().find(|stage| stage.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_spec() -> StageQuerySpec {
        StageQuerySpec { operator: StageOperator::Match, body: String::from("{}") }
    }

    #[test]
    fn new_pipeline_holds_one_default_stage() {
        let pipeline = PipelineState::new(2);
        assert_eq!(pipeline.len(), 1);
        assert!(pipeline.is_aligned());

        let stage = &pipeline.inputs()[0];
        assert_eq!(stage.operator, StageOperator::Match);
        assert_eq!(stage.body.raw(), "{}");
        assert!(!stage.collapsed);

        let output = &pipeline.outputs()[0];
        assert_eq!(output.state, ValueState::Unloaded);
        assert!(output.documents.is_empty());
    }

    #[test]
    fn lists_stay_aligned_through_edit_sequences() {
        let mut pipeline = PipelineState::new(2);
        let first = pipeline.inputs()[0].id;

        let second = pipeline.add_stage();
        assert!(pipeline.is_aligned());

        let inserted = pipeline.insert_after(first).expect("anchor exists");
        assert!(pipeline.is_aligned());
        assert_eq!(pipeline.len(), 3);

        assert!(pipeline.delete(second));
        assert!(pipeline.is_aligned());
        assert_eq!(pipeline.len(), 2);

        assert!(pipeline.delete(inserted));
        assert!(pipeline.delete(first));
        assert!(pipeline.is_aligned());
        assert!(pipeline.is_empty());

        pipeline.add_stage();
        assert!(pipeline.is_aligned());
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn insert_after_splices_at_the_following_position() {
        let mut pipeline = PipelineState::new(2);
        let first = pipeline.inputs()[0].id;
        let second = pipeline.add_stage();
        let third = pipeline.add_stage();

        let inserted = pipeline.insert_after(second).expect("anchor exists");

        let order: Vec<StageId> = pipeline.inputs().iter().map(|stage| stage.id).collect();
        assert_eq!(order, vec![first, second, inserted, third]);
        assert_eq!(pipeline.len(), 4);
        assert!(pipeline.is_aligned());
    }

    #[test]
    fn insert_after_missing_anchor_is_a_no_op() {
        let mut pipeline = PipelineState::new(2);
        let ghost = pipeline.inputs()[0].id;
        pipeline.delete(ghost);

        assert!(pipeline.insert_after(ghost).is_none());
        assert!(pipeline.is_empty());
    }

    #[test]
    fn body_canonicalization_is_a_fixed_point() {
        let mut body = StageBody::default();
        body.set(String::from("{ \"a\" : 1,\n \"b\": [1, 2] }"));
        let once = body.as_submitted().to_string();

        body.set(once.clone());
        assert_eq!(body.as_submitted(), once);
        assert_eq!(body.canonical(), Some(once.as_str()));
    }

    #[test]
    fn invalid_body_text_is_kept_verbatim() {
        let mut body = StageBody::new("{\"a\": 1}");
        assert!(body.is_valid());

        body.set(String::from("{\"a\":"));
        assert!(!body.is_valid());
        assert_eq!(body.raw(), "{\"a\":");
        assert_eq!(body.as_submitted(), "{\"a\":");
        assert_eq!(body.canonical(), None);
    }

    #[test]
    fn valid_body_submits_the_canonical_form() {
        let mut pipeline = PipelineState::new(2);
        let id = pipeline.inputs()[0].id;

        pipeline.set_body(id, String::from("{ \"score\": { \"$gt\": 3 } }"));
        let stage = &pipeline.inputs()[0];
        assert_eq!(stage.body.raw(), "{ \"score\": { \"$gt\": 3 } }");
        assert_eq!(stage.body.as_submitted(), "{\"score\":{\"$gt\":3}}");
    }

    #[test]
    fn prefix_queries_replay_the_cumulative_pipeline() {
        let mut pipeline = PipelineState::new(5);
        pipeline.add_stage();

        let queries = pipeline.prefix_queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].stages, vec![default_spec()]);
        assert_eq!(queries[1].stages, vec![default_spec(), default_spec()]);
        assert_eq!(queries[0].stage_id, pipeline.inputs()[0].id);
        assert_eq!(queries[1].stage_id, pipeline.inputs()[1].id);
    }

    #[test]
    fn collapsed_stages_still_participate_in_prefixes() {
        let mut pipeline = PipelineState::new(2);
        let first = pipeline.inputs()[0].id;
        pipeline.add_stage();
        pipeline.toggle_collapsed(first);

        let queries = pipeline.prefix_queries();
        assert_eq!(queries[1].stages.len(), 2);
    }

    #[test]
    fn refresh_marks_every_output_loading() {
        let mut pipeline = PipelineState::new(2);
        pipeline.add_stage();

        let queries = pipeline.begin_refresh();
        assert_eq!(queries.len(), 2);
        assert!(pipeline.any_loading());
        assert!(pipeline.outputs().iter().all(|output| output.state.is_loading()));
    }

    #[test]
    fn completion_routes_by_stage_id_not_position() {
        let mut pipeline = PipelineState::new(2);
        let first = pipeline.inputs()[0].id;
        let second = pipeline.add_stage();
        pipeline.begin_refresh();

        // Delete the first stage while both queries are in flight; the
        // second stage's response must land in its own slot even though its
        // position shifted.
        pipeline.delete(first);
        assert!(pipeline.complete(second, Ok(vec![Bson::Int32(7)])));

        let output = &pipeline.outputs()[0];
        assert_eq!(output.id, second);
        assert_eq!(output.state, ValueState::Loaded);
        assert_eq!(output.documents, vec![Bson::Int32(7)]);
    }

    #[test]
    fn completion_for_deleted_stage_is_dropped() {
        let mut pipeline = PipelineState::new(2);
        let first = pipeline.inputs()[0].id;
        pipeline.begin_refresh();
        pipeline.delete(first);

        assert!(!pipeline.complete(first, Ok(vec![Bson::Int32(1)])));
        assert!(pipeline.is_empty());
    }

    #[test]
    fn failed_query_clears_loading_and_records_the_error() {
        let mut pipeline = PipelineState::new(2);
        let id = pipeline.inputs()[0].id;
        pipeline.begin_refresh();

        assert!(pipeline.complete(id, Err(String::from("boom"))));
        let output = &pipeline.outputs()[0];
        assert!(!output.state.is_loading());
        assert_eq!(output.error.as_deref(), Some("boom"));
        assert!(output.documents.is_empty());
    }

    #[test]
    fn invalidation_resets_outputs_regardless_of_prior_state() {
        let mut pipeline = PipelineState::new(2);
        let id = pipeline.inputs()[0].id;
        pipeline.begin_refresh();
        pipeline.complete(id, Ok(vec![Bson::Int32(1)]));

        pipeline.invalidate_outputs();
        let output = &pipeline.outputs()[0];
        assert_eq!(output.state, ValueState::Unloaded);
        assert!(output.documents.is_empty());
        assert!(output.error.is_none());
    }

    #[test]
    fn negative_sample_count_clamps_to_zero() {
        let mut pipeline = PipelineState::new(2);
        pipeline.set_sample_count("-3");
        assert_eq!(pipeline.sample_count(), 0);
    }

    #[test]
    fn unparseable_sample_count_clamps_to_zero() {
        let mut pipeline = PipelineState::new(2);
        pipeline.set_sample_count("nope");
        assert_eq!(pipeline.sample_count(), 0);

        pipeline.set_sample_count("");
        assert_eq!(pipeline.sample_count(), 0);
    }

    #[test]
    fn sample_count_accepts_plain_integers() {
        let mut pipeline = PipelineState::new(2);
        pipeline.set_sample_count(" 12 ");
        assert_eq!(pipeline.sample_count(), 12);
    }

    #[test]
    fn operator_edit_touches_nothing_else() {
        let mut pipeline = PipelineState::new(2);
        let id = pipeline.inputs()[0].id;
        pipeline.set_body(id, String::from("{\"x\":1}"));

        pipeline.set_operator(id, StageOperator::Group);
        let stage = &pipeline.inputs()[0];
        assert_eq!(stage.operator, StageOperator::Group);
        assert_eq!(stage.body.as_submitted(), "{\"x\":1}");
        assert_eq!(pipeline.outputs()[0].state, ValueState::Unloaded);
    }

    #[test]
    fn operator_tags_cover_the_closed_set() {
        assert_eq!(STAGE_OPERATORS.len(), 30);
        assert!(STAGE_OPERATORS.iter().all(|operator| operator.tag().starts_with('$')));
        assert_eq!(StageOperator::default().tag(), "$match");
    }
}
