use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::{self, Bson, Document, doc};
use mongodb::sync::Client;
use serde_json::Value;

use crate::mongo::pipeline::StageQuerySpec;

/// Turns stage specs into driver documents. Bodies are JSON text; a body
/// that does not parse fails the whole pipeline with a message naming the
/// offending stage.
pub fn build_pipeline(stages: &[StageQuerySpec]) -> Result<Vec<Document>, String> {
    stages
        .iter()
        .enumerate()
        .map(|(index, stage)| {
            let value: Value = serde_json::from_str(&stage.body).map_err(|error| {
                format!(
                    "stage {number} ({tag}): JSON parse error: {error}",
                    number = index + 1,
                    tag = stage.operator.tag()
                )
            })?;
            let body = bson::to_bson(&value).map_err(|error| {
                format!(
                    "stage {number} ({tag}): BSON conversion error: {error}",
                    number = index + 1,
                    tag = stage.operator.tag()
                )
            })?;
            Ok(doc! { stage.operator.tag(): body })
        })
        .collect()
}

/// Executes one cumulative prefix of the pipeline. The sample count caps
/// the result via a trailing `$limit`; zero short-circuits without touching
/// the server.
pub fn run_stage_query(
    client: Arc<Client>,
    db_name: String,
    collection_name: String,
    stages: Vec<StageQuerySpec>,
    sample_count: u32,
    timeout: Option<Duration>,
) -> Result<Vec<Bson>, String> {
    if sample_count == 0 {
        return Ok(Vec::new());
    }

    let mut pipeline = build_pipeline(&stages)?;
    pipeline.push(doc! { "$limit": i64::from(sample_count) });

    let collection = client.database(&db_name).collection::<Document>(&collection_name);
    let mut action = collection.aggregate(pipeline);
    if let Some(timeout) = timeout {
        action = action.max_time(timeout);
    }

    let cursor = action.run().map_err(|err| err.to_string())?;

    let mut documents = Vec::new();
    for result in cursor {
        let document = result.map_err(|err| err.to_string())?;
        documents.push(Bson::Document(document));
    }

    Ok(documents)
}

pub fn run_find_query(
    client: Arc<Client>,
    db_name: String,
    collection_name: String,
    filter: Document,
    skip: u64,
    limit: u64,
    timeout: Option<Duration>,
) -> Result<Vec<Bson>, String> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let collection = client.database(&db_name).collection::<Document>(&collection_name);

    let mut action = collection.find(filter);
    if skip > 0 {
        action = action.skip(skip);
    }

    let limit_capped = limit.min(i64::MAX as u64) as i64;
    action = action.limit(limit_capped);
    if let Some(timeout) = timeout {
        action = action.max_time(timeout);
    }

    let cursor = action.run().map_err(|err| err.to_string())?;

    let mut documents = Vec::new();
    for result in cursor.into_iter().take(limit_capped as usize) {
        let document = result.map_err(|err| err.to_string())?;
        documents.push(Bson::Document(document));
    }

    Ok(documents)
}

/// Pulls a random sample of documents for schema summarization.
pub fn run_schema_sample(
    client: Arc<Client>,
    db_name: String,
    collection_name: String,
    sample_size: u32,
    timeout: Option<Duration>,
) -> Result<Vec<Document>, String> {
    if sample_size == 0 {
        return Ok(Vec::new());
    }

    let pipeline = vec![doc! { "$sample": { "size": i64::from(sample_size) } }];

    let collection = client.database(&db_name).collection::<Document>(&collection_name);
    let mut action = collection.aggregate(pipeline);
    if let Some(timeout) = timeout {
        action = action.max_time(timeout);
    }

    let cursor = action.run().map_err(|err| err.to_string())?;

    let mut documents = Vec::new();
    for result in cursor {
        documents.push(result.map_err(|err| err.to_string())?);
    }

    Ok(documents)
}
