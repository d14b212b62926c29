use std::time::Duration;

use iced::alignment::{Horizontal, Vertical};
use iced::widget::text_editor::{Content as TextEditorContent, TextEditor};
use iced::widget::{Button, Column, Container, Row, Text, text_input};
use iced::{Element, Length};
use mongodb::bson::{self, Bson, Document};
use serde_json::Value;

use crate::Message;
use crate::mongo::ValueState;
use crate::ui::doc_tree::DocTree;

const DEFAULT_RESULT_LIMIT: u64 = 50;
const DEFAULT_RESULT_SKIP: u64 = 0;

/// Find-browser over the selected collection. `state` is the cached-value
/// flag the connection bar invalidates on collection change; `Unloaded`
/// means the next visit refetches.
#[derive(Debug)]
pub struct DocumentsTabState {
    pub state: ValueState,
    pub editor: TextEditorContent,
    pub skip_input: String,
    pub limit_input: String,
    pub tree: DocTree,
    pub last_query_duration: Option<Duration>,
    generation: u64,
}

impl Default for DocumentsTabState {
    fn default() -> Self {
        Self {
            state: ValueState::Unloaded,
            editor: TextEditorContent::with_text(&editor_template(None)),
            skip_input: DEFAULT_RESULT_SKIP.to_string(),
            limit_input: DEFAULT_RESULT_LIMIT.to_string(),
            tree: DocTree::default(),
            last_query_duration: None,
            generation: 0,
        }
    }
}

fn editor_template(collection: Option<&str>) -> String {
    let name = collection.unwrap_or("collection");
    format!("db.getCollection('{name}').find({{}})")
}

impl DocumentsTabState {
    /// Cascade invalidation: back to `Unloaded` with a fresh filter
    /// template for the newly selected collection.
    pub fn invalidate(&mut self, collection: Option<&str>) {
        self.state = ValueState::Unloaded;
        self.editor = TextEditorContent::with_text(&editor_template(collection));
        self.tree = DocTree::default();
        self.last_query_duration = None;
        self.skip_input = DEFAULT_RESULT_SKIP.to_string();
    }

    pub fn begin_fetch(&mut self) -> u64 {
        self.generation += 1;
        self.state = ValueState::Loading;
        self.last_query_duration = None;
        self.generation
    }

    pub fn complete(
        &mut self,
        generation: u64,
        result: Result<Vec<Bson>, String>,
        duration: Duration,
    ) -> bool {
        if generation != self.generation {
            log::debug!("dropping stale documents completion (generation {generation})");
            return false;
        }

        self.state = ValueState::Loaded;
        self.last_query_duration = Some(duration);
        match result {
            Ok(values) => self.tree = DocTree::from_values(&values),
            Err(error) => self.tree = DocTree::from_error(error),
        }
        true
    }

    pub fn set_parse_error(&mut self, error: String) {
        self.state = ValueState::Loaded;
        self.tree = DocTree::from_error(error);
    }

    pub fn update_skip(&mut self, value: String) {
        self.skip_input = sanitize_numeric(&value);
    }

    pub fn update_limit(&mut self, value: String) {
        self.limit_input = sanitize_numeric(&value);
    }

    pub fn decrement_skip_by_limit(&mut self) {
        let limit = self.limit_value();
        if limit == 0 {
            return;
        }
        let skip = self.skip_value().saturating_sub(limit);
        self.skip_input = skip.to_string();
    }

    pub fn increment_skip_by_limit(&mut self) {
        let limit = self.limit_value();
        if limit == 0 {
            return;
        }
        let skip = self.skip_value().saturating_add(limit);
        self.skip_input = skip.to_string();
    }

    pub fn skip_value(&self) -> u64 {
        self.skip_input.parse().unwrap_or(DEFAULT_RESULT_SKIP)
    }

    pub fn limit_value(&self) -> u64 {
        self.limit_input.parse().unwrap_or(DEFAULT_RESULT_LIMIT)
    }

    pub fn parse_filter(&self) -> Result<Document, String> {
        parse_filter_text(&self.editor.text())
    }

    pub fn view(&self) -> Element<'_, Message> {
        let editor_height = 4.0 * 24.0;

        let editor = TextEditor::new(&self.editor)
            .on_action(Message::DocumentsEditorAction)
            .height(Length::Fixed(editor_height));

        let send_button = Button::new(Text::new("Send").size(14))
            .padding([4, 12])
            .on_press_maybe(
                (!self.state.is_loading()).then_some(Message::DocumentsSend),
            );

        let editor_row = Row::new()
            .spacing(0)
            .align_y(Vertical::Center)
            .width(Length::Fill)
            .push(
                Container::new(editor)
                    .width(Length::FillPortion(9))
                    .height(Length::Fixed(editor_height)),
            )
            .push(
                Container::new(send_button)
                    .width(Length::FillPortion(1))
                    .height(Length::Fixed(editor_height))
                    .align_x(Horizontal::Center)
                    .align_y(Vertical::Center),
            );

        let skip_input = text_input("skip", &self.skip_input)
            .padding([4, 6])
            .align_x(Horizontal::Center)
            .on_input(Message::DocumentsSkipChanged)
            .width(Length::Fixed(52.0));

        let limit_input = text_input("limit", &self.limit_input)
            .padding([4, 6])
            .align_x(Horizontal::Center)
            .on_input(Message::DocumentsLimitChanged)
            .width(Length::Fixed(52.0));

        let skip_prev = Button::new(Text::new("◀").size(16))
            .on_press(Message::DocumentsSkipPrev)
            .padding([2, 6]);

        let skip_next = Button::new(Text::new("▶").size(16))
            .on_press(Message::DocumentsSkipNext)
            .padding([2, 6]);

        let duration_text = self
            .last_query_duration
            .map(format_duration)
            .unwrap_or_else(|| String::from("—"));

        let navigation = Row::new()
            .spacing(8)
            .align_y(Vertical::Center)
            .push(skip_prev)
            .push(skip_input)
            .push(limit_input)
            .push(skip_next)
            .push(Text::new(format!("Elapsed: {duration_text}")).size(14));

        let results: Element<Message> = match self.state {
            ValueState::Loading => Text::new("Loading documents…").size(14).into(),
            _ => self.tree.view(&Message::DocumentsTreeToggle),
        };

        Column::new()
            .spacing(8)
            .push(navigation)
            .push(editor_row)
            .push(results)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }
}

/// Accepts a bare JSON object or the shell-ish
/// `db.getCollection('name').find({...})` form; an empty editor means an
/// empty filter.
fn parse_filter_text(text: &str) -> Result<Document, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Document::new());
    }

    let candidate = match extract_find_argument(trimmed) {
        Some(argument) => argument,
        None => trimmed.to_string(),
    };

    let cleaned = candidate.trim().trim_end_matches(';').trim();
    if cleaned.is_empty() {
        return Ok(Document::new());
    }

    let value: Value =
        serde_json::from_str(cleaned).map_err(|error| format!("JSON parse error: {error}"))?;

    if !value.is_object() {
        return Err(String::from("the find filter must be a JSON object"));
    }

    bson::to_document(&value).map_err(|error| format!("BSON conversion error: {error}"))
}

fn extract_find_argument(text: &str) -> Option<String> {
    const MARKER: &str = ".find(";
    let start = text.find(MARKER)? + MARKER.len();
    let mut depth = 0u32;
    let mut end_index = None;

    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    end_index = Some(start + offset);
                    break;
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    let end = end_index?;
    Some(text[start..end].to_string())
}

fn sanitize_numeric(value: &str) -> String {
    let filtered: String = value.chars().filter(|ch| ch.is_ascii_digit()).collect();
    let trimmed = filtered.trim_start_matches('0');
    if trimmed.is_empty() { String::from("0") } else { trimmed.to_string() }
}

fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(60) {
        format!("{:.3}", duration.as_secs_f64())
    } else {
        let total_seconds = duration.as_secs();
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        let tenths = (duration.subsec_millis() / 100) % 10;
        format!("{minutes}:{seconds:02}.{tenths}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn empty_text_means_empty_filter() {
        assert_eq!(parse_filter_text("   "), Ok(Document::new()));
    }

    #[test]
    fn bare_json_objects_are_accepted() {
        let filter = parse_filter_text("{\"age\": {\"$gte\": 21}}").expect("parses");
        assert_eq!(filter, doc! { "age": { "$gte": 21 } });
    }

    #[test]
    fn shell_find_syntax_is_unwrapped() {
        let filter = parse_filter_text("db.getCollection('users').find({\"name\": \"a\"});")
            .expect("parses");
        assert_eq!(filter, doc! { "name": "a" });
    }

    #[test]
    fn shell_find_with_empty_argument_is_an_empty_filter() {
        let filter = parse_filter_text("db.getCollection('users').find({})").expect("parses");
        assert_eq!(filter, Document::new());
    }

    #[test]
    fn non_object_filters_are_rejected() {
        assert!(parse_filter_text("[1, 2]").is_err());
        assert!(parse_filter_text("42").is_err());
    }

    #[test]
    fn numeric_inputs_are_sanitized_to_digits() {
        assert_eq!(sanitize_numeric("12a3"), "123");
        assert_eq!(sanitize_numeric("-5"), "5");
        assert_eq!(sanitize_numeric("007"), "7");
        assert_eq!(sanitize_numeric(""), "0");
        assert_eq!(sanitize_numeric("000"), "0");
    }

    #[test]
    fn paging_moves_skip_by_limit() {
        let mut tab = DocumentsTabState::default();
        tab.update_limit(String::from("25"));

        tab.increment_skip_by_limit();
        assert_eq!(tab.skip_input, "25");
        tab.increment_skip_by_limit();
        assert_eq!(tab.skip_input, "50");

        tab.decrement_skip_by_limit();
        assert_eq!(tab.skip_input, "25");
        tab.decrement_skip_by_limit();
        tab.decrement_skip_by_limit();
        assert_eq!(tab.skip_input, "0");
    }

    #[test]
    fn stale_completion_is_dropped() {
        let mut tab = DocumentsTabState::default();
        let first = tab.begin_fetch();
        let second = tab.begin_fetch();
        assert_ne!(first, second);

        assert!(!tab.complete(first, Ok(Vec::new()), Duration::from_millis(5)));
        assert!(tab.state.is_loading());

        assert!(tab.complete(second, Ok(Vec::new()), Duration::from_millis(5)));
        assert!(tab.state.is_loaded());
    }

    #[test]
    fn invalidation_rewrites_the_template_for_the_new_collection() {
        let mut tab = DocumentsTabState::default();
        tab.state = ValueState::Loaded;

        tab.invalidate(Some("orders"));
        assert_eq!(tab.state, ValueState::Unloaded);
        assert!(tab.editor.text().contains("db.getCollection('orders')"));
    }

    #[test]
    fn duration_formatting_switches_to_minutes_past_sixty_seconds() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.500");
        assert_eq!(format_duration(Duration::from_secs(75)), "1:15.0");
    }
}
