use iced::alignment::Vertical;
use iced::widget::{Button, Column, Container, Row, Scrollable, Text};
use iced::{Color, Element, Length};
use mongodb::bson::Document;

use crate::Message;
use crate::mongo::ValueState;
use crate::mongo::schema::{SchemaSummary, summarize};

/// Sampled-schema digest of the selected collection, invalidated on
/// collection change like the other dependent views.
#[derive(Debug, Clone, Default)]
pub struct SchemaTabState {
    pub state: ValueState,
    pub summary: SchemaSummary,
    pub error: Option<String>,
    generation: u64,
}

impl SchemaTabState {
    pub fn invalidate(&mut self) {
        self.state = ValueState::Unloaded;
        self.summary = SchemaSummary::default();
        self.error = None;
    }

    pub fn begin_fetch(&mut self) -> u64 {
        self.generation += 1;
        self.state = ValueState::Loading;
        self.error = None;
        self.generation
    }

    pub fn complete(&mut self, generation: u64, result: Result<Vec<Document>, String>) -> bool {
        if generation != self.generation {
            log::debug!("dropping stale schema completion (generation {generation})");
            return false;
        }

        self.state = ValueState::Loaded;
        match result {
            Ok(documents) => {
                self.summary = summarize(&documents);
                self.error = None;
            }
            Err(error) => {
                self.summary = SchemaSummary::default();
                self.error = Some(error);
            }
        }
        true
    }

    pub fn view(&self) -> Element<'_, Message> {
        let resample_button = Button::new(Text::new("Resample").size(14))
            .padding([4, 12])
            .on_press_maybe((!self.state.is_loading()).then_some(Message::SchemaRefresh));

        let status_text = match self.state {
            ValueState::Loading => Some(String::from("Sampling…")),
            ValueState::Loaded => Some(format!("{} documents sampled", self.summary.sampled)),
            ValueState::Unloaded => None,
        };

        let mut toolbar = Row::new().spacing(8).align_y(Vertical::Center).push(resample_button);
        if let Some(status) = status_text {
            toolbar = toolbar.push(Text::new(status).size(14));
        }

        let content: Element<Message> = if self.state.is_loading() {
            Text::new("Loading schema…").size(14).into()
        } else if let Some(error) = &self.error {
            Text::new(format!("Schema sampling failed: {error}")).size(14).into()
        } else if self.summary.fields.is_empty() {
            Text::new("No fields sampled").size(14).into()
        } else {
            self.table()
        };

        Column::new()
            .spacing(8)
            .push(toolbar)
            .push(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn table(&self) -> Element<'_, Message> {
        let row_color_a = Color::from_rgb8(0xfe, 0xfe, 0xfe);
        let row_color_b = Color::from_rgb8(0xf9, 0xfd, 0xf9);
        let header_bg = Color::from_rgb8(0xef, 0xf1, 0xf5);

        let header_row = Row::new()
            .spacing(0)
            .align_y(Vertical::Center)
            .width(Length::Fill)
            .push(
                Container::new(Text::new("Field").size(14))
                    .width(Length::FillPortion(4))
                    .padding([6, 8]),
            )
            .push(
                Container::new(Text::new("Types").size(14))
                    .width(Length::FillPortion(5))
                    .padding([6, 8]),
            )
            .push(
                Container::new(Text::new("Present").size(14))
                    .width(Length::FillPortion(2))
                    .padding([6, 8]),
            );

        let header = Container::new(header_row).width(Length::Fill).style(move |_| {
            iced::widget::container::Style {
                background: Some(header_bg.into()),
                ..Default::default()
            }
        });

        let mut body = Column::new().spacing(1).width(Length::Fill);

        for (index, field) in self.summary.fields.iter().enumerate() {
            let background = if index % 2 == 0 { row_color_a } else { row_color_b };

            let types = field
                .types
                .iter()
                .map(|entry| format!("{} ({})", entry.name, entry.count))
                .collect::<Vec<_>>()
                .join(", ");

            let presence = format!("{}/{}", field.present_in, self.summary.sampled);

            let row_content = Row::new()
                .spacing(0)
                .align_y(Vertical::Center)
                .width(Length::Fill)
                .push(
                    Container::new(Text::new(field.path.clone()).size(14))
                        .width(Length::FillPortion(4))
                        .padding([6, 8]),
                )
                .push(
                    Container::new(Text::new(types).size(14))
                        .width(Length::FillPortion(5))
                        .padding([6, 8]),
                )
                .push(
                    Container::new(Text::new(presence).size(14))
                        .width(Length::FillPortion(2))
                        .padding([6, 8]),
                );

            let row = Container::new(row_content).width(Length::Fill).style(move |_| {
                iced::widget::container::Style {
                    background: Some(background.into()),
                    ..Default::default()
                }
            });

            body = body.push(row);
        }

        Column::new()
            .spacing(2)
            .push(header)
            .push(Scrollable::new(body).width(Length::Fill))
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn completion_builds_the_summary() {
        let mut tab = SchemaTabState::default();
        let generation = tab.begin_fetch();
        assert!(tab.state.is_loading());

        assert!(tab.complete(generation, Ok(vec![doc! { "a": 1 }])));
        assert!(tab.state.is_loaded());
        assert_eq!(tab.summary.sampled, 1);
        assert_eq!(tab.summary.fields.len(), 1);
    }

    #[test]
    fn failure_records_the_error_and_clears_the_summary() {
        let mut tab = SchemaTabState::default();
        let generation = tab.begin_fetch();

        assert!(tab.complete(generation, Err(String::from("boom"))));
        assert_eq!(tab.error.as_deref(), Some("boom"));
        assert_eq!(tab.summary, SchemaSummary::default());
    }

    #[test]
    fn stale_completion_is_dropped() {
        let mut tab = SchemaTabState::default();
        let first = tab.begin_fetch();
        let _second = tab.begin_fetch();

        assert!(!tab.complete(first, Ok(Vec::new())));
        assert!(tab.state.is_loading());
    }

    #[test]
    fn invalidation_resets_everything() {
        let mut tab = SchemaTabState::default();
        let generation = tab.begin_fetch();
        tab.complete(generation, Ok(vec![doc! { "a": 1 }]));

        tab.invalidate();
        assert_eq!(tab.state, ValueState::Unloaded);
        assert_eq!(tab.summary, SchemaSummary::default());
        assert!(tab.error.is_none());
    }
}
