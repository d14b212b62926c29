use std::collections::HashMap;

use iced::alignment::Vertical;
use iced::widget::pick_list::PickList;
use iced::widget::{Button, Column, Container, Row, Text, text_input};
use iced::{Color, Element, Length, border};

use crate::Message;
use crate::mongo::ValueState;
use crate::mongo::pipeline::{PipelineState, STAGE_OPERATORS, StageId, StageInput, StageOutput};
use crate::ui::doc_tree::DocTree;

/// The aggregation builder: sample-count toolbar, one card per stage with
/// its cumulative result panel, and the trailing Add-stage button.
pub fn view<'a>(
    pipeline: &'a PipelineState,
    stage_trees: &'a HashMap<StageId, DocTree>,
) -> Element<'a, Message> {
    let busy = pipeline.any_loading();
    let sample_value = pipeline.sample_count().to_string();

    let mut sample_input =
        text_input("count", &sample_value).padding([4, 6]).width(Length::Fixed(64.0));
    if !busy {
        sample_input = sample_input.on_input(Message::SampleCountChanged);
    }

    let refresh_button = Button::new(Text::new("Refresh").size(14))
        .padding([4, 12])
        .on_press_maybe((!busy).then_some(Message::RefreshPressed));

    let toolbar = Row::new()
        .spacing(8)
        .align_y(Vertical::Center)
        .push(Text::new("Sample count").size(14))
        .push(sample_input)
        .push(refresh_button);

    let mut stages = Column::new().spacing(8).width(Length::Fill);

    for (input, output) in pipeline.inputs().iter().zip(pipeline.outputs()) {
        stages = stages.push(stage_card(input, output, stage_trees));
    }

    let add_button = Button::new(Text::new("Add stage").size(14))
        .padding([4, 12])
        .on_press(Message::StageAdded);

    Column::new()
        .spacing(10)
        .push(toolbar)
        .push(stages)
        .push(add_button)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

fn stage_card<'a>(
    input: &'a StageInput,
    output: &'a StageOutput,
    stage_trees: &'a HashMap<StageId, DocTree>,
) -> Element<'a, Message> {
    let id = input.id;
    let loading = output.state.is_loading();

    let collapse_label = if input.collapsed { "Expand" } else { "Collapse" };
    let collapse_button = Button::new(Text::new(collapse_label).size(14))
        .padding([4, 8])
        .on_press_maybe((!loading).then_some(Message::StageToggled(id)));

    let operator_picker = PickList::new(STAGE_OPERATORS, Some(input.operator), move |operator| {
        Message::StageOperatorPicked(id, operator)
    })
    .text_size(14);

    let delete_button = Button::new(Text::new("Delete").size(14))
        .padding([4, 8])
        .on_press_maybe((!loading).then_some(Message::StageDeleted(id)));

    let insert_button = Button::new(Text::new("+").size(14))
        .padding([4, 10])
        .on_press(Message::StageInserted(id));

    let header = Row::new()
        .spacing(4)
        .align_y(Vertical::Center)
        .width(Length::Fill)
        .push(collapse_button)
        .push(operator_picker)
        .push(iced::widget::Space::new().width(Length::Fill))
        .push(delete_button)
        .push(insert_button);

    let mut card = Column::new().spacing(6).width(Length::Fill).push(header);

    if !input.collapsed {
        let body_input = text_input("{}", input.body.raw())
            .on_input(move |text| Message::StageBodyChanged(id, text))
            .padding([4, 6])
            .width(Length::Fill);

        card = card.push(body_input);

        if !input.body.is_valid() {
            card = card.push(Text::new("invalid JSON, stage will fail on Refresh").size(12));
        }

        card = card.push(result_panel(output, stage_trees));
    }

    let card_border = Color::from_rgb8(0xd0, 0xd4, 0xda);

    Container::new(card)
        .width(Length::Fill)
        .padding(10)
        .style(move |_| iced::widget::container::Style {
            border: border::rounded(6).width(1).color(card_border),
            ..Default::default()
        })
        .into()
}

fn result_panel<'a>(
    output: &'a StageOutput,
    stage_trees: &'a HashMap<StageId, DocTree>,
) -> Element<'a, Message> {
    let stage_id = output.id;

    match output.state {
        ValueState::Loading => Text::new("Loading…").size(14).into(),
        _ => {
            if let Some(error) = &output.error {
                return Text::new(format!("Query failed: {error}")).size(14).into();
            }

            if output.documents.is_empty() {
                return Text::new("No documents found").size(14).into();
            }

            match stage_trees.get(&stage_id) {
                Some(tree) => tree
                    .view(&move |node_id| Message::StageTreeToggle { stage_id, node_id }),
                None => Text::new("No documents found").size(14).into(),
            }
        }
    }
}
