use std::collections::HashSet;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use iced::alignment::Vertical;
use iced::widget::{Button, Column, Container, Row, Scrollable, Space, Text};
use iced::{Color, Element, Length};
use mongodb::bson::Bson;

use crate::Message;
use crate::mongo::schema::bson_type_name;

const BINARY_PREVIEW_BYTES: usize = 12;

/// Expandable key/value/type table over a set of BSON documents. Serves
/// both the documents view and the per-stage result panels; the caller maps
/// node toggles onto its own message variant.
#[derive(Debug, Clone)]
pub struct DocTree {
    roots: Vec<DocNode>,
    expanded: HashSet<usize>,
}

#[derive(Debug, Clone)]
struct DocNode {
    id: usize,
    key: Option<String>,
    kind: DocKind,
}

#[derive(Debug, Clone)]
enum DocKind {
    Document(Vec<DocNode>),
    Array(Vec<DocNode>),
    Value { display: String, ty: &'static str },
}

struct DocRowEntry<'a> {
    depth: usize,
    node: &'a DocNode,
    expanded: bool,
}

#[derive(Default)]
struct IdGenerator {
    next_id: usize,
}

impl IdGenerator {
    fn next(&mut self) -> usize {
        let current = self.next_id;
        self.next_id += 1;
        current
    }
}

impl DocNode {
    fn from_bson(key: Option<String>, value: &Bson, id: &mut IdGenerator) -> Self {
        let id_value = id.next();
        match value {
            Bson::Document(map) => {
                let children =
                    map.iter().map(|(k, v)| DocNode::from_bson(Some(k.clone()), v, id)).collect();
                Self { id: id_value, key, kind: DocKind::Document(children) }
            }
            Bson::Array(items) => {
                let children = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| DocNode::from_bson(Some(format!("[{index}]")), item, id))
                    .collect();
                Self { id: id_value, key, kind: DocKind::Array(children) }
            }
            other => Self {
                id: id_value,
                key,
                kind: DocKind::Value { display: scalar_display(other), ty: bson_type_name(other) },
            },
        }
    }

    fn is_container(&self) -> bool {
        matches!(self.kind, DocKind::Document(_) | DocKind::Array(_))
    }

    fn children(&self) -> Option<&[DocNode]> {
        match &self.kind {
            DocKind::Document(children) | DocKind::Array(children) => Some(children),
            _ => None,
        }
    }

    fn display_key(&self) -> String {
        self.key.clone().unwrap_or_else(|| String::from("value"))
    }

    fn value_display(&self) -> String {
        match &self.kind {
            DocKind::Document(children) => format!("Document ({} fields)", children.len()),
            DocKind::Array(children) => format!("Array ({} items)", children.len()),
            DocKind::Value { display, .. } => display.clone(),
        }
    }

    fn type_label(&self) -> &'static str {
        match &self.kind {
            DocKind::Document(_) => "Document",
            DocKind::Array(_) => "Array",
            DocKind::Value { ty, .. } => ty,
        }
    }
}

fn scalar_display(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Boolean(b) => b.to_string(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        Bson::Double(f) => {
            if f.is_finite() {
                format!("{f}")
            } else {
                format!("Double({f})")
            }
        }
        Bson::Decimal128(d) => format!("Decimal128(\"{d}\")"),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(iso) => iso,
            Err(_) => format!("DateTime({})", dt.timestamp_millis()),
        },
        Bson::ObjectId(oid) => format!("ObjectId(\"{oid}\")"),
        Bson::Binary(bin) => {
            let preview_len = bin.bytes.len().min(BINARY_PREVIEW_BYTES);
            let preview = BASE64_STANDARD.encode(&bin.bytes[..preview_len]);
            let ellipsis = if bin.bytes.len() > preview_len { "…" } else { "" };
            format!("Binary(\"{preview}{ellipsis}\", {} bytes)", bin.bytes.len())
        }
        Bson::Symbol(sym) => format!("Symbol({sym:?})"),
        Bson::RegularExpression(regex) => {
            if regex.options.is_empty() {
                format!("Regex({:?})", regex.pattern)
            } else {
                format!("Regex({:?}, {:?})", regex.pattern, regex.options)
            }
        }
        Bson::Timestamp(ts) => format!("Timestamp(time={}, increment={})", ts.time, ts.increment),
        Bson::JavaScriptCode(code) => format!("Code({code:?})"),
        Bson::JavaScriptCodeWithScope(code_with_scope) => format!(
            "CodeWithScope({:?}, scope_fields={})",
            code_with_scope.code,
            code_with_scope.scope.len()
        ),
        Bson::DbPointer(ptr) => format!("DbPointer({ptr:?})"),
        Bson::Undefined => String::from("undefined"),
        Bson::Null => String::from("null"),
        Bson::MinKey => String::from("MinKey"),
        Bson::MaxKey => String::from("MaxKey"),
        Bson::Document(_) | Bson::Array(_) => unreachable!("containers handled separately"),
    }
}

impl Default for DocTree {
    fn default() -> Self {
        Self::from_values(&[])
    }
}

impl DocTree {
    pub fn from_values(values: &[Bson]) -> Self {
        let mut id_gen = IdGenerator::default();
        let mut roots = Vec::new();

        if values.is_empty() {
            let info_value = Bson::String(String::from("No documents found"));
            let placeholder =
                DocNode::from_bson(Some(String::from("info")), &info_value, &mut id_gen);
            roots.push(placeholder);
        } else {
            for (index, value) in values.iter().enumerate() {
                let key = match value {
                    Bson::Document(doc) => doc
                        .get("_id")
                        .map(Self::summarize_id)
                        .unwrap_or_else(|| format!("doc[{index}]")),
                    _ => format!("doc[{index}]"),
                };
                roots.push(DocNode::from_bson(Some(key), value, &mut id_gen));
            }
        }

        Self { roots, expanded: HashSet::new() }
    }

    pub fn from_error(message: String) -> Self {
        let value = Bson::String(message);
        let mut id_gen = IdGenerator::default();
        let root = DocNode::from_bson(Some(String::from("error")), &value, &mut id_gen);
        Self { roots: vec![root], expanded: HashSet::new() }
    }

    pub fn toggle(&mut self, node_id: usize) {
        if self.expanded.contains(&node_id) {
            self.expanded.remove(&node_id);
        } else if self.is_container(node_id) {
            self.expanded.insert(node_id);
        }
    }

    pub fn view(&self, on_toggle: &dyn Fn(usize) -> Message) -> Element<'_, Message> {
        let mut rows = Vec::new();
        self.collect_rows(&mut rows, &self.roots, 0);

        let row_color_a = Color::from_rgb8(0xfe, 0xfe, 0xfe);
        let row_color_b = Color::from_rgb8(0xf9, 0xfd, 0xf9);
        let header_bg = Color::from_rgb8(0xef, 0xf1, 0xf5);
        let separator_color = Color::from_rgb8(0xd0, 0xd4, 0xda);

        let header_row = Row::new()
            .spacing(0)
            .align_y(Vertical::Center)
            .width(Length::Fill)
            .push(
                Container::new(Text::new("Key").size(14))
                    .width(Length::FillPortion(4))
                    .padding([6, 8]),
            )
            .push(column_separator(separator_color))
            .push(
                Container::new(Text::new("Value").size(14))
                    .width(Length::FillPortion(5))
                    .padding([6, 8]),
            )
            .push(column_separator(separator_color))
            .push(
                Container::new(Text::new("Type").size(14))
                    .width(Length::FillPortion(3))
                    .padding([6, 8]),
            );

        let header =
            Container::new(header_row).width(Length::Fill).style(move |_| iced::widget::container::Style {
                background: Some(header_bg.into()),
                ..Default::default()
            });

        let mut body = Column::new().spacing(1).width(Length::Fill);

        for (index, DocRowEntry { depth, node, expanded }) in rows.into_iter().enumerate() {
            let background = if index % 2 == 0 { row_color_a } else { row_color_b };

            let mut key_row = Row::new().spacing(6).align_y(Vertical::Center);
            key_row = key_row.push(Space::new().width(Length::Fixed((depth as f32) * 16.0)));

            if node.is_container() {
                let indicator = if expanded { "▼" } else { "▶" };
                let toggle = Button::new(Text::new(indicator))
                    .padding([0, 4])
                    .on_press(on_toggle(node.id));
                key_row = key_row.push(toggle);
            } else {
                key_row = key_row.push(Space::new().width(Length::Fixed(18.0)));
            }

            key_row = key_row.push(Text::new(node.display_key()).size(14));

            let key_cell = Container::new(key_row).width(Length::FillPortion(4)).padding([6, 8]);
            let value_cell = Container::new(Text::new(node.value_display()).size(14))
                .width(Length::FillPortion(5))
                .padding([6, 8]);
            let type_cell = Container::new(Text::new(node.type_label()).size(14))
                .width(Length::FillPortion(3))
                .padding([6, 8]);

            let row_content = Row::new()
                .spacing(0)
                .align_y(Vertical::Center)
                .width(Length::Fill)
                .push(key_cell)
                .push(column_separator(separator_color))
                .push(value_cell)
                .push(column_separator(separator_color))
                .push(type_cell);

            let row = Container::new(row_content).width(Length::Fill).style(move |_| {
                iced::widget::container::Style {
                    background: Some(background.into()),
                    ..Default::default()
                }
            });

            body = body.push(row);
        }

        let body_container =
            Container::new(body).width(Length::Fill).style(move |_| iced::widget::container::Style {
                background: Some(header_bg.into()),
                ..Default::default()
            });

        Column::new()
            .spacing(2)
            .push(header)
            .push(Scrollable::new(body_container).width(Length::Fill))
            .into()
    }

    fn collect_rows<'a>(
        &'a self,
        rows: &mut Vec<DocRowEntry<'a>>,
        nodes: &'a [DocNode],
        depth: usize,
    ) {
        for node in nodes {
            let expanded = self.expanded.contains(&node.id);
            rows.push(DocRowEntry { depth, node, expanded });
            if node.is_container() && expanded {
                if let Some(children) = node.children() {
                    self.collect_rows(rows, children, depth + 1);
                }
            }
        }
    }

    fn summarize_id(value: &Bson) -> String {
        match value {
            Bson::Document(_) | Bson::Array(_) => format!("{value:?}"),
            _ => scalar_display(value),
        }
    }

    fn is_container(&self, node_id: usize) -> bool {
        Self::find_node(&self.roots, node_id).map(DocNode::is_container).unwrap_or(false)
    }

    fn find_node(nodes: &[DocNode], node_id: usize) -> Option<&DocNode> {
        for node in nodes {
            if node.id == node_id {
                return Some(node);
            }

            if let Some(children) = node.children() {
                if let Some(found) = Self::find_node(children, node_id) {
                    return Some(found);
                }
            }
        }

        None
    }
}

fn column_separator<'a>(color: Color) -> Container<'a, Message> {
    Container::new(Space::new().width(Length::Fixed(1.0)))
        .width(Length::Fixed(1.0))
        .padding([6, 0])
        .style(move |_| iced::widget::container::Style {
            background: Some(color.into()),
            ..Default::default()
        })
}
