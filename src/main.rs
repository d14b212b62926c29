use std::collections::HashMap;
use std::time::{Duration, Instant};

use iced::alignment::Vertical;
use iced::widget::text_editor::Action as TextEditorAction;
use iced::widget::{Button, Column, Container, Row, Text, button, container, text};
use iced::{Color, Element, Length, Renderer, Task, Theme, application, border};
use iced_aw::menu::{Item as MenuItemWidget, Menu, MenuBar};
use mongodb::bson::{Bson, Document};

mod logging;
mod mongo;
mod settings;
mod ui;

use crate::mongo::ValueState;
use crate::mongo::connection::{self, ConnectionBootstrap};
use crate::mongo::pipeline::{PipelineState, PrefixQuery, StageId, StageOperator};
use crate::mongo::query;
use crate::ui::aggregate;
use crate::ui::connection_bar::ConnectionBarState;
use crate::ui::doc_tree::DocTree;
use crate::ui::documents::DocumentsTabState;
use crate::ui::schema::SchemaTabState;

const DOCUMENTATION_URL: &str =
    "https://www.mongodb.com/docs/manual/core/aggregation-pipeline/";

fn main() -> iced::Result {
    let app_settings = settings::AppSettings::load_or_init();
    logging::apply_settings(
        app_settings.logging_enabled,
        app_settings.logging_level.to_level_filter(),
        &app_settings.logging_path,
    );
    settings::init_global(app_settings);

    application(App::init, App::update, App::view)
        .title("Mongo Scope")
        .theme(App::theme)
        .run()
}

struct App {
    active_tab: WorkTab,
    connection: ConnectionBarState,
    pipeline: PipelineState,
    stage_trees: HashMap<StageId, DocTree>,
    documents: DocumentsTabState,
    schema: SchemaTabState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkTab {
    Documents,
    Aggregate,
    Schema,
}

impl WorkTab {
    const ALL: &'static [WorkTab] = &[WorkTab::Documents, WorkTab::Aggregate, WorkTab::Schema];

    fn label(self) -> &'static str {
        match self {
            WorkTab::Documents => "Documents",
            WorkTab::Aggregate => "Aggregation",
            WorkTab::Schema => "Schema",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TopMenu {
    File,
    View,
    Help,
}

impl TopMenu {
    fn label(self) -> &'static str {
        match self {
            TopMenu::File => "File",
            TopMenu::View => "View",
            TopMenu::Help => "Help",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuEntry {
    Action(&'static str),
}

impl MenuEntry {
    fn label(self) -> &'static str {
        match self {
            MenuEntry::Action(label) => label,
        }
    }
}

#[derive(Debug, Clone)]
enum Message {
    MenuItemSelected(TopMenu, MenuEntry),
    TabSelected(WorkTab),
    HostChanged(String),
    PortChanged(String),
    ConnectPressed,
    ConnectionCompleted { generation: u64, result: Result<ConnectionBootstrap, String> },
    DatabasePicked(String),
    CollectionPicked(String),
    SampleCountChanged(String),
    StageAdded,
    StageInserted(StageId),
    StageDeleted(StageId),
    StageOperatorPicked(StageId, StageOperator),
    StageBodyChanged(StageId, String),
    StageToggled(StageId),
    RefreshPressed,
    StageQueryCompleted { stage_id: StageId, result: Result<Vec<Bson>, String> },
    StageTreeToggle { stage_id: StageId, node_id: usize },
    DocumentsEditorAction(TextEditorAction),
    DocumentsSend,
    DocumentsSkipChanged(String),
    DocumentsLimitChanged(String),
    DocumentsSkipPrev,
    DocumentsSkipNext,
    DocumentsQueryCompleted {
        generation: u64,
        result: Result<Vec<Bson>, String>,
        duration: Duration,
    },
    DocumentsTreeToggle(usize),
    SchemaRefresh,
    SchemaSampleCompleted { generation: u64, result: Result<Vec<Document>, String> },
}

impl App {
    fn init() -> (Self, Task<Message>) {
        let app_settings = settings::global();
        let mut app = Self {
            active_tab: WorkTab::Aggregate,
            connection: ConnectionBarState::new(&app_settings),
            pipeline: PipelineState::new(app_settings.default_sample_count),
            stage_trees: HashMap::new(),
            documents: DocumentsTabState::default(),
            schema: SchemaTabState::default(),
        };
        let connect = app.maybe_connect();
        (app, connect)
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::MenuItemSelected(menu, entry) => self.handle_menu(menu, entry),
            Message::TabSelected(tab) => {
                self.active_tab = tab;
                self.ensure_active_tab_loaded()
            }
            Message::HostChanged(value) => {
                self.connection.host_input = value;
                self.maybe_connect()
            }
            Message::PortChanged(value) => {
                self.connection.port_input = value;
                self.maybe_connect()
            }
            Message::ConnectPressed => {
                self.connection.force_unloaded();
                self.maybe_connect()
            }
            Message::ConnectionCompleted { generation, result } => {
                self.connection.complete_connect(generation, result);
                Task::none()
            }
            Message::DatabasePicked(name) => {
                self.connection.select_database(name);
                Task::none()
            }
            Message::CollectionPicked(name) => {
                if self.connection.select_collection(name) {
                    self.invalidate_dependent_views();
                    self.ensure_active_tab_loaded()
                } else {
                    Task::none()
                }
            }
            Message::SampleCountChanged(value) => {
                self.pipeline.set_sample_count(&value);
                Task::none()
            }
            Message::StageAdded => {
                self.pipeline.add_stage();
                Task::none()
            }
            Message::StageInserted(id) => {
                self.pipeline.insert_after(id);
                Task::none()
            }
            Message::StageDeleted(id) => {
                self.pipeline.delete(id);
                self.stage_trees.remove(&id);
                Task::none()
            }
            Message::StageOperatorPicked(id, operator) => {
                self.pipeline.set_operator(id, operator);
                Task::none()
            }
            Message::StageBodyChanged(id, body) => {
                self.pipeline.set_body(id, body);
                Task::none()
            }
            Message::StageToggled(id) => {
                self.pipeline.toggle_collapsed(id);
                Task::none()
            }
            Message::RefreshPressed => {
                if self.pipeline.any_loading() {
                    Task::none()
                } else {
                    self.start_stage_queries()
                }
            }
            Message::StageQueryCompleted { stage_id, result } => {
                let tree = match &result {
                    Ok(documents) if !documents.is_empty() => {
                        Some(DocTree::from_values(documents))
                    }
                    _ => None,
                };
                if self.pipeline.complete(stage_id, result) {
                    match tree {
                        Some(tree) => {
                            self.stage_trees.insert(stage_id, tree);
                        }
                        None => {
                            self.stage_trees.remove(&stage_id);
                        }
                    }
                }
                Task::none()
            }
            Message::StageTreeToggle { stage_id, node_id } => {
                if let Some(tree) = self.stage_trees.get_mut(&stage_id) {
                    tree.toggle(node_id);
                }
                Task::none()
            }
            Message::DocumentsEditorAction(action) => {
                self.documents.editor.perform(action);
                Task::none()
            }
            Message::DocumentsSend => self.start_documents_query(),
            Message::DocumentsSkipChanged(value) => {
                self.documents.update_skip(value);
                Task::none()
            }
            Message::DocumentsLimitChanged(value) => {
                self.documents.update_limit(value);
                Task::none()
            }
            Message::DocumentsSkipPrev => {
                self.documents.decrement_skip_by_limit();
                self.start_documents_query()
            }
            Message::DocumentsSkipNext => {
                self.documents.increment_skip_by_limit();
                self.start_documents_query()
            }
            Message::DocumentsQueryCompleted { generation, result, duration } => {
                self.documents.complete(generation, result, duration);
                Task::none()
            }
            Message::DocumentsTreeToggle(node_id) => {
                self.documents.tree.toggle(node_id);
                Task::none()
            }
            Message::SchemaRefresh => self.start_schema_sample(),
            Message::SchemaSampleCompleted { generation, result } => {
                self.schema.complete(generation, result);
                Task::none()
            }
        }
    }

    fn handle_menu(&mut self, menu: TopMenu, entry: MenuEntry) -> Task<Message> {
        match (menu, entry.label()) {
            (TopMenu::File, "Quit") => iced::exit(),
            (TopMenu::View, "Refresh catalog") => {
                self.connection.force_unloaded();
                self.maybe_connect()
            }
            (TopMenu::Help, "Documentation") => {
                if let Err(error) = webbrowser::open(DOCUMENTATION_URL) {
                    log::warn!("failed to open documentation: {error}");
                }
                Task::none()
            }
            _ => Task::none(),
        }
    }

    /// The connect effect: fires only from `Unloaded` with both fields
    /// present. Completions carry the attempt's generation so a superseded
    /// attempt cannot overwrite newer state.
    fn maybe_connect(&mut self) -> Task<Message> {
        if !self.connection.can_connect() {
            return Task::none();
        }

        let (generation, target) = self.connection.begin_connect();
        let hide_system_databases = settings::global().hide_system_databases;
        log::info!("connecting to {}", target.uri());

        Task::perform(
            async move { connection::connect_and_discover(target, hide_system_databases) },
            move |result| Message::ConnectionCompleted { generation, result },
        )
    }

    /// Collection change drops every dependent cache back to `Unloaded`.
    fn invalidate_dependent_views(&mut self) {
        self.documents.invalidate(self.connection.collection_name.as_deref());
        self.pipeline.invalidate_outputs();
        self.stage_trees.clear();
        self.schema.invalidate();
    }

    /// `Unloaded` views refetch when they become visible.
    fn ensure_active_tab_loaded(&mut self) -> Task<Message> {
        if self.connection.selection().is_none() {
            return Task::none();
        }

        match self.active_tab {
            WorkTab::Documents if self.documents.state == ValueState::Unloaded => {
                self.start_documents_query()
            }
            WorkTab::Schema if self.schema.state == ValueState::Unloaded => {
                self.start_schema_sample()
            }
            _ => Task::none(),
        }
    }

    fn start_documents_query(&mut self) -> Task<Message> {
        let Some((db_name, collection_name)) = self.connection.selection() else {
            log::warn!("documents query without a selected collection");
            return Task::none();
        };
        let Some(handle) = self.connection.handle() else {
            log::warn!("documents query without an active connection");
            return Task::none();
        };

        let filter = match self.documents.parse_filter() {
            Ok(filter) => filter,
            Err(error) => {
                self.documents.set_parse_error(error);
                return Task::none();
            }
        };

        let generation = self.documents.begin_fetch();
        let skip = self.documents.skip_value();
        let limit = self.documents.limit_value();
        let timeout = settings::global().query_timeout();

        Task::perform(
            async move {
                let started = Instant::now();
                let result = query::run_find_query(
                    handle,
                    db_name,
                    collection_name,
                    filter,
                    skip,
                    limit,
                    timeout,
                );
                (result, started.elapsed())
            },
            move |(result, duration)| Message::DocumentsQueryCompleted {
                generation,
                result,
                duration,
            },
        )
    }

    fn start_schema_sample(&mut self) -> Task<Message> {
        let Some((db_name, collection_name)) = self.connection.selection() else {
            log::warn!("schema sample without a selected collection");
            return Task::none();
        };
        let Some(handle) = self.connection.handle() else {
            log::warn!("schema sample without an active connection");
            return Task::none();
        };

        let generation = self.schema.begin_fetch();
        let app_settings = settings::global();
        let sample_size = app_settings.schema_sample_size;
        let timeout = app_settings.query_timeout();

        Task::perform(
            async move {
                query::run_schema_sample(handle, db_name, collection_name, sample_size, timeout)
            },
            move |result| Message::SchemaSampleCompleted { generation, result },
        )
    }

    /// One task per stage, each replaying the cumulative prefix of the
    /// pipeline. The tasks are independent; completions may arrive in any
    /// order and route by stage id.
    fn start_stage_queries(&mut self) -> Task<Message> {
        let Some((db_name, collection_name)) = self.connection.selection() else {
            log::warn!("refresh without a selected collection");
            return Task::none();
        };
        let Some(handle) = self.connection.handle() else {
            log::warn!("refresh without an active connection");
            return Task::none();
        };

        if self.pipeline.is_empty() {
            return Task::none();
        }

        let sample_count = self.pipeline.sample_count();
        let timeout = settings::global().query_timeout();
        let prefixes = self.pipeline.begin_refresh();
        log::debug!("dispatching {} stage queries", prefixes.len());

        let tasks = prefixes.into_iter().map(|prefix| {
            let PrefixQuery { stage_id, stages } = prefix;
            let handle = handle.clone();
            let db_name = db_name.clone();
            let collection_name = collection_name.clone();

            Task::perform(
                async move {
                    query::run_stage_query(
                        handle,
                        db_name,
                        collection_name,
                        stages,
                        sample_count,
                        timeout,
                    )
                },
                move |result| Message::StageQueryCompleted { stage_id, result },
            )
        });

        Task::batch(tasks)
    }

    fn view(&self) -> Element<'_, Message> {
        let menu_bar = self.build_menu_bar();
        let connection_bar = Container::new(self.connection.view()).padding([6, 12]);
        let tab_header = self.tab_header();

        let body: Element<Message> = match self.active_tab {
            WorkTab::Aggregate => aggregate::view(&self.pipeline, &self.stage_trees),
            WorkTab::Documents if self.connection.selection().is_some() => self.documents.view(),
            WorkTab::Schema if self.connection.selection().is_some() => self.schema.view(),
            _ => Container::new(text("Select a database and collection to begin"))
                .center_x(Length::Fill)
                .center_y(Length::Fill)
                .into(),
        };

        let content = Container::new(body)
            .padding(8)
            .width(Length::Fill)
            .height(Length::Fill)
            .style(Self::pane_style);

        Column::new()
            .spacing(4)
            .push(menu_bar)
            .push(connection_bar)
            .push(tab_header)
            .push(content)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::Light
    }

    fn tab_header(&self) -> Element<'_, Message> {
        let active_bg = Color::from_rgb8(0xd5, 0xe4, 0xff);
        let inactive_bg = Color::from_rgb8(0xf2, 0xf4, 0xf8);
        let border_color = Color::from_rgb8(0xc2, 0xc8, 0xd3);

        let mut tabs_row = Row::new().spacing(8).align_y(Vertical::Center);

        for tab in WorkTab::ALL {
            let is_active = self.active_tab == *tab;

            let tab_button = Button::new(Text::new(tab.label()).size(14))
                .padding([4, 12])
                .on_press(Message::TabSelected(*tab));

            let tab_container = Container::new(tab_button).style(move |_| {
                if is_active {
                    container::Style {
                        background: Some(active_bg.into()),
                        text_color: Some(Color::BLACK),
                        border: border::rounded(6).width(1).color(border_color),
                        ..Default::default()
                    }
                } else {
                    container::Style {
                        background: Some(inactive_bg.into()),
                        border: border::rounded(6).width(1).color(border_color),
                        ..Default::default()
                    }
                }
            });

            tabs_row = tabs_row.push(tab_container);
        }

        Container::new(tabs_row).padding([0, 12]).width(Length::Fill).into()
    }

    fn build_menu_bar(&self) -> MenuBar<'_, Message, Theme, Renderer> {
        MenuBar::new(vec![
            self.menu_root(TopMenu::File, &[MenuEntry::Action("Quit")]),
            self.menu_root(TopMenu::View, &[MenuEntry::Action("Refresh catalog")]),
            self.menu_root(TopMenu::Help, &[MenuEntry::Action("Documentation")]),
        ])
        .width(Length::Fill)
    }

    fn menu_root(
        &self,
        menu: TopMenu,
        entries: &[MenuEntry],
    ) -> MenuItemWidget<'_, Message, Theme, Renderer> {
        let label = text(menu.label()).size(16);
        let root_button = button(label).padding([6, 12]);

        let menu_widget = Menu::new(
            entries
                .iter()
                .map(|entry| {
                    let entry_label = text(entry.label()).size(14);
                    let entry_button = button(entry_label)
                        .on_press(Message::MenuItemSelected(menu, *entry))
                        .padding([6, 12])
                        .width(Length::Fill);
                    MenuItemWidget::new(entry_button)
                })
                .collect(),
        )
        .offset(4.0)
        .max_width(200.0);

        MenuItemWidget::with_menu(root_button, menu_widget)
    }

    fn pane_style(theme: &Theme) -> container::Style {
        let palette = theme.extended_palette();

        container::Style {
            background: Some(palette.background.weak.color.into()),
            border: border::rounded(6).width(1).color(palette.primary.weak.color),
            ..Default::default()
        }
    }
}
