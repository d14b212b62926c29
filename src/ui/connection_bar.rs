use std::sync::Arc;

use iced::alignment::Vertical;
use iced::widget::pick_list::PickList;
use iced::widget::{Button, Container, Row, Text, text_input};
use iced::{Element, Length};
use mongodb::sync::Client;

use crate::Message;
use crate::mongo::ValueState;
use crate::mongo::connection::{Catalog, ConnectTarget, ConnectionBootstrap};
use crate::settings;
use crate::settings::AppSettings;

/// Connection parameters, the discovered catalog, and the current
/// database/collection selection. Published read-only to the sibling views;
/// only collection changes reach back out (cascade invalidation, handled by
/// the update loop).
#[derive(Debug, Clone)]
pub struct ConnectionBarState {
    pub host_input: String,
    pub port_input: String,
    pub status: ValueState,
    pub catalog: Catalog,
    pub database_name: Option<String>,
    pub collection_name: Option<String>,
    handle: Option<Arc<Client>>,
    generation: u64,
}

impl ConnectionBarState {
    pub fn new(settings: &AppSettings) -> Self {
        Self {
            host_input: settings.default_host.clone(),
            port_input: settings.default_port.to_string(),
            status: ValueState::Unloaded,
            catalog: Catalog::new(),
            database_name: None,
            collection_name: None,
            handle: None,
            generation: 0,
        }
    }

    /// The connect effect only fires from `Unloaded` with both fields
    /// present; edits made while a connect is in flight are inert until the
    /// status resolves.
    pub fn can_connect(&self) -> bool {
        self.status == ValueState::Unloaded
            && !self.host_input.trim().is_empty()
            && !self.port_input.trim().is_empty()
    }

    /// Enters the loading state, clearing catalog and selection, and hands
    /// back the attempt's generation tag plus the target to dial.
    pub fn begin_connect(&mut self) -> (u64, ConnectTarget) {
        self.generation += 1;
        self.status = ValueState::Loading;
        self.catalog.clear();
        self.database_name = None;
        self.collection_name = None;
        self.handle = None;
        let target =
            ConnectTarget { host: self.host_input.clone(), port: self.port_input.clone() };
        (self.generation, target)
    }

    /// Applies a connect completion. A completion from a superseded attempt
    /// is dropped and reports `false`. Failure resets the whole bar to its
    /// configured defaults; there is no retry.
    pub fn complete_connect(
        &mut self,
        generation: u64,
        result: Result<ConnectionBootstrap, String>,
    ) -> bool {
        if generation != self.generation {
            log::debug!("dropping stale connect completion (generation {generation})");
            return false;
        }

        match result {
            Ok(bootstrap) => {
                self.status = ValueState::Loaded;
                self.catalog = bootstrap.catalog;
                self.handle = Some(bootstrap.handle);
            }
            Err(error) => {
                log::error!("connect failed: {error}");
                self.reset_to_defaults();
            }
        }
        true
    }

    pub fn reset_to_defaults(&mut self) {
        let defaults = settings::global();
        self.host_input = defaults.default_host.clone();
        self.port_input = defaults.default_port.to_string();
        self.status = ValueState::Unloaded;
        self.catalog.clear();
        self.database_name = None;
        self.collection_name = None;
        self.handle = None;
        // The generation stays monotonic so late completions from the
        // aborted attempt still miss.
    }

    /// The Refresh path: dropping back to `Unloaded` re-arms the connect
    /// effect.
    pub fn force_unloaded(&mut self) {
        self.status = ValueState::Unloaded;
    }

    pub fn select_database(&mut self, name: String) {
        if self.catalog.contains_key(&name) {
            self.database_name = Some(name);
            self.collection_name = None;
        }
    }

    /// Returns whether the selection actually changed; the caller owns the
    /// cascade invalidation of dependent views.
    pub fn select_collection(&mut self, name: String) -> bool {
        let belongs = self
            .database_name
            .as_ref()
            .and_then(|db| self.catalog.get(db))
            .is_some_and(|spec| spec.collections.contains(&name));
        if belongs {
            self.collection_name = Some(name);
        }
        belongs
    }

    pub fn handle(&self) -> Option<Arc<Client>> {
        self.handle.clone()
    }

    pub fn selection(&self) -> Option<(String, String)> {
        match (&self.database_name, &self.collection_name) {
            (Some(db), Some(collection)) => Some((db.clone(), collection.clone())),
            _ => None,
        }
    }

    fn database_names(&self) -> Vec<String> {
        self.catalog.keys().cloned().collect()
    }

    fn collections_of_selected(&self) -> Vec<String> {
        self.database_name
            .as_ref()
            .and_then(|db| self.catalog.get(db))
            .map(|spec| spec.collections.clone())
            .unwrap_or_default()
    }

    pub fn view(&self) -> Element<'_, Message> {
        let scheme_label = Container::new(Text::new("mongodb://").size(14)).padding([6, 8]);

        let host_input = text_input("host", &self.host_input)
            .on_input(Message::HostChanged)
            .padding([4, 6])
            .width(Length::Fixed(160.0));

        let port_input = text_input("port", &self.port_input)
            .on_input(Message::PortChanged)
            .padding([4, 6])
            .width(Length::Fixed(80.0));

        let connect_label = if self.status.is_loaded() { "Refresh" } else { "Connect" };
        let connect_button = Button::new(Text::new(connect_label).size(14))
            .padding([4, 12])
            .on_press_maybe((!self.status.is_loading()).then_some(Message::ConnectPressed));

        let mut row = Row::new()
            .spacing(8)
            .align_y(Vertical::Center)
            .push(scheme_label)
            .push(host_input)
            .push(port_input)
            .push(connect_button);

        match self.status {
            ValueState::Unloaded => {}
            ValueState::Loading => {
                row = row.push(Text::new("Connecting…").size(14));
            }
            ValueState::Loaded => {
                if self.catalog.is_empty() {
                    row = row.push(Text::new("No databases available").size(14));
                } else {
                    row = row.push(
                        PickList::new(
                            self.database_names(),
                            self.database_name.clone(),
                            Message::DatabasePicked,
                        )
                        .placeholder("database"),
                    );

                    if self.database_name.is_some() {
                        row = row.push(
                            PickList::new(
                                self.collections_of_selected(),
                                self.collection_name.clone(),
                                Message::CollectionPicked,
                            )
                            .placeholder("collection"),
                        );
                    }
                }
            }
        }

        row.into()
    }
}

#[cfg(test)]
impl ConnectionBarState {
    pub(crate) fn test_generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mongo::connection::DatabaseSpec;

    fn bar() -> ConnectionBarState {
        ConnectionBarState::new(&AppSettings::default())
    }

    fn catalog_with(db: &str, collections: &[&str]) -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert(
            db.to_string(),
            DatabaseSpec {
                collections: collections.iter().map(|name| name.to_string()).collect(),
            },
        );
        catalog
    }

    #[test]
    fn connect_requires_unloaded_status_and_both_fields() {
        let mut state = bar();
        assert!(state.can_connect());

        state.host_input.clear();
        assert!(!state.can_connect());

        state.host_input = String::from("localhost");
        state.status = ValueState::Loading;
        assert!(!state.can_connect());

        state.status = ValueState::Loaded;
        assert!(!state.can_connect());
    }

    #[test]
    fn begin_connect_clears_catalog_and_selection() {
        let mut state = bar();
        state.catalog = catalog_with("app", &["users"]);
        state.database_name = Some(String::from("app"));
        state.collection_name = Some(String::from("users"));

        let (generation, target) = state.begin_connect();
        assert_eq!(generation, 1);
        assert_eq!(target.uri(), "mongodb://localhost:27017");
        assert_eq!(state.status, ValueState::Loading);
        assert!(state.catalog.is_empty());
        assert!(state.database_name.is_none());
        assert!(state.collection_name.is_none());
    }

    #[test]
    fn stale_connect_completion_is_dropped() {
        let mut state = bar();
        let (first, _) = state.begin_connect();
        state.status = ValueState::Unloaded;
        let (second, _) = state.begin_connect();
        assert_ne!(first, second);

        assert!(!state.complete_connect(first, Err(String::from("refused"))));
        assert_eq!(state.status, ValueState::Loading);
    }

    #[test]
    fn failed_connect_resets_to_defaults() {
        let mut state = bar();
        state.host_input = String::from("db.internal");
        state.port_input = String::from("40000");
        let (generation, _) = state.begin_connect();

        assert!(state.complete_connect(generation, Err(String::from("refused"))));
        assert_eq!(state.status, ValueState::Unloaded);
        assert_eq!(state.host_input, "localhost");
        assert_eq!(state.port_input, "27017");
        assert!(state.catalog.is_empty());
    }

    #[test]
    fn selecting_a_database_clears_the_collection() {
        let mut state = bar();
        state.status = ValueState::Loaded;
        state.catalog = catalog_with("app", &["users"]);
        state.database_name = Some(String::from("app"));
        state.collection_name = Some(String::from("users"));

        state.select_database(String::from("app"));
        assert_eq!(state.database_name.as_deref(), Some("app"));
        assert!(state.collection_name.is_none());
    }

    #[test]
    fn collection_selection_validates_against_the_catalog() {
        let mut state = bar();
        state.status = ValueState::Loaded;
        state.catalog = catalog_with("app", &["users"]);
        state.database_name = Some(String::from("app"));

        assert!(!state.select_collection(String::from("ghost")));
        assert!(state.collection_name.is_none());

        assert!(state.select_collection(String::from("users")));
        assert_eq!(state.collection_name.as_deref(), Some("users"));
    }
}
