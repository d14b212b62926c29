pub mod connection;
pub mod pipeline;
pub mod query;
pub mod schema;

/// Lifecycle of any lazily fetched value: not requested yet, in flight, or
/// populated. Dependent views are invalidated by dropping them back to
/// `Unloaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
}

impl ValueState {
    pub fn is_loading(self) -> bool {
        matches!(self, ValueState::Loading)
    }

    pub fn is_loaded(self) -> bool {
        matches!(self, ValueState::Loaded)
    }
}
