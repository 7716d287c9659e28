//! Application state shared across request handlers.

use tokio::sync::Mutex;

use crate::storage::LoroSheetStore;

pub(crate) struct AppState {
    /// Every read-modify-write of a sheet happens under this lock.
    pub(crate) store: Mutex<LoroSheetStore>,
    /// Optional API key for authentication. None = no auth required.
    pub(crate) api_key: Option<String>,
}

impl AppState {
    pub(crate) fn new(store: LoroSheetStore, api_key: Option<String>) -> Self {
        Self {
            store: Mutex::new(store),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}
