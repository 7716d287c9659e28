pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod entity;
pub mod error;
pub mod logging;
pub mod server;
pub mod storage;

pub use cache::SqliteCache;
pub use client::{HttpTransport, ProvingStore, RecordStore, Transport, WriteOutcome};
pub use config::Config;
pub use error::{Result, TaqueroError};
pub use storage::LoroSheetStore;
