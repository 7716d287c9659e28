use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaqueroError {
    #[error("Not in a taquero project. Run 'taquero init' first.")]
    NotInitialized,

    #[error("Already initialized. Remove .taquero/ to reinitialize.")]
    AlreadyInitialized,

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Duplicate record id: {0}")]
    DuplicateId(String),

    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict { id: String, expected: u64, actual: u64 },

    #[error("No endpoint configured for module '{0}'")]
    EndpointNotConfigured(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Loro error: {0}")]
    Loro(#[from] loro::LoroError),

    #[error("Loro encode error: {0}")]
    LoroEncode(#[from] loro::LoroEncodeError),
}

pub type Result<T> = std::result::Result<T, TaqueroError>;
