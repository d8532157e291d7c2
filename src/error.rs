//! Top-level error types for clipbot.

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),
}

/// Reddit / upload-host API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authorization failed: {0}")]
    Unauthorized(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response from {endpoint}: {detail}")]
    UnexpectedResponse { endpoint: String, detail: String },

    #[error("download exceeds size limit of {limit} bytes")]
    DownloadTooLarge { limit: u64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Command text parsing and parameter validation errors.
///
/// These are reportable back to the requestor, so every message must read
/// sensibly when quoted in a reply.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown operation: -{0}")]
    UnknownOperation(String),

    #[error("expected an operation starting with '-', found `{0}`")]
    ExpectedOperation(String),

    #[error("malformed parameter `{token}` for -{operation}")]
    MalformedParameter { operation: String, token: String },

    #[error("unknown parameter `{name}` for -{operation}")]
    UnknownParameter { operation: String, name: String },

    #[error("invalid value for `{name}` on -{operation}: {reason}")]
    InvalidParameter {
        operation: String,
        name: String,
        reason: String,
    },

    #[error("missing required parameter `{name}` for -{operation}")]
    MissingParameter { operation: String, name: String },

    #[error("no operations given")]
    Empty,

    #[error("operation -{0} given more than once")]
    DuplicateOperation(String),
}

/// Media transform service errors.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("transform -{operation} failed: {detail}")]
    Failed { operation: String, detail: String },

    #[error("transform worker exited with status {status}: {stderr}")]
    WorkerFailed { status: i32, stderr: String },

    #[error("IO error during transform: {0}")]
    Io(#[from] std::io::Error),
}

/// Upload lifecycle store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("corrupt row {id}: {detail}")]
    CorruptRow { id: String, detail: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Contract violations: states the collaborators promised never to produce.
///
/// Fatal to the unit of work that hit them, never silently skipped.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("unrecognized post kind `{0}` in ancestry chain")]
    UnknownPostKind(String),

    #[error("unrecognized mention kind `{0}`")]
    UnknownMentionKind(String),

    #[error("no upload client registered for destination `{0}`")]
    UnknownDestination(String),
}
