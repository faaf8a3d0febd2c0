use thiserror::Error;

/// Failures raised while talking to the Cloudiverse backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The stored token was rejected; the caller should log the user out.
    #[error("not authenticated: {0}")]
    Unauthorized(String),

    /// The current plan does not include the requested feature.
    #[error("upgrade required: {0}")]
    PlanRequired(String),

    #[error("backend returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid base url '{0}'")]
    BaseUrl(String),
}

impl ApiError {
    /// Errors that retrying the same request cannot clear.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized(_) | ApiError::PlanRequired(_) | ApiError::BaseUrl(_)
        )
    }

    /// Message suitable for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized(_) => "Your session has expired. Please log in again.".to_string(),
            ApiError::PlanRequired(message) | ApiError::Status { message, .. } => message.clone(),
            ApiError::Transport(_) | ApiError::Decode(_) | ApiError::BaseUrl(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to parse generated SVG: {0}")]
    Svg(String),

    #[error("failed to allocate {width}x{height} surface for PNG export")]
    Surface { width: u32, height: u32 },

    #[error("failed to encode PNG output: {0}")]
    Encode(String),

    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Format(#[from] std::fmt::Error),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to build PDF: {0}")]
    Pdf(String),

    #[error("response does not match the canonical report schema: missing '{0}'")]
    NonCanonical(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Umbrella error for callers that drive the whole pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
