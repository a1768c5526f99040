use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum BioClientsError {
    #[error("HTTP client initialization failed: {0}")]
    HttpClientInit(reqwest::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Config error in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Table output error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a single fetch that did not produce a usable payload.
///
/// `NotFound` is not an error from the caller's point of view: batch loops
/// count it and move on. `Transient` means the retry budget ran out.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum FetchError {
    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Network error from {url} after {attempts} attempts: {source}")]
    Transient {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest_middleware::Error,
    },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest_middleware::Error,
    },

    #[error("HTTP {status} from {url}: {excerpt}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        excerpt: String,
    },

    #[error("Empty response body from {url}")]
    Empty { url: String },

    #[error("Response body from {url} exceeded {limit} bytes")]
    BodyTooLarge { url: String, limit: usize },

    #[error("Malformed JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected response shape from {url}: {message}")]
    UnexpectedPayload { url: String, message: String },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::NotFound { url }
            | Self::Transient { url, .. }
            | Self::Request { url, .. }
            | Self::Status { url, .. }
            | Self::Empty { url }
            | Self::BodyTooLarge { url, .. }
            | Self::Decode { url, .. }
            | Self::UnexpectedPayload { url, .. } => url,
        }
    }
}
