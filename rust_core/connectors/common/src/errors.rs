use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("network error: {0}")]
    Network(String),

    #[error("http status {status} from {url}")]
    Http { status: u16, url: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("exchange rejected request: {0}")]
    Rejected(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("data source already running")]
    AlreadyRunning,

    #[error("other: {0}")]
    Other(String),
}

impl From<serde_json::Error> for ConnectorError {
    fn from(e: serde_json::Error) -> Self {
        ConnectorError::Parse(e.to_string())
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
