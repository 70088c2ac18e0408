use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatenportalError>;

#[derive(Debug, Error)]
pub enum DatenportalError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for DatenportalError {
    fn from(err: reqwest::Error) -> Self {
        DatenportalError::Network(err.to_string())
    }
}
