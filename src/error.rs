use thiserror::Error as ThisError;

/// Failure taxonomy of the iteration engine.
///
/// `Configuration` covers caller misuse detected before or during shaping
/// and is surfaced synchronously wherever possible. `DataSource` wraps any
/// transport failure raised while opening the cursor or fetching a page; the
/// cursor is closed before it propagates. `ConcurrentUse` is raised eagerly
/// when a second iteration is started on a connection whose cursor is still
/// active. None of these are retried by this layer.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("data source error: {0:#}")]
    DataSource(#[from] anyhow::Error),
    #[error("the connection already has an active iteration")]
    ConcurrentUse,
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
