use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("agent error: {0}")]
    Agent(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
