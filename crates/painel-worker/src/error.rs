use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Database error: {0}")]
    Db(#[from] painel_db::DbError),

    #[error("{0}")]
    Core(#[from] painel_core::CoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine the data directory")]
    DataDirNotFound,
}

pub type Result<T> = std::result::Result<T, WorkerError>;
