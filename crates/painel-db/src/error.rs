use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("Invalid stored status: {0}")]
    InvalidStatus(#[from] painel_core::CoreError),

    #[error("Could not determine the data directory")]
    DataDirNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;
