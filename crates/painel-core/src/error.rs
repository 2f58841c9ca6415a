use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid channel map: {0}")]
    InvalidChannelMap(String),

    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Unknown conversation status: {0}")]
    UnknownStatus(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
