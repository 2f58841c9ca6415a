mod error;
mod events;
mod models;
mod repository;
mod schema;

pub use error::DbError;
pub use events::ChangeEvent;
pub use models::*;
pub use repository::PainelDb;
