mod channel;
mod conversation;
mod error;
mod payload;
mod phone;
mod status;

pub use channel::*;
pub use conversation::*;
pub use error::{CoreError, Result};
pub use payload::*;
pub use phone::*;
pub use status::*;
