use crate::models::MessageRow;

/// Row-level change published by [`crate::PainelDb`] after a successful write.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Insert { table: String, row: MessageRow },
}

impl ChangeEvent {
    pub fn table(&self) -> &str {
        match self {
            ChangeEvent::Insert { table, .. } => table,
        }
    }
}
