use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("corrupt json column: {0}")]
    Json(#[from] serde_json::Error),
    /// Malformed or referentially inconsistent input; blocks persistence.
    #[error("validation error: {0}")]
    Validation(String),
    /// A stored id referenced by a live flow no longer resolves.
    #[error("data integrity fault: {0}")]
    Integrity(String),
}
