use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    /// The canonical "entry does not exist" condition.
    #[error("redcache: nil")]
    Nil,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("value is not an integer or out of range")]
    NotInteger,

    #[error("value is not a valid float")]
    NotFloat,

    #[error("index out of range")]
    OutOfRange,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("database error: {0}")]
    Database(rusqlite::Error),
}

impl KvError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        KvError::InvalidArgument(msg.into())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, KvError::Nil)
    }

    /// True for caller-initiated aborts (cancellation or deadline), which are
    /// safe to retry from the last known-good state.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, KvError::Cancelled | KvError::DeadlineExceeded)
    }
}

impl From<rusqlite::Error> for KvError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => KvError::Nil,
            e => KvError::Database(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, KvError>;
