//! Result helpers shared by every command.
//!
//! All commands return [`Result<T>`](crate::Result). A missing entry is always
//! reported as [`KvError::Nil`], whatever the store's own not-found signal was,
//! so calling code never branches on the backend.

use std::fmt;

use crate::error::{KvError, Result};

/// Acknowledgement returned by status-style commands (SET, RENAME, LSET, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns the canonical `Nil` error into `Ok(None)`.
///
/// ```
/// use redcache::{KvError, OptionalExt};
///
/// let missing: redcache::Result<Vec<u8>> = Err(KvError::Nil);
/// assert_eq!(missing.optional().unwrap(), None);
/// ```
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(KvError::Nil) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Maps an absent value onto the canonical `Nil` error.
pub(crate) fn nil_if_none<T>(v: Option<T>) -> Result<T> {
    v.ok_or(KvError::Nil)
}
