//! Command replies as printed by the CLI.

use std::fmt;

use crate::error::KvError;
use crate::result::Status;
use crate::types::{format_float, ZMember};

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Option<Vec<u8>>),
    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::SimpleString("PONG".to_string())
    }

    pub fn null() -> Self {
        Reply::BulkString(None)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(format!("ERR {}", msg.into()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Reply::BulkString(Some(bytes))
    }

    pub fn float(f: f64) -> Self {
        Reply::BulkString(Some(format_float(f).into_bytes()))
    }

    pub fn bulk_array(items: Vec<Vec<u8>>) -> Self {
        Reply::Array(items.into_iter().map(Reply::from_bytes).collect())
    }

    /// Members, optionally interleaved with their scores.
    pub fn members(members: Vec<ZMember>, with_scores: bool) -> Self {
        let mut out = Vec::with_capacity(members.len() * if with_scores { 2 } else { 1 });
        for m in members {
            out.push(Reply::from_bytes(m.member));
            if with_scores {
                out.push(Reply::float(m.score));
            }
        }
        Reply::Array(out)
    }

    /// A scan page: the next cursor followed by the items.
    pub fn page(cursor: u64, items: Vec<Reply>) -> Self {
        Reply::Array(vec![
            Reply::from_bytes(cursor.to_string().into_bytes()),
            Reply::Array(items),
        ])
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// RESP2 wire encoding.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::SimpleString(s) => format!("+{}\r\n", s).into_bytes(),
            Reply::Error(s) => format!("-{}\r\n", s).into_bytes(),
            Reply::Integer(n) => format!(":{}\r\n", n).into_bytes(),
            Reply::BulkString(None) => b"$-1\r\n".to_vec(),
            Reply::BulkString(Some(data)) => {
                let mut buf = format!("${}\r\n", data.len()).into_bytes();
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
                buf
            }
            Reply::Array(items) => {
                let mut buf = format!("*{}\r\n", items.len()).into_bytes();
                for item in items {
                    buf.extend(item.encode());
                }
                buf
            }
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Reply::SimpleString(s) => f.write_str(s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::BulkString(None) => f.write_str("(nil)"),
            Reply::BulkString(Some(data)) => write!(f, "\"{}\"", data.escape_ascii()),
            Reply::Array(items) if items.is_empty() => f.write_str("(empty array)"),
            Reply::Array(items) => {
                let width = items.len().to_string().len();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "\n{:indent$}", "", indent = indent)?;
                    }
                    let label = format!("{:>width$}) ", i + 1, width = width);
                    f.write_str(&label)?;
                    item.write_indented(f, indent + label.len())?;
                }
                Ok(())
            }
        }
    }
}

/// Formats like `redis-cli` does on a terminal.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

impl From<i64> for Reply {
    fn from(n: i64) -> Self {
        Reply::Integer(n)
    }
}

impl From<bool> for Reply {
    fn from(b: bool) -> Self {
        Reply::Integer(if b { 1 } else { 0 })
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply::BulkString(Some(s.into_bytes()))
    }
}

impl From<Vec<u8>> for Reply {
    fn from(bytes: Vec<u8>) -> Self {
        Reply::from_bytes(bytes)
    }
}

impl From<Option<Vec<u8>>> for Reply {
    fn from(opt: Option<Vec<u8>>) -> Self {
        Reply::BulkString(opt)
    }
}

impl From<Status> for Reply {
    fn from(s: Status) -> Self {
        Reply::SimpleString(s.as_str().to_string())
    }
}

impl From<KvError> for Reply {
    fn from(e: KvError) -> Self {
        match e {
            KvError::Nil => Reply::null(),
            KvError::WrongType => Reply::Error(e.to_string()),
            KvError::InvalidArgument(msg) => Reply::error(msg),
            e => Reply::error(e.to_string()),
        }
    }
}
