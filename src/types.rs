use std::time::{Duration, SystemTime};

use crate::error::{KvError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum KeyType {
    String = 1,
    Hash = 2,
    List = 3,
    Set = 4,
    ZSet = 5,
}

impl KeyType {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            1 => Some(KeyType::String),
            2 => Some(KeyType::Hash),
            3 => Some(KeyType::List),
            4 => Some(KeyType::Set),
            5 => Some(KeyType::ZSet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::Hash => "hash",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::ZSet => "zset",
        }
    }

    /// Redis TYPE reply, "none" for a missing key.
    pub fn name(t: Option<KeyType>) -> &'static str {
        t.map(|t| t.as_str()).unwrap_or("none")
    }
}

/// A value accepted by write commands.
///
/// Every variant is turned into bytes exactly once, when the command reaches
/// the store: integers as decimal text, floats in their shortest round-trip
/// form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Value::Bytes(b) => b,
            Value::Int(n) => n.to_string().into_bytes(),
            Value::Float(f) => format_float(f).into_bytes(),
            Value::Text(s) => s.into_bytes(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.clone().into_bytes()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(b: &[u8; N]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// Formats a float the way Redis replies do: integral values without a
/// fractional part, infinities as `inf`/`-inf`.
pub fn format_float(f: f64) -> String {
    if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
        format!("{}", f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZMember {
    pub score: f64,
    pub member: Vec<u8>,
}

impl ZMember {
    pub fn new(score: f64, member: impl Into<Vec<u8>>) -> Self {
        Self {
            score,
            member: member.into(),
        }
    }
}

/// Rank of a sorted-set member together with its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZRankScore {
    pub rank: i64,
    pub score: f64,
}

/// Write condition for SET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    #[default]
    Always,
    /// Only set when the key does not exist (NX).
    IfNotExists,
    /// Only set when the key already exists (XX).
    IfExists,
}

impl SetMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "" => Ok(SetMode::Always),
            "NX" => Ok(SetMode::IfNotExists),
            "XX" => Ok(SetMode::IfExists),
            other => Err(KvError::invalid(format!("unknown SET mode {}", other))),
        }
    }
}

/// Expiration attached by `set`, `set_nx` and `set_xx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Store without a TTL, clearing any existing one.
    #[default]
    Never,
    /// Expire after the given duration. A zero duration means no TTL.
    After(Duration),
    /// Keep whatever TTL the key already has (KEEPTTL).
    KeepTtl,
}

impl From<Duration> for Expiry {
    fn from(ttl: Duration) -> Self {
        Expiry::After(ttl)
    }
}

/// Options for `set_args`. A zero value means "plain SET without TTL".
#[derive(Debug, Clone, Default)]
pub struct SetArgs {
    pub mode: SetMode,
    pub ttl: Option<Duration>,
    pub expire_at: Option<SystemTime>,
    /// Return the previous value instead of `OK`.
    pub get: bool,
    /// Keep the existing expiration instead of clearing it.
    pub keep_ttl: bool,
}

impl SetArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nx(mut self) -> Self {
        self.mode = SetMode::IfNotExists;
        self
    }

    pub fn xx(mut self) -> Self {
        self.mode = SetMode::IfExists;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn expire_at(mut self, at: SystemTime) -> Self {
        self.expire_at = Some(at);
        self
    }

    pub fn get(mut self) -> Self {
        self.get = true;
        self
    }

    pub fn keep_ttl(mut self) -> Self {
        self.keep_ttl = true;
        self
    }

    pub fn expiry(self, expiry: Expiry) -> Self {
        match expiry {
            Expiry::Never => self,
            Expiry::After(ttl) if ttl.is_zero() => self,
            Expiry::After(ttl) => self.ttl(ttl),
            Expiry::KeepTtl => self.keep_ttl(),
        }
    }
}

/// What `set_args` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetReply {
    Ok,
    /// Previous value, when `SetArgs::get` was requested.
    Prev(Vec<u8>),
}

/// Condition for ZADD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZAddMode {
    #[default]
    Always,
    /// Only add new members.
    Nx,
    /// Only update existing members.
    Xx,
    /// Update existing members only when the new score is greater.
    Gt,
    /// Update existing members only when the new score is less.
    Lt,
}

impl ZAddMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "" => Ok(ZAddMode::Always),
            "NX" => Ok(ZAddMode::Nx),
            "XX" => Ok(ZAddMode::Xx),
            "GT" => Ok(ZAddMode::Gt),
            "LT" => Ok(ZAddMode::Lt),
            other => Err(KvError::invalid(format!("unknown ZADD mode {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LInsertPosition {
    Before,
    After,
}

/// One page of a key scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyScanPage {
    /// Cursor for the next call, 0 when the iteration is complete.
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// One page of a hash scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HScanPage {
    pub cursor: u64,
    pub fields: Vec<(String, Vec<u8>)>,
}

/// One page of a set scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    pub cursor: u64,
    pub elements: Vec<Vec<u8>>,
}

/// One page of a sorted-set scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZScanPage {
    pub cursor: u64,
    pub members: Vec<ZMember>,
}
