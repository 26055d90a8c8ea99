//! redcache - Redis command semantics on an embedded SQLite store
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use redcache::{Context, Expiry, KeyCommands, Provider, StringCommands};
//!
//! let cache = Provider::open_memory().unwrap();
//! let ctx = Context::background();
//!
//! // SET/GET
//! cache.set(&ctx, "key", "value".into(), Expiry::Never).unwrap();
//! assert_eq!(cache.get(&ctx, "key").unwrap(), b"value".to_vec());
//!
//! // EXPIRE NX only applies to keys without a TTL
//! assert!(cache.expire_nx(&ctx, "key", Duration::from_secs(60)).unwrap());
//! assert!(!cache.expire_nx(&ctx, "key", Duration::from_secs(10)).unwrap());
//! assert!(cache.ttl(&ctx, "key").unwrap() > 0);
//! ```

pub mod cli;
pub mod commands;
pub mod context;
pub mod error;
pub mod expire;
pub mod glob;
pub mod options;
pub mod prefix;
pub mod provider;
pub mod reply;
pub mod result;
pub mod scan;
pub mod store;
pub mod types;
pub mod zset;

pub use commands::{
    Cache, HashCommands, KeyCommands, ListCommands, SetCommands, SortedSetCommands,
    StringCommands, ZAddArgs,
};
pub use context::Context;
pub use error::{KvError, Result};
pub use expire::ExpirePolicy;
pub use options::{Options, StoreOptions};
pub use provider::Provider;
pub use reply::Reply;
pub use result::{OptionalExt, Status};
pub use store::Store;
pub use types::{
    Expiry, HScanPage, KeyScanPage, KeyType, LInsertPosition, ScanPage, SetArgs, SetMode, SetReply, Value,
    ZAddMode, ZMember, ZRankScore, ZScanPage,
};
pub use zset::{Aggregate, ScoreBound, ScoreRange, ZRangeArgs, ZRangeBy, ZStore};
