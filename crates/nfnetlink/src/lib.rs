//! Async Netfilter netlink protocol layer for Linux.
//!
//! The kernel's Netfilter subsystems (conntrack, ipset, nftables, queue,
//! log, ...) talk over NETLINK_NETFILTER using a 4-byte header followed by
//! a tree of TLV attributes. This crate encodes and decodes that framing
//! and runs request/response and multicast sessions over it. It does not
//! interpret attribute payloads; what attribute 7 means is up to the
//! subsystem.
//!
//! # Features
//!
//! - `serde` - `Serialize`/`Deserialize` on the data model
//! - `integration` - tests against a live kernel socket
//!
//! # Example
//!
//! ```ignore
//! use nfnetlink::{Connection, Group};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> nfnetlink::Result<()> {
//!     let mut conn = Connection::open()?;
//!     conn.join_groups(&Group::CONNTRACK)?;
//!
//!     let mut events = conn.events();
//!     while let Some(msg) = events.try_next().await? {
//!         println!("{}", msg);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod netfilter;
pub mod netlink;

// Re-export common types at crate root for convenience
pub use netfilter::{
    Attribute, AttributeEncoder, Connection, Group, Header, HeaderType, NfMessage, Payload,
    ProtoFamily, SubsystemId,
};
pub use netlink::{Config, Error, Message, Result, SocketOption, Transport};
