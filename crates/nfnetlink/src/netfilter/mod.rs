//! Netfilter protocol core.
//!
//! - [`header`]: the 4-byte nfgenmsg header and the subsystem/message-type split
//! - [`attribute`]: recursive TLV attribute codec
//! - [`encoder`]: incremental attribute encoder
//! - [`message`]: header plus attributes inside a Netlink message
//! - [`connection`]: request/response and multicast session over a [`Transport`](crate::netlink::Transport)
//! - [`stream`]: multicast messages as a `Stream`
//!
//! # Example
//!
//! ```ignore
//! use nfnetlink::netfilter::{
//!     Attribute, Connection, Header, HeaderType, NfMessage, ProtoFamily, SubsystemId,
//! };
//! use nfnetlink::netlink::message::{NLM_F_DUMP, NLM_F_REQUEST};
//!
//! let conn = Connection::open()?;
//!
//! // Dump the conntrack table (IPCTNL_MSG_CT_GET = 1)
//! let request = NfMessage::new(
//!     HeaderType::new(SubsystemId::Conntrack, 1),
//!     NLM_F_REQUEST | NLM_F_DUMP,
//!     Header::new(ProtoFamily::Ipv4, 0, 0),
//! );
//! for entry in conn.request(&request).await? {
//!     if let Some(mark) = entry.attribute(8) {
//!         println!("{} mark={}", entry.header_type, mark.u32()?);
//!     }
//! }
//! ```

pub mod attribute;
pub mod connection;
pub mod encoder;
pub mod header;
pub mod message;
pub mod stream;

pub use attribute::{Attribute, MAX_NESTING_DEPTH, Payload};
pub use connection::Connection;
pub use encoder::AttributeEncoder;
pub use header::{Group, Header, HeaderType, ProtoFamily, SubsystemId};
pub use message::{NfMessage, marshal_netlink, unmarshal_netlink};
pub use stream::{EventSubscription, OwnedEventStream};
