//! Generic netlink transport layer.
//!
//! Message framing, the flat attribute reader/writer, the async socket and
//! the error type shared by the whole crate. Nothing here knows about
//! Netfilter; that lives in [`crate::netfilter`].

pub mod attr;
mod error;
pub mod message;
pub mod socket;
pub mod transport;

pub use error::{Error, Result};
pub use message::{Message, MessageIter, NlMsgHdr, NlMsgType};
pub use socket::{Config, NetlinkSocket};
pub use transport::{SocketOption, Transport};
