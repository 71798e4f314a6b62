//! The transport contract a [`Connection`](crate::netfilter::Connection) runs on.
//!
//! [`NetlinkSocket`](super::NetlinkSocket) is the real implementation.
//! Anything else that can move [`Message`]s (an in-memory loopback in
//! tests, a recorded session) can stand in for it.

use std::future::{Future, poll_fn};
use std::task::{Context, Poll};

use super::error::Result;
use super::message::Message;

/// Runtime socket options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SocketOption {
    /// Receive multicast traffic from all network namespaces with an NSID
    /// (NETLINK_LISTEN_ALL_NSID).
    ListenAllNsid,
    /// Extended ACK reporting (NETLINK_EXT_ACK).
    ExtAck,
    /// Strip the request payload from ACK messages (NETLINK_CAP_ACK).
    CapAck,
    /// Do not report ENOBUFS on receive overruns (NETLINK_NO_ENOBUFS).
    NoEnobufs,
    /// Report errors to broadcast listeners (NETLINK_BROADCAST_ERROR).
    BroadcastError,
    /// Receive the destination group with each message (NETLINK_PKTINFO).
    PktInfo,
}

/// A netlink transport.
///
/// Implementations own sequence-number and port-ID bookkeeping and the
/// multi-part reply protocol. They never interpret error codes inside
/// replies; that is left to the caller.
pub trait Transport: Send + Sync {
    /// Send `msg` and collect its correlated replies.
    ///
    /// Replies are validated against the request (sequence number, port
    /// ID). Collection stops at `NLMSG_DONE` or `NLMSG_ERROR` for dump and
    /// acknowledged requests, otherwise after the first datagram.
    fn execute(&self, msg: Message) -> impl Future<Output = Result<Vec<Message>>> + Send;

    /// Send `msg` without waiting for replies.
    ///
    /// Returns the message as sent, with sequence number and port ID filled in.
    fn send(&self, msg: Message) -> impl Future<Output = Result<Message>> + Send;

    /// Poll for the next datagram, split into messages.
    fn poll_receive(&self, cx: &mut Context<'_>) -> Poll<Result<Vec<Message>>>;

    /// Wait for the next datagram, split into messages.
    fn receive(&self) -> impl Future<Output = Result<Vec<Message>>> + Send {
        poll_fn(move |cx| self.poll_receive(cx))
    }

    /// Subscribe to a multicast group.
    fn join_group(&mut self, group: u32) -> Result<()>;

    /// Unsubscribe from a multicast group.
    fn leave_group(&mut self, group: u32) -> Result<()>;

    /// Toggle a socket option.
    fn set_option(&mut self, option: SocketOption, enable: bool) -> Result<()>;

    /// Release the transport.
    fn close(self) -> Result<()>
    where
        Self: Sized,
    {
        drop(self);
        Ok(())
    }
}
