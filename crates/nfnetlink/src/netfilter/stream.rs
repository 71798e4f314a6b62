//! Multicast messages as a [`Stream`] of decoded Netfilter messages.
//!
//! - [`Connection::events()`] returns a borrowed stream
//! - [`Connection::into_events()`] consumes the connection
//!
//! Netlink control messages are skipped. A message that fails to decode
//! is yielded as an error and the stream carries on with the next one.
//!
//! # Example
//!
//! ```ignore
//! use nfnetlink::{Connection, Group};
//! use tokio_stream::StreamExt;
//!
//! let mut conn = Connection::open()?;
//! conn.join_groups(&Group::CONNTRACK)?;
//!
//! let mut events = conn.events();
//! while let Some(msg) = events.try_next().await? {
//!     println!("{}", msg);
//! }
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio_stream::Stream;

use super::connection::Connection;
use super::message::NfMessage;
use crate::netlink::{Message, Result, Transport};

/// Pull the next decodable message out of `pending`, refilling it from
/// `transport` as needed.
fn poll_next_message<T: Transport>(
    transport: &T,
    pending: &mut VecDeque<Message>,
    cx: &mut Context<'_>,
) -> Poll<Option<Result<NfMessage>>> {
    loop {
        while let Some(msg) = pending.pop_front() {
            if msg.header.is_control() {
                continue;
            }
            return Poll::Ready(Some(NfMessage::from_netlink(&msg)));
        }

        match transport.poll_receive(cx) {
            Poll::Ready(Ok(batch)) => pending.extend(batch),
            Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
            Poll::Pending => return Poll::Pending,
        }
    }
}

/// A stream of messages that borrows the connection.
///
/// Created by [`Connection::events()`].
pub struct EventSubscription<'a, T: Transport> {
    conn: &'a Connection<T>,
    pending: VecDeque<Message>,
}

impl<T: Transport> Stream for EventSubscription<'_, T> {
    type Item = Result<NfMessage>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        poll_next_message(this.conn.transport(), &mut this.pending, cx)
    }
}

impl<T: Transport> Unpin for EventSubscription<'_, T> {}

/// A stream of messages that owns the connection.
///
/// Created by [`Connection::into_events()`]; [`into_connection`](Self::into_connection)
/// gives the connection back.
pub struct OwnedEventStream<T: Transport> {
    conn: Connection<T>,
    pending: VecDeque<Message>,
}

impl<T: Transport> OwnedEventStream<T> {
    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &Connection<T> {
        &self.conn
    }

    /// Recover the connection. Messages already read but not yet yielded
    /// are dropped.
    pub fn into_connection(self) -> Connection<T> {
        self.conn
    }
}

impl<T: Transport> Stream for OwnedEventStream<T> {
    type Item = Result<NfMessage>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        poll_next_message(this.conn.transport(), &mut this.pending, cx)
    }
}

impl<T: Transport> Unpin for OwnedEventStream<T> {}

impl<T: Transport> Connection<T> {
    /// Stream incoming messages, borrowing the connection.
    pub fn events(&self) -> EventSubscription<'_, T> {
        EventSubscription {
            conn: self,
            pending: VecDeque::new(),
        }
    }

    /// Stream incoming messages, consuming the connection.
    pub fn into_events(self) -> OwnedEventStream<T> {
        OwnedEventStream {
            conn: self,
            pending: VecDeque::new(),
        }
    }
}
