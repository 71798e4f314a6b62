//! Netfilter connection with request/response handling and multicast groups.

use super::header::Group;
use super::message::NfMessage;
use crate::netlink::{Config, Error, Message, NetlinkSocket, Result, SocketOption, Transport};

/// A Netfilter netlink connection.
///
/// Wraps a [`Transport`] (a [`NetlinkSocket`] unless built with
/// [`Connection::from_transport`]). Once any multicast group has been
/// joined the connection only receives: [`query`](Self::query) fails with
/// [`Error::ConnIsMulticast`] from then on, even after every group is
/// left again.
pub struct Connection<T: Transport = NetlinkSocket> {
    transport: T,
    multicast: bool,
}

impl Connection<NetlinkSocket> {
    /// Open a NETLINK_NETFILTER socket with the default configuration.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use nfnetlink::Connection;
    ///
    /// let conn = Connection::open()?;
    /// ```
    pub fn open() -> Result<Self> {
        Self::open_with(&Config::default())
    }

    /// Open a NETLINK_NETFILTER socket with the given configuration.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use nfnetlink::{Config, Connection};
    ///
    /// // Listen for conntrack events inside a named namespace
    /// let config = Config::new().netns("/var/run/netns/fw");
    /// let conn = Connection::open_with(&config)?;
    /// ```
    pub fn open_with(config: &Config) -> Result<Self> {
        Ok(Self::from_transport(NetlinkSocket::new(config)?))
    }
}

impl<T: Transport> Connection<T> {
    /// Wrap an existing transport.
    pub fn from_transport(transport: T) -> Self {
        Self {
            transport,
            multicast: false,
        }
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether a multicast group has ever been joined on this connection.
    pub fn is_multicast(&self) -> bool {
        self.multicast
    }

    /// Close the connection, releasing the transport.
    pub fn close(self) -> Result<()> {
        self.transport.close()
    }

    /// Send a request and collect the replies.
    ///
    /// If the first reply is an `NLMSG_ERROR` carrying a non-zero code the
    /// kernel error is returned instead. All other replies, ACKs included,
    /// are passed through as received.
    pub async fn query(&self, msg: Message) -> Result<Vec<Message>> {
        if self.multicast {
            return Err(Error::ConnIsMulticast);
        }

        let replies = self.transport.execute(msg).await?;

        match replies.first().and_then(Message::error_code) {
            Some(code) if code != 0 => {
                tracing::debug!(errno = -code, "kernel rejected request");
                Err(Error::from_errno(code))
            }
            _ => Ok(replies),
        }
    }

    /// Send a Netfilter message and decode the replies.
    ///
    /// Netlink control messages (ACK, DONE) are dropped from the result.
    pub async fn request(&self, msg: &NfMessage) -> Result<Vec<NfMessage>> {
        let replies = self.query(msg.to_netlink()?).await?;
        replies
            .iter()
            .filter(|m| !m.header.is_control())
            .map(NfMessage::from_netlink)
            .collect()
    }

    /// Subscribe to multicast groups.
    ///
    /// Groups are joined in order; the first failure is returned without
    /// leaving the groups already joined. On success the connection becomes
    /// receive-only for good.
    pub fn join_groups(&mut self, groups: &[Group]) -> Result<()> {
        if groups.is_empty() {
            return Err(Error::NoGroups);
        }

        for group in groups {
            self.transport.join_group(group.number())?;
            tracing::debug!(group = group.number(), "joined multicast group");
        }

        self.multicast = true;
        Ok(())
    }

    /// Unsubscribe from multicast groups.
    ///
    /// Same fail-fast rule as [`join_groups`](Self::join_groups). Leaving
    /// never makes a receive-only connection usable for queries again.
    pub fn leave_groups(&mut self, groups: &[Group]) -> Result<()> {
        if groups.is_empty() {
            return Err(Error::NoGroups);
        }

        for group in groups {
            self.transport.leave_group(group.number())?;
            tracing::debug!(group = group.number(), "left multicast group");
        }

        Ok(())
    }

    /// Wait for the next batch of messages from the kernel.
    pub async fn receive(&self) -> Result<Vec<Message>> {
        self.transport.receive().await
    }

    /// Toggle a socket option.
    pub fn set_option(&mut self, option: SocketOption, enable: bool) -> Result<()> {
        self.transport.set_option(option, enable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn connection_is_send_sync() {
        assert_send::<Connection>();
        assert_sync::<Connection>();
    }
}
