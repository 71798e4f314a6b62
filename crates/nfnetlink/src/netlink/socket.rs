//! Low-level async netlink socket operations.

use std::fs::File;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::error::{Error, Result};
use super::message::{Message, MessageIter, NLM_F_ACK, NLM_F_DUMP};
use super::transport::{SocketOption, Transport};

/// Default receive buffer size, large enough for one kernel dump datagram.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 32768;

/// Socket configuration used when opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Create the socket inside this network namespace
    /// (e.g. `/var/run/netns/<name>` or `/proc/<pid>/ns/net`).
    pub netns: Option<PathBuf>,
    /// Capacity of the buffer each receive call reads into.
    pub recv_buffer_size: usize,
    /// Request extended ACK reporting; ignored if the kernel lacks it.
    pub ext_ack: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            netns: None,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            ext_ack: true,
        }
    }
}

impl Config {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the socket inside the given network namespace.
    pub fn netns(mut self, path: impl Into<PathBuf>) -> Self {
        self.netns = Some(path.into());
        self
    }

    /// Set the receive buffer size.
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Enable or disable extended ACK reporting.
    pub fn ext_ack(mut self, enable: bool) -> Self {
        self.ext_ack = enable;
        self
    }
}

/// Async netlink socket bound to NETLINK_NETFILTER.
pub struct NetlinkSocket {
    /// The underlying async file descriptor.
    fd: AsyncFd<Socket>,
    /// Sequence number counter.
    seq: AtomicU32,
    /// Local port ID (assigned by kernel).
    pid: u32,
    /// Receive buffer capacity.
    recv_buffer_size: usize,
}

impl NetlinkSocket {
    /// Create a new netfilter socket.
    pub fn new(config: &Config) -> Result<Self> {
        match &config.netns {
            Some(path) => Self::new_in_namespace(config, path),
            None => Self::create_socket(config),
        }
    }

    /// Create the socket inside the namespace at `ns_path`.
    ///
    /// This temporarily switches the calling thread to the target
    /// namespace, creates the socket, then restores the original namespace.
    /// The socket keeps operating in the target namespace afterwards.
    fn new_in_namespace(config: &Config, ns_path: &Path) -> Result<Self> {
        let ns_file = File::open(ns_path).map_err(|e| Error::transport("open namespace", e))?;

        // Save the current namespace so we can restore it
        let current_ns = File::open("/proc/self/ns/net")
            .map_err(|e| Error::transport("open namespace", e))?;

        // SAFETY: ns_file is an open namespace file descriptor.
        let ret = unsafe { libc::setns(ns_file.as_raw_fd(), libc::CLONE_NEWNET) };
        if ret < 0 {
            return Err(Error::transport("setns", std::io::Error::last_os_error()));
        }

        let result = Self::create_socket(config);

        // SAFETY: current_ns was opened from /proc/self/ns/net above.
        let restore_ret = unsafe { libc::setns(current_ns.as_raw_fd(), libc::CLONE_NEWNET) };
        if restore_ret < 0 {
            // The socket is usable; the thread is left in the wrong namespace.
            tracing::warn!(
                error = %std::io::Error::last_os_error(),
                "failed to restore original network namespace"
            );
        }

        result
    }

    /// Internal helper to create the socket.
    fn create_socket(config: &Config) -> Result<Self> {
        let dial = |e| Error::transport("dial", e);

        let mut socket = Socket::new(protocols::NETLINK_NETFILTER).map_err(dial)?;
        socket.set_non_blocking(true).map_err(dial)?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr).map_err(dial)?;
        socket.get_address(&mut addr).map_err(dial)?;
        let pid = addr.port_number();

        if config.ext_ack {
            socket.set_ext_ack(true).ok(); // Ignore if not supported
        }

        let fd = AsyncFd::new(socket).map_err(dial)?;
        tracing::debug!(pid, "opened netfilter netlink socket");

        Ok(Self {
            fd,
            seq: AtomicU32::new(1),
            pid,
            recv_buffer_size: config.recv_buffer_size,
        })
    }

    /// Get the next sequence number.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Send raw bytes.
    async fn send_bytes(&self, msg: &[u8]) -> Result<()> {
        loop {
            let mut guard = self
                .fd
                .ready(Interest::WRITABLE)
                .await
                .map_err(|e| Error::transport("send", e))?;

            match guard.try_io(|inner| inner.get_ref().send(msg, 0)) {
                Ok(result) => {
                    let n = result.map_err(|e| Error::transport("send", e))?;
                    tracing::trace!(bytes = n, "sent netlink message");
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Receive one datagram, allocating a buffer.
    async fn recv_bytes(&self) -> Result<Vec<u8>> {
        // Allocate buffer with capacity - don't resize, let recv fill it
        let mut buf = BytesMut::with_capacity(self.recv_buffer_size);

        loop {
            let mut guard = self
                .fd
                .ready(Interest::READABLE)
                .await
                .map_err(|e| Error::transport("receive", e))?;

            match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
                Ok(result) => {
                    let n = result.map_err(|e| Error::transport("receive", e))?;
                    tracing::trace!(bytes = n, "received netlink datagram");
                    return Ok(buf.to_vec());
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Stamp `msg` with a fresh sequence number and our port ID.
    fn stamp(&self, msg: &mut Message) -> u32 {
        let seq = self.next_seq();
        msg.header.nlmsg_seq = seq;
        msg.header.nlmsg_pid = self.pid;
        seq
    }
}

/// Pick the replies to request `seq` out of one received datagram.
///
/// Messages carrying another sequence number are left-overs from earlier
/// requests (a reply nobody read, or a query dropped mid-flight) and are
/// skipped. Our own replies must be addressed to `pid` or to 0.
///
/// Returns the replies and whether the request is complete: on
/// `NLMSG_DONE` or `NLMSG_ERROR`, or, when `multipart` is false and no reply
/// carries `NLM_F_MULTI`, after the first datagram holding a reply.
pub(crate) fn collect_replies(
    data: &[u8],
    seq: u32,
    pid: u32,
    multipart: bool,
) -> Result<(Vec<Message>, bool)> {
    let mut replies = Vec::new();
    let mut multi = multipart;

    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if header.nlmsg_seq != seq {
            tracing::trace!(
                expected = seq,
                actual = header.nlmsg_seq,
                "skipping stale netlink message"
            );
            continue;
        }
        if header.nlmsg_pid != 0 && header.nlmsg_pid != pid {
            return Err(Error::PidMismatch {
                expected: pid,
                actual: header.nlmsg_pid,
            });
        }

        multi |= header.is_multi();
        let terminal = header.is_done() || header.is_error();
        replies.push(Message {
            header,
            data: payload.to_vec(),
        });

        if terminal {
            return Ok((replies, true));
        }
    }

    let done = !multi && !replies.is_empty();
    Ok((replies, done))
}

impl Transport for NetlinkSocket {
    async fn execute(&self, mut msg: Message) -> Result<Vec<Message>> {
        let seq = self.stamp(&mut msg);
        let flags = msg.header.nlmsg_flags;
        self.send_bytes(&msg.to_bytes()?).await?;

        let multipart = flags & (NLM_F_ACK | NLM_F_DUMP) != 0;
        let mut replies = Vec::new();

        loop {
            let data = self.recv_bytes().await?;
            let (messages, done) = collect_replies(&data, seq, self.pid, multipart)?;
            replies.extend(messages);

            if done {
                break;
            }
        }

        tracing::trace!(seq, replies = replies.len(), "request complete");
        Ok(replies)
    }

    async fn send(&self, mut msg: Message) -> Result<Message> {
        self.stamp(&mut msg);
        self.send_bytes(&msg.to_bytes()?).await?;
        Ok(msg)
    }

    fn poll_receive(&self, cx: &mut Context<'_>) -> Poll<Result<Vec<Message>>> {
        let mut buf = BytesMut::with_capacity(self.recv_buffer_size);

        loop {
            let mut guard = match self.fd.poll_read_ready(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(Error::transport("receive", e))),
                Poll::Pending => return Poll::Pending,
            };

            match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
                Ok(Ok(_n)) => return Poll::Ready(Message::parse_all(&buf)),
                Ok(Err(e)) => return Poll::Ready(Err(Error::transport("receive", e))),
                Err(_would_block) => continue,
            }
        }
    }

    fn join_group(&mut self, group: u32) -> Result<()> {
        self.fd
            .get_mut()
            .add_membership(group)
            .map_err(|e| Error::transport("join group", e))
    }

    fn leave_group(&mut self, group: u32) -> Result<()> {
        self.fd
            .get_mut()
            .drop_membership(group)
            .map_err(|e| Error::transport("leave group", e))
    }

    fn set_option(&mut self, option: SocketOption, enable: bool) -> Result<()> {
        let socket = self.fd.get_mut();
        let result = match option {
            SocketOption::ListenAllNsid => socket.set_listen_all_namespaces(enable),
            SocketOption::ExtAck => socket.set_ext_ack(enable),
            SocketOption::CapAck => socket.set_cap_ack(enable),
            SocketOption::NoEnobufs => socket.set_no_enobufs(enable),
            SocketOption::BroadcastError => socket.set_broadcast_error(enable),
            SocketOption::PktInfo => socket.set_pktinfo(enable),
        };
        result.map_err(|e| Error::transport("set option", e))
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::message::{NLM_F_MULTI, NLM_F_REQUEST, NlMsgType};

    const PID: u32 = 4242;

    fn reply(msg_type: u16, flags: u16, seq: u32, pid: u32, data: Vec<u8>) -> Vec<u8> {
        let mut msg = Message::new(msg_type, flags, data);
        msg.header.nlmsg_seq = seq;
        msg.header.nlmsg_pid = pid;
        msg.to_bytes().unwrap()
    }

    fn ack(seq: u32, code: i32) -> Vec<u8> {
        let mut data = code.to_ne_bytes().to_vec();
        data.extend_from_slice(&[0; 16]);
        reply(NlMsgType::ERROR, 0, seq, PID, data)
    }

    #[test]
    fn collect_dump_across_datagrams() {
        let mut first = reply(0x0101, NLM_F_MULTI, 7, PID, vec![2, 0, 0, 0]);
        first.extend(reply(0x0101, NLM_F_MULTI, 7, PID, vec![2, 0, 0, 1]));

        let (msgs, done) = collect_replies(&first, 7, PID, true).unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(!done);

        let mut second = reply(0x0101, NLM_F_MULTI, 7, PID, vec![2, 0, 0, 2]);
        second.extend(reply(NlMsgType::DONE, NLM_F_MULTI, 7, PID, vec![0; 4]));

        let (msgs, done) = collect_replies(&second, 7, PID, true).unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(msgs[1].header.is_done());
        assert!(done);
    }

    #[test]
    fn collect_stops_at_error() {
        let mut data = ack(3, 0);
        // Anything after the ACK belongs to a later exchange.
        data.extend(reply(0x0101, 0, 3, PID, vec![2, 0, 0, 0]));

        let (msgs, done) = collect_replies(&data, 3, PID, true).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].error_code(), Some(0));
        assert!(done);
    }

    #[test]
    fn collect_single_datagram_without_multi() {
        let data = reply(0x0101, 0, 9, PID, vec![2, 0, 0, 0]);
        let (msgs, done) = collect_replies(&data, 9, PID, false).unwrap();
        assert_eq!(msgs.len(), 1);
        assert!(done);

        // A multipart reply to a plain request keeps the exchange open.
        let data = reply(0x0101, NLM_F_MULTI, 9, PID, vec![2, 0, 0, 0]);
        let (_, done) = collect_replies(&data, 9, PID, false).unwrap();
        assert!(!done);

        // So does an acknowledged request that has not seen its ACK yet.
        let data = reply(0x0101, 0, 9, PID, vec![2, 0, 0, 0]);
        let (_, done) = collect_replies(&data, 9, PID, true).unwrap();
        assert!(!done);
    }

    #[test]
    fn collect_skips_stale_sequence_numbers() {
        // A reply left over from request 1 arrives ahead of ours.
        let data = ack(1, 0);
        let (msgs, done) = collect_replies(&data, 2, PID, false).unwrap();
        assert!(msgs.is_empty());
        assert!(!done);

        let mut data = ack(1, -libc::ENOENT);
        data.extend(reply(0x0101, 0, 2, PID, vec![2, 0, 0, 0]));
        let (msgs, done) = collect_replies(&data, 2, PID, false).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].header.nlmsg_seq, 2);
        assert!(done);
    }

    #[test]
    fn collect_rejects_foreign_pid() {
        let data = reply(0x0101, 0, 5, PID + 1, vec![2, 0, 0, 0]);
        assert!(matches!(
            collect_replies(&data, 5, PID, false),
            Err(Error::PidMismatch {
                expected: PID,
                actual
            }) if actual == PID + 1
        ));

        // Kernel-originated replies carry port ID 0.
        let data = reply(0x0101, 0, 5, 0, vec![2, 0, 0, 0]);
        assert!(collect_replies(&data, 5, PID, false).is_ok());

        // Foreign port IDs on stale messages are not our concern.
        let data = reply(0x0101, 0, 4, PID + 1, vec![2, 0, 0, 0]);
        assert!(collect_replies(&data, 5, PID, false).is_ok());
    }

    #[test]
    fn collect_propagates_framing_errors() {
        let mut data = reply(0x0101, NLM_F_REQUEST, 5, PID, vec![]);
        data[0..4].copy_from_slice(&64u32.to_ne_bytes());
        assert!(matches!(
            collect_replies(&data, 5, PID, false),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.netns, None);
        assert_eq!(config.recv_buffer_size, DEFAULT_RECV_BUFFER_SIZE);
        assert!(config.ext_ack);
    }

    #[test]
    fn config_builder() {
        let config = Config::new()
            .netns("/var/run/netns/fw")
            .recv_buffer_size(1 << 16)
            .ext_ack(false);
        assert_eq!(config.netns, Some(PathBuf::from("/var/run/netns/fw")));
        assert_eq!(config.recv_buffer_size, 65536);
        assert!(!config.ext_ack);
    }
}
