//! Common test utilities.
//!
//! Provides `MockTransport`, an in-memory [`Transport`] for exercising
//! `Connection` without a kernel, and helper macros for tests that need
//! root.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::task::{Context, Poll};

use nfnetlink::netlink::NlMsgType;
use nfnetlink::{Error, Message, Result, SocketOption, Transport};

type Handler = Box<dyn Fn(&Message) -> Result<Vec<Message>> + Send + Sync>;

/// In-memory transport.
///
/// Requests are answered by a handler closure; multicast traffic is
/// queued with [`MockTransport::push_incoming`]. Group and option calls
/// are recorded.
pub struct MockTransport {
    handler: Handler,
    sent: Mutex<Vec<Message>>,
    incoming: Mutex<VecDeque<Result<Vec<Message>>>>,
    pub joined: Vec<u32>,
    pub left: Vec<u32>,
    pub options: Vec<(SocketOption, bool)>,
    failing_group: Option<u32>,
}

impl MockTransport {
    /// Create a transport that answers every request with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Message) -> Result<Vec<Message>> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            sent: Mutex::new(Vec::new()),
            incoming: Mutex::new(VecDeque::new()),
            joined: Vec::new(),
            left: Vec::new(),
            options: Vec::new(),
            failing_group: None,
        }
    }

    /// Create a transport that echoes each request back.
    pub fn echo() -> Self {
        Self::new(|msg| Ok(vec![msg.clone()]))
    }

    /// Make joining or leaving `group` fail.
    pub fn fail_group(mut self, group: u32) -> Self {
        self.failing_group = Some(group);
        self
    }

    /// Queue a datagram for `receive`.
    pub fn push_incoming(&self, batch: Vec<Message>) {
        self.incoming.lock().unwrap().push_back(Ok(batch));
    }

    /// Queue a receive error.
    pub fn push_error(&self, err: Error) {
        self.incoming.lock().unwrap().push_back(Err(err));
    }

    /// Requests sent so far.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    fn check_group(&self, operation: &'static str, group: u32) -> Result<()> {
        if self.failing_group == Some(group) {
            return Err(Error::transport(
                operation,
                io::Error::from_raw_os_error(libc::EINVAL),
            ));
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    async fn execute(&self, msg: Message) -> Result<Vec<Message>> {
        self.sent.lock().unwrap().push(msg.clone());
        (self.handler)(&msg)
    }

    async fn send(&self, msg: Message) -> Result<Message> {
        self.sent.lock().unwrap().push(msg.clone());
        Ok(msg)
    }

    fn poll_receive(&self, _cx: &mut Context<'_>) -> Poll<Result<Vec<Message>>> {
        match self.incoming.lock().unwrap().pop_front() {
            Some(batch) => Poll::Ready(batch),
            None => Poll::Pending,
        }
    }

    fn join_group(&mut self, group: u32) -> Result<()> {
        self.check_group("join group", group)?;
        self.joined.push(group);
        Ok(())
    }

    fn leave_group(&mut self, group: u32) -> Result<()> {
        self.check_group("leave group", group)?;
        self.left.push(group);
        Ok(())
    }

    fn set_option(&mut self, option: SocketOption, enable: bool) -> Result<()> {
        self.options.push((option, enable));
        Ok(())
    }
}

/// Build an `NLMSG_ERROR` reply carrying `code` (negative errno, or 0 for ACK).
pub fn error_reply(code: i32, request: &Message) -> Message {
    let mut data = code.to_ne_bytes().to_vec();
    data.extend_from_slice(request.header.as_bytes());
    Message::new(NlMsgType::ERROR, 0, data)
}

/// Build an `NLMSG_DONE` reply.
pub fn done_reply() -> Message {
    Message::new(NlMsgType::DONE, 0x02, 0i32.to_ne_bytes().to_vec())
}

/// Route library logs to the test output.
///
/// Honors `RUST_LOG` (e.g. `RUST_LOG=nfnetlink=trace`); defaults to warnings.
/// Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_test_writer()
        .try_init();
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}
