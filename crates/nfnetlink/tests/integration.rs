//! Live NETLINK_NETFILTER socket tests.
//!
//! These need a kernel with nfnetlink and, for group membership and
//! conntrack dumps, root privileges:
//!
//! ```bash
//! sudo cargo test --test integration --features integration
//! ```

#[macro_use]
#[path = "common/mod.rs"]
mod common;

use std::time::Duration;

use nfnetlink::netlink::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST};
use nfnetlink::netlink::Transport;
use nfnetlink::{
    Config, Connection, Error, Group, Header, HeaderType, NfMessage, ProtoFamily, Result,
    SocketOption, SubsystemId,
};

#[tokio::test]
async fn test_open_close() -> Result<()> {
    common::init_tracing();
    let conn = Connection::open()?;
    assert!(!conn.is_multicast());
    conn.close()
}

#[tokio::test]
async fn test_open_with_config() -> Result<()> {
    common::init_tracing();
    let config = Config::new().recv_buffer_size(1 << 16).ext_ack(false);
    let conn = Connection::open_with(&config)?;
    conn.close()
}

#[tokio::test]
async fn test_open_in_missing_namespace() {
    common::init_tracing();
    let config = Config::new().netns("/var/run/netns/nfnetlink-test-does-not-exist");
    let err = Connection::open_with(&config).err().unwrap();
    assert!(matches!(err, Error::Transport { .. }));
}

#[tokio::test]
async fn test_join_leave_groups() -> Result<()> {
    common::init_tracing();
    require_root!();

    let mut conn = Connection::open()?;
    conn.join_groups(&Group::CONNTRACK)?;
    assert!(conn.is_multicast());

    conn.leave_groups(&Group::CONNTRACK)?;
    assert!(conn.is_multicast());

    let request = NfMessage::new(
        HeaderType::new(SubsystemId::Conntrack, 1),
        NLM_F_REQUEST | NLM_F_DUMP,
        Header::new(ProtoFamily::Ipv4, 0, 0),
    );
    assert!(matches!(
        conn.request(&request).await,
        Err(Error::ConnIsMulticast)
    ));

    conn.close()
}

#[tokio::test]
async fn test_join_invalid_group() -> Result<()> {
    common::init_tracing();
    require_root!();

    let mut conn = Connection::open()?;
    let err = conn.join_groups(&[Group::Other(255)]).unwrap_err();
    assert!(matches!(
        err,
        Error::Transport {
            operation: "join group",
            ..
        }
    ));
    assert!(!conn.is_multicast());

    conn.close()
}

#[tokio::test]
async fn test_query_after_unread_reply() -> Result<()> {
    common::init_tracing();

    let conn = Connection::open()?;
    let request = NfMessage::new(
        HeaderType::new(SubsystemId::Conntrack, 1),
        NLM_F_REQUEST | NLM_F_DUMP | NLM_F_ACK,
        Header::new(ProtoFamily::Ipv4, 0, 0),
    )
    .to_netlink()?;

    // Leave the reply to this one sitting in the socket.
    conn.transport().send(request.clone()).await?;

    // Every later query must get its own reply, whatever the kernel says.
    for _ in 0..3 {
        match tokio::time::timeout(Duration::from_secs(5), conn.query(request.clone())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.errno().is_some() => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => panic!("query timed out"),
        }
    }

    conn.close()
}

#[tokio::test]
async fn test_set_options() -> Result<()> {
    common::init_tracing();
    require_root!();

    let mut conn = Connection::open()?;
    conn.set_option(SocketOption::NoEnobufs, true)?;
    conn.set_option(SocketOption::CapAck, true)?;
    conn.close()
}

#[tokio::test]
async fn test_conntrack_dump() -> Result<()> {
    common::init_tracing();
    require_root!();

    let conn = Connection::open()?;
    let request = NfMessage::new(
        HeaderType::new(SubsystemId::Conntrack, 1),
        NLM_F_REQUEST | NLM_F_DUMP,
        Header::new(ProtoFamily::Ipv4, 0, 0),
    );

    // The conntrack module may not be loaded; only the framing is checked.
    match tokio::time::timeout(Duration::from_secs(5), conn.request(&request)).await {
        Ok(Ok(entries)) => {
            for entry in entries {
                assert_eq!(entry.header_type.subsystem, SubsystemId::Conntrack);
            }
        }
        Ok(Err(e)) if e.errno().is_some() => {}
        Ok(Err(e)) => return Err(e),
        Err(_) => panic!("conntrack dump timed out"),
    }

    conn.close()
}
