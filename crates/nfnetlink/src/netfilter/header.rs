//! Netfilter header (nfgenmsg) and the split Netlink message type.
//!
//! Every Netfilter message body starts with a 4-byte header:
//!
//! ```text
//! +-------------+--------------+---------------------------+
//! | family (1B) | version (1B) | resource ID (2B, big end) |
//! +-------------+--------------+---------------------------+
//! ```
//!
//! The 16-bit Netlink message type is divided in two: the high byte is the
//! subsystem, the low byte a subsystem-specific message type.

use std::fmt;

use winnow::binary::{be_u16, le_u8};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;

use crate::netlink::{Error, Result};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// Size of the Netfilter header.
pub const NFGENMSG_LEN: usize = 4;

/// NFNETLINK_V0, the only header version the kernel defines.
pub const NFNETLINK_V0: u8 = 0;

/// Protocol family carried in the Netfilter header (`NFPROTO_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtoFamily {
    #[default]
    Unspec,
    Inet,
    Ipv4,
    Arp,
    Netdev,
    Bridge,
    Ipv6,
    Decnet,
    /// Any value without a named variant.
    ///
    /// Decoding never produces `Other` for a named value, so `Other(2)`
    /// encodes like [`Ipv4`](Self::Ipv4) but does not compare equal to it.
    /// Use [`canonical`](Self::canonical) on hand-built values.
    Other(u8),
}

impl ProtoFamily {
    /// The variant decoding would produce for this value.
    pub fn canonical(self) -> Self {
        Self::from(u8::from(self))
    }
}

impl From<u8> for ProtoFamily {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Unspec,
            1 => Self::Inet,
            2 => Self::Ipv4,
            3 => Self::Arp,
            5 => Self::Netdev,
            7 => Self::Bridge,
            10 => Self::Ipv6,
            12 => Self::Decnet,
            other => Self::Other(other),
        }
    }
}

impl From<ProtoFamily> for u8 {
    fn from(family: ProtoFamily) -> Self {
        match family {
            ProtoFamily::Unspec => 0,
            ProtoFamily::Inet => 1,
            ProtoFamily::Ipv4 => 2,
            ProtoFamily::Arp => 3,
            ProtoFamily::Netdev => 5,
            ProtoFamily::Bridge => 7,
            ProtoFamily::Ipv6 => 10,
            ProtoFamily::Decnet => 12,
            ProtoFamily::Other(v) => v,
        }
    }
}

/// Netfilter subsystem (`NFNL_SUBSYS_*`), the high byte of the Netlink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SubsystemId {
    #[default]
    None,
    Conntrack,
    ConntrackExp,
    Queue,
    Ulog,
    Osf,
    Ipset,
    Acct,
    ConntrackTimeout,
    Cthelper,
    Nftables,
    NftCompat,
    Hook,
    /// Any value without a named variant. As with [`ProtoFamily::Other`],
    /// named values only round-trip to their named variant.
    Other(u8),
}

impl SubsystemId {
    /// The variant decoding would produce for this value.
    pub fn canonical(self) -> Self {
        Self::from(u8::from(self))
    }
}

impl From<u8> for SubsystemId {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::None,
            1 => Self::Conntrack,
            2 => Self::ConntrackExp,
            3 => Self::Queue,
            4 => Self::Ulog,
            5 => Self::Osf,
            6 => Self::Ipset,
            7 => Self::Acct,
            8 => Self::ConntrackTimeout,
            9 => Self::Cthelper,
            10 => Self::Nftables,
            11 => Self::NftCompat,
            12 => Self::Hook,
            other => Self::Other(other),
        }
    }
}

impl From<SubsystemId> for u8 {
    fn from(id: SubsystemId) -> Self {
        match id {
            SubsystemId::None => 0,
            SubsystemId::Conntrack => 1,
            SubsystemId::ConntrackExp => 2,
            SubsystemId::Queue => 3,
            SubsystemId::Ulog => 4,
            SubsystemId::Osf => 5,
            SubsystemId::Ipset => 6,
            SubsystemId::Acct => 7,
            SubsystemId::ConntrackTimeout => 8,
            SubsystemId::Cthelper => 9,
            SubsystemId::Nftables => 10,
            SubsystemId::NftCompat => 11,
            SubsystemId::Hook => 12,
            SubsystemId::Other(v) => v,
        }
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Conntrack => "ctnetlink",
            Self::ConntrackExp => "ctnetlink_exp",
            Self::Queue => "queue",
            Self::Ulog => "ulog",
            Self::Osf => "osf",
            Self::Ipset => "ipset",
            Self::Acct => "acct",
            Self::ConntrackTimeout => "ctnetlink_timeout",
            Self::Cthelper => "cthelper",
            Self::Nftables => "nftables",
            Self::NftCompat => "nft_compat",
            Self::Hook => "hook",
            Self::Other(v) => return write!(f, "{}", v),
        };
        f.write_str(name)
    }
}

/// Netfilter multicast groups (`NFNLGRP_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Group {
    ConntrackNew,
    ConntrackUpdate,
    ConntrackDestroy,
    ConntrackExpNew,
    ConntrackExpUpdate,
    ConntrackExpDestroy,
    Nftables,
    AcctQuota,
    Nftrace,
    /// Any group without a named variant.
    Other(u32),
}

impl Group {
    /// All conntrack event groups.
    pub const CONNTRACK: [Group; 3] = [
        Group::ConntrackNew,
        Group::ConntrackUpdate,
        Group::ConntrackDestroy,
    ];

    /// All conntrack expectation event groups.
    pub const CONNTRACK_EXP: [Group; 3] = [
        Group::ConntrackExpNew,
        Group::ConntrackExpUpdate,
        Group::ConntrackExpDestroy,
    ];

    /// The group number passed to the kernel.
    pub fn number(&self) -> u32 {
        match self {
            Self::ConntrackNew => 1,
            Self::ConntrackUpdate => 2,
            Self::ConntrackDestroy => 3,
            Self::ConntrackExpNew => 4,
            Self::ConntrackExpUpdate => 5,
            Self::ConntrackExpDestroy => 6,
            Self::Nftables => 7,
            Self::AcctQuota => 8,
            Self::Nftrace => 9,
            Self::Other(n) => *n,
        }
    }
}

impl From<u32> for Group {
    fn from(val: u32) -> Self {
        match val {
            1 => Self::ConntrackNew,
            2 => Self::ConntrackUpdate,
            3 => Self::ConntrackDestroy,
            4 => Self::ConntrackExpNew,
            5 => Self::ConntrackExpUpdate,
            6 => Self::ConntrackExpDestroy,
            7 => Self::Nftables,
            8 => Self::AcctQuota,
            9 => Self::Nftrace,
            other => Self::Other(other),
        }
    }
}

impl From<Group> for u32 {
    fn from(group: Group) -> Self {
        group.number()
    }
}

/// The Netlink message type as Netfilter reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeaderType {
    /// Subsystem the message is for (high byte).
    pub subsystem: SubsystemId,
    /// Subsystem-specific message type (low byte). Its meaning depends
    /// entirely on `subsystem`.
    pub message_type: u8,
}

impl HeaderType {
    pub fn new(subsystem: SubsystemId, message_type: u8) -> Self {
        Self {
            subsystem,
            message_type,
        }
    }
}

impl From<u16> for HeaderType {
    fn from(nlmsg_type: u16) -> Self {
        Self {
            subsystem: SubsystemId::from((nlmsg_type >> 8) as u8),
            message_type: (nlmsg_type & 0xff) as u8,
        }
    }
}

impl From<HeaderType> for u16 {
    fn from(ht: HeaderType) -> Self {
        (u16::from(u8::from(ht.subsystem)) << 8) | u16::from(ht.message_type)
    }
}

impl fmt::Display for HeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.subsystem, self.message_type)
    }
}

/// The Netfilter header (`struct nfgenmsg`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    pub family: ProtoFamily,
    pub version: u8,
    /// Resource ID, e.g. a queue number or conntrack zone. Big-endian on the wire.
    pub resource_id: u16,
}

impl Header {
    pub fn new(family: ProtoFamily, version: u8, resource_id: u16) -> Self {
        Self {
            family,
            version,
            resource_id,
        }
    }

    /// Parse the header from the front of `input`, advancing it.
    pub fn parse(input: &mut &[u8]) -> PResult<Self> {
        let family = le_u8.parse_next(input)?;
        let version = le_u8.parse_next(input)?;
        let resource_id = be_u16.parse_next(input)?;
        Ok(Self {
            family: ProtoFamily::from(family),
            version,
            resource_id,
        })
    }

    /// Decode the header from the first 4 bytes of `buf`.
    ///
    /// Bytes past the header are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let short = || Error::Truncated {
            expected: NFGENMSG_LEN,
            actual: buf.len(),
        };
        if buf.len() < NFGENMSG_LEN {
            return Err(short());
        }
        let mut input = buf;
        Self::parse(&mut input).map_err(|_| short())
    }

    /// Encode the header into its 4-byte wire form.
    pub fn encode(&self) -> [u8; NFGENMSG_LEN] {
        let [hi, lo] = self.resource_id.to_be_bytes();
        [self.family.into(), self.version, hi, lo]
    }
}
