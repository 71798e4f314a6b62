//! Netfilter messages: header and attribute tree inside a Netlink message.

use std::fmt;

use super::attribute::{self, Attribute};
use super::header::{Header, HeaderType, NFGENMSG_LEN};
use crate::netlink::{Error, Message, Result};

/// A decoded Netfilter message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NfMessage {
    /// Netlink message type split into subsystem and message type.
    pub header_type: HeaderType,
    /// Netlink header flags (`NLM_F_*`).
    pub flags: u16,
    /// Netfilter header.
    pub header: Header,
    pub attributes: Vec<Attribute>,
}

impl NfMessage {
    pub fn new(header_type: HeaderType, flags: u16, header: Header) -> Self {
        Self {
            header_type,
            flags,
            header,
            attributes: Vec::new(),
        }
    }

    /// Set the attribute list.
    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Self {
        self.attributes = attributes;
        self
    }

    /// First top-level attribute of the given kind.
    pub fn attribute(&self, kind: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.kind == kind)
    }

    /// Decode a Netlink message.
    ///
    /// The body must hold at least the 4-byte Netfilter header. Attribute
    /// errors are reported under the `"decoding attributes"` context.
    pub fn from_netlink(msg: &Message) -> Result<Self> {
        if msg.data.len() < NFGENMSG_LEN {
            return Err(Error::Truncated {
                expected: NFGENMSG_LEN,
                actual: msg.data.len(),
            });
        }

        let header = Header::decode(&msg.data[..NFGENMSG_LEN])?;
        let attributes = attribute::decode(&msg.data[NFGENMSG_LEN..])
            .map_err(|e| e.context("decoding attributes"))?;

        Ok(Self {
            header_type: HeaderType::from(msg.header.nlmsg_type),
            flags: msg.header.nlmsg_flags,
            header,
            attributes,
        })
    }

    /// Encode into a Netlink message.
    ///
    /// Sequence number and port ID are left at zero for the transport to fill in.
    pub fn to_netlink(&self) -> Result<Message> {
        marshal_netlink(self.header_type, self.flags, self.header, &self.attributes)
    }
}

impl TryFrom<&Message> for NfMessage {
    type Error = Error;

    fn try_from(msg: &Message) -> Result<Self> {
        Self::from_netlink(msg)
    }
}

impl fmt::Display for NfMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} flags={:#06x} family={} version={} res_id={} attrs={}",
            self.header_type,
            self.flags,
            u8::from(self.header.family),
            self.header.version,
            self.header.resource_id,
            self.attributes.len()
        )
    }
}

/// Split a Netlink message into its Netfilter header type, header and
/// attribute tree.
pub fn unmarshal_netlink(msg: &Message) -> Result<(HeaderType, Header, Vec<Attribute>)> {
    let nf = NfMessage::from_netlink(msg)?;
    Ok((nf.header_type, nf.header, nf.attributes))
}

/// Build a Netlink message from a Netfilter header type, Netlink flags,
/// header and attributes.
pub fn marshal_netlink(
    header_type: HeaderType,
    flags: u16,
    header: Header,
    attributes: &[Attribute],
) -> Result<Message> {
    let attrs = attribute::encode(attributes)?;

    let mut data = Vec::with_capacity(NFGENMSG_LEN + attrs.len());
    data.extend_from_slice(&header.encode());
    data.extend_from_slice(&attrs);

    Ok(Message::new(header_type.into(), flags, data))
}
