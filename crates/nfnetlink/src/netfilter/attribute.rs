//! Recursive Netfilter attribute codec.
//!
//! Netfilter messages carry a tree of TLV attributes after the 4-byte
//! header. Each record is laid out as
//!
//! ```text
//! +-------------------+--------------------+---------+---------------+
//! | length (u16, ne)  | type (u16, ne)     | payload | pad to 4 bytes |
//! +-------------------+--------------------+---------+---------------+
//! ```
//!
//! where `length` covers header and payload (not padding). The top two bits
//! of `type` are flags: bit 15 marks a nested attribute whose payload is
//! itself a list of records, bit 14 marks a payload in network byte order.
//! A record may not set both.
//!
//! Decoding and encoding are pure functions of their input. Both stop at
//! [`MAX_NESTING_DEPTH`] levels of nesting.

use std::fmt;

use crate::netlink::attr::{
    AttrIter, NLA_F_NESTED, NLA_F_NET_BYTEORDER, NLA_HDRLEN, NLA_TYPE_MASK, nla_align, put_attr,
};
use crate::netlink::{Error, Result};

/// Deepest nesting accepted by [`decode`] and [`encode`].
pub const MAX_NESTING_DEPTH: usize = 32;

/// Attribute payload: raw bytes or child attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Payload {
    /// Uninterpreted bytes.
    Scalar {
        data: Vec<u8>,
        /// Set when the kernel flagged the payload as network byte order.
        net_byte_order: bool,
    },
    /// Child attributes.
    Nested(Vec<Attribute>),
}

impl Default for Payload {
    fn default() -> Self {
        Self::Scalar {
            data: Vec::new(),
            net_byte_order: false,
        }
    }
}

/// A Netfilter attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attribute {
    /// Attribute type with the flag bits cleared (0..=0x3FFF).
    pub kind: u16,
    pub payload: Payload,
    /// Wire length to write instead of the computed one. Never set by
    /// [`decode`].
    pub length: Option<u16>,
}

impl Attribute {
    /// Create a scalar attribute in host interpretation.
    pub fn scalar(kind: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: Payload::Scalar {
                data: data.into(),
                net_byte_order: false,
            },
            length: None,
        }
    }

    /// Create a scalar attribute flagged as network byte order.
    pub fn net_order(kind: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: Payload::Scalar {
                data: data.into(),
                net_byte_order: true,
            },
            length: None,
        }
    }

    /// Create a nested attribute.
    pub fn nested(kind: u16, children: Vec<Attribute>) -> Self {
        Self {
            kind,
            payload: Payload::Nested(children),
            length: None,
        }
    }

    pub fn from_u8(kind: u16, val: u8) -> Self {
        Self::scalar(kind, [val])
    }

    /// Big-endian `u16` payload.
    pub fn from_u16(kind: u16, val: u16) -> Self {
        Self::scalar(kind, val.to_be_bytes())
    }

    /// Big-endian `u32` payload.
    pub fn from_u32(kind: u16, val: u32) -> Self {
        Self::scalar(kind, val.to_be_bytes())
    }

    /// Big-endian `u64` payload.
    pub fn from_u64(kind: u16, val: u64) -> Self {
        Self::scalar(kind, val.to_be_bytes())
    }

    /// NUL-terminated string payload.
    pub fn from_str(kind: u16, s: &str) -> Self {
        let mut data = Vec::with_capacity(s.len() + 1);
        data.extend_from_slice(s.as_bytes());
        data.push(0);
        Self::scalar(kind, data)
    }

    /// Override the length written on encode.
    pub fn with_length(mut self, length: u16) -> Self {
        self.length = Some(length);
        self
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.payload, Payload::Nested(_))
    }

    pub fn is_net_byte_order(&self) -> bool {
        matches!(
            self.payload,
            Payload::Scalar {
                net_byte_order: true,
                ..
            }
        )
    }

    /// Child attributes, or `None` for a scalar.
    pub fn children(&self) -> Option<&[Attribute]> {
        match &self.payload {
            Payload::Nested(children) => Some(children),
            Payload::Scalar { .. } => None,
        }
    }

    /// First child of the given kind.
    pub fn find(&self, kind: u16) -> Option<&Attribute> {
        self.children()?.iter().find(|a| a.kind == kind)
    }

    /// Raw scalar payload.
    pub fn bytes(&self) -> Result<&[u8]> {
        match &self.payload {
            Payload::Scalar { data, .. } => Ok(data),
            Payload::Nested(_) => Err(Error::InvalidAttribute(format!(
                "attribute {} is nested, not a scalar",
                self.kind
            ))),
        }
    }

    fn array<const N: usize>(&self) -> Result<[u8; N]> {
        let data = self.bytes()?;
        data.try_into().map_err(|_| Error::WrongWidth {
            expected: N,
            actual: data.len(),
        })
    }

    pub fn u8(&self) -> Result<u8> {
        self.array::<1>().map(|[b]| b)
    }

    /// Payload as a big-endian `u16`.
    pub fn u16(&self) -> Result<u16> {
        self.array().map(u16::from_be_bytes)
    }

    /// Payload as a big-endian `u32`.
    pub fn u32(&self) -> Result<u32> {
        self.array().map(u32::from_be_bytes)
    }

    /// Payload as a big-endian `u64`.
    pub fn u64(&self) -> Result<u64> {
        self.array().map(u64::from_be_bytes)
    }

    pub fn i16(&self) -> Result<i16> {
        self.array().map(i16::from_be_bytes)
    }

    pub fn i32(&self) -> Result<i32> {
        self.array().map(i32::from_be_bytes)
    }

    pub fn i64(&self) -> Result<i64> {
        self.array().map(i64::from_be_bytes)
    }

    /// Payload as text, up to the first NUL byte.
    pub fn string(&self) -> Result<&str> {
        let data = self.bytes()?;
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..end])
            .map_err(|e| Error::InvalidAttribute(format!("attribute {}: {}", self.kind, e)))
    }

    /// Length field this attribute encodes to, padding of the record
    /// itself excluded.
    pub fn wire_len(&self) -> usize {
        if let Some(n) = self.length {
            return n as usize;
        }
        let payload = match &self.payload {
            Payload::Scalar { data, .. } => data.len(),
            Payload::Nested(children) => children.iter().map(|c| nla_align(c.wire_len())).sum(),
        };
        NLA_HDRLEN + payload
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Scalar {
                data,
                net_byte_order,
            } => write!(
                f,
                "<Length {}, Type {}, Nested false, NetByteOrder {}, {:?}>",
                self.wire_len(),
                self.kind,
                net_byte_order,
                data
            ),
            Payload::Nested(children) => {
                write!(
                    f,
                    "<Length {}, Type {}, Nested true, {} Children ([",
                    self.wire_len(),
                    self.kind,
                    children.len()
                )?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str("])>")
            }
        }
    }
}

/// Decode a buffer of attribute records into a tree.
pub fn decode(buf: &[u8]) -> Result<Vec<Attribute>> {
    decode_level(buf, 0)
}

fn decode_level(buf: &[u8], depth: usize) -> Result<Vec<Attribute>> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::NestingTooDeep {
            max: MAX_NESTING_DEPTH,
        });
    }

    let mut attrs = Vec::new();
    for raw in AttrIter::new(buf) {
        let raw = raw?;
        let header = raw.header;
        let kind = header.kind();

        if header.is_nested() && header.is_net_byteorder() {
            return Err(Error::ConflictingFlags { kind });
        }

        let payload = if header.is_nested() {
            Payload::Nested(decode_level(raw.payload, depth + 1)?)
        } else {
            Payload::Scalar {
                data: raw.payload.to_vec(),
                net_byte_order: header.is_net_byteorder(),
            }
        };

        attrs.push(Attribute {
            kind,
            payload,
            length: None,
        });
    }

    Ok(attrs)
}

/// Encode an attribute tree into its wire form.
///
/// Every record, the last one included, is padded to 4 bytes.
pub fn encode(attrs: &[Attribute]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_level(&mut buf, attrs, 0)?;
    Ok(buf)
}

fn encode_level(buf: &mut Vec<u8>, attrs: &[Attribute], depth: usize) -> Result<()> {
    check_depth(depth)?;
    for attr in attrs {
        encode_attr(buf, attr, depth)?;
    }
    Ok(())
}

pub(crate) fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::NestingTooDeep {
            max: MAX_NESTING_DEPTH,
        });
    }
    Ok(())
}

/// Reject a type id with either flag bit set; flags come from the payload.
pub(crate) fn check_kind(kind: u16) -> Result<()> {
    let flag_bits = kind & !NLA_TYPE_MASK;
    if flag_bits == NLA_F_NESTED | NLA_F_NET_BYTEORDER {
        return Err(Error::ConflictingFlags {
            kind: kind & NLA_TYPE_MASK,
        });
    }
    if flag_bits != 0 {
        return Err(Error::InvalidAttribute(format!(
            "attribute type {:#x} exceeds {:#x}",
            kind, NLA_TYPE_MASK
        )));
    }
    Ok(())
}

/// Append one attribute, and its subtree, at nesting level `depth`.
pub(crate) fn encode_attr(buf: &mut Vec<u8>, attr: &Attribute, depth: usize) -> Result<()> {
    check_kind(attr.kind)?;

    match &attr.payload {
        Payload::Nested(children) => {
            let mut inner = Vec::new();
            encode_level(&mut inner, children, depth + 1)?;
            put_record(buf, attr.kind, NLA_F_NESTED, attr.length, &inner)
        }
        Payload::Scalar {
            data,
            net_byte_order,
        } => {
            let flags = if *net_byte_order {
                NLA_F_NET_BYTEORDER
            } else {
                0
            };
            put_record(buf, attr.kind, flags, attr.length, data)
        }
    }
}

/// Write the record header and payload for an already checked `kind`.
pub(crate) fn put_record(
    buf: &mut Vec<u8>,
    kind: u16,
    flags: u16,
    length: Option<u16>,
    payload: &[u8],
) -> Result<()> {
    let needed = NLA_HDRLEN + payload.len();
    let nla_len = match length {
        Some(n) if (n as usize) < needed => {
            return Err(Error::MalformedLength {
                length: n as usize,
                remaining: needed,
            });
        }
        Some(n) => n,
        None => u16::try_from(needed).map_err(|_| Error::AttributeTooLarge {
            kind,
            length: needed,
        })?,
    };

    put_attr(buf, kind | flags, nla_len, payload);
    Ok(())
}
