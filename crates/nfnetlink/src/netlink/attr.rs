//! Flat netlink attribute (nlattr) reader and writer.
//!
//! This layer only knows the base TLV record shape: a native-endian
//! `u16` length that includes the 4-byte header, a `u16` type field, and a
//! payload padded to [`NLA_ALIGNTO`]. Nesting and the two flag bits hidden
//! in the type field are interpreted by [`crate::netfilter::attribute`].

use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4; // nla_align(size_of::<NlAttr>())

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// Netlink attribute header (mirrors struct nlattr).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type, flag bits included.
    pub nla_type: u16,
}

impl NlAttr {
    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Check if this is a nested attribute.
    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    /// Check if the payload is in network byte order.
    pub fn is_net_byteorder(&self) -> bool {
        self.nla_type & NLA_F_NET_BYTEORDER != 0
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes. The input needs no particular alignment.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(attr, _)| attr)
            .map_err(|_| Error::Truncated {
                expected: NLA_HDRLEN,
                actual: data.len(),
            })
    }
}

/// A single undecoded attribute record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAttr<'a> {
    /// Record header as found on the wire.
    pub header: NlAttr,
    /// Payload, `nla_len - NLA_HDRLEN` bytes, padding excluded.
    pub payload: &'a [u8],
}

/// Iterator over netlink attributes in a buffer.
///
/// Unlike a lenient dump parser, every structural problem is reported: a
/// record header that does not fit, a length below [`NLA_HDRLEN`], or a
/// length running past the buffer all yield [`Error::MalformedLength`],
/// after which the iterator is exhausted.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Result<RawAttr<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        let remaining = self.data.len();
        let header = match NlAttr::from_bytes(self.data) {
            Ok(h) => h,
            Err(_) => {
                self.data = &[];
                return Some(Err(Error::MalformedLength {
                    length: remaining,
                    remaining,
                }));
            }
        };

        let len = header.nla_len as usize;
        if len < NLA_HDRLEN || len > remaining {
            self.data = &[];
            return Some(Err(Error::MalformedLength {
                length: len,
                remaining,
            }));
        }

        let payload = &self.data[NLA_HDRLEN..len];

        // The final record may omit its padding.
        let aligned_len = nla_align(len);
        if aligned_len >= remaining {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok(RawAttr { header, payload }))
    }
}

/// Append one attribute record to `buf`.
///
/// `nla_len` is written verbatim; when it is larger than the record's
/// header plus `payload`, the difference is zero-filled. The record is
/// then padded to [`NLA_ALIGNTO`].
pub fn put_attr(buf: &mut Vec<u8>, nla_type: u16, nla_len: u16, payload: &[u8]) {
    let start = buf.len();
    let header = NlAttr { nla_len, nla_type };
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(payload);

    let record_end = start + (nla_len as usize).max(NLA_HDRLEN + payload.len());
    buf.resize(record_end, 0);

    // Pad to alignment
    let aligned = start + nla_align(record_end - start);
    buf.resize(aligned, 0);
}
