//! Incremental attribute encoder.
//!
//! [`AttributeEncoder`] records `(kind, encode function)` pairs and runs
//! them only when [`AttributeEncoder::encode`] is called. Each entry writes
//! its record straight into the output buffer, so no attribute tree is
//! built. The output is byte-identical to
//! [`attribute::encode`](super::attribute::encode) on the equivalent tree.

use std::fmt;

use super::attribute::{self, Attribute};
use crate::netlink::Result;
use crate::netlink::attr::NLA_F_NESTED;

/// Appends one record at the given nesting depth.
type EncodeFn<'a> = Box<dyn FnOnce(&mut Vec<u8>, usize) -> Result<()> + Send + 'a>;

/// Builder for an attribute list whose payloads are produced on demand.
///
/// # Example
///
/// ```ignore
/// use nfnetlink::netfilter::AttributeEncoder;
///
/// let mut enc = AttributeEncoder::new();
/// enc.string(1, "filter");
/// enc.u32(2, 0x0a000001);
/// enc.nested(3, |nested| {
///     nested.u16(1, 443);
///     Ok(())
/// });
/// let bytes = enc.encode()?;
/// ```
#[derive(Default)]
pub struct AttributeEncoder<'a> {
    entries: Vec<EncodeFn<'a>>,
}

impl<'a> AttributeEncoder<'a> {
    /// Create an empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a scalar attribute whose payload is produced by `f`.
    pub fn lazy<F>(&mut self, kind: u16, f: F)
    where
        F: FnOnce() -> Result<Vec<u8>> + Send + 'a,
    {
        self.entries.push(Box::new(move |buf: &mut Vec<u8>, _depth: usize| {
            attribute::check_kind(kind)?;
            let data = f()?;
            attribute::put_record(buf, kind, 0, None, &data)
        }));
    }

    /// Register a complete attribute.
    pub fn attribute(&mut self, attr: Attribute) {
        self.entries.push(Box::new(move |buf: &mut Vec<u8>, depth: usize| {
            attribute::encode_attr(buf, &attr, depth)
        }));
    }

    /// Append raw bytes.
    pub fn bytes(&mut self, kind: u16, data: impl Into<Vec<u8>>) {
        self.attribute(Attribute::scalar(kind, data));
    }

    /// Append raw bytes flagged as network byte order.
    pub fn net_order(&mut self, kind: u16, data: impl Into<Vec<u8>>) {
        self.attribute(Attribute::net_order(kind, data));
    }

    pub fn u8(&mut self, kind: u16, val: u8) {
        self.attribute(Attribute::from_u8(kind, val));
    }

    /// Append a big-endian u16.
    pub fn u16(&mut self, kind: u16, val: u16) {
        self.attribute(Attribute::from_u16(kind, val));
    }

    /// Append a big-endian u32.
    pub fn u32(&mut self, kind: u16, val: u32) {
        self.attribute(Attribute::from_u32(kind, val));
    }

    /// Append a big-endian u64.
    pub fn u64(&mut self, kind: u16, val: u64) {
        self.attribute(Attribute::from_u64(kind, val));
    }

    /// Append a NUL-terminated string.
    pub fn string(&mut self, kind: u16, val: &str) {
        self.attribute(Attribute::from_str(kind, val));
    }

    /// Append an empty (flag) attribute.
    pub fn flag(&mut self, kind: u16) {
        self.attribute(Attribute::scalar(kind, Vec::new()));
    }

    /// Append a nested attribute whose children are registered by `f`.
    pub fn nested<F>(&mut self, kind: u16, f: F)
    where
        F: FnOnce(&mut AttributeEncoder<'a>) -> Result<()> + Send + 'a,
    {
        self.entries.push(Box::new(move |buf: &mut Vec<u8>, depth: usize| {
            attribute::check_kind(kind)?;
            let mut inner = AttributeEncoder::new();
            f(&mut inner)?;

            let mut payload = Vec::new();
            inner.encode_into(&mut payload, depth + 1)?;
            attribute::put_record(buf, kind, NLA_F_NESTED, None, &payload)
        }));
    }

    /// Run every registered function in order, appending to `buf`.
    ///
    /// Stops at the first failure; later functions are not called.
    fn encode_into(self, buf: &mut Vec<u8>, depth: usize) -> Result<()> {
        attribute::check_depth(depth)?;
        for entry in self.entries {
            entry(buf, depth)?;
        }
        Ok(())
    }

    /// Encode the registered attributes.
    pub fn encode(self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf, 0)?;
        Ok(buf)
    }
}

impl fmt::Debug for AttributeEncoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeEncoder")
            .field("entries", &self.entries.len())
            .finish()
    }
}
