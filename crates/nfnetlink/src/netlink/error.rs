//! Error types for netlink and netfilter operations.

use std::io;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during netlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport operation (dial, send, receive, group membership) failed.
    #[error("netlink {operation}: {source}")]
    Transport {
        /// The transport operation that failed.
        operation: &'static str,
        /// The underlying socket error.
        #[source]
        source: io::Error,
    },

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel error with operation context.
    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        /// The operation that failed.
        operation: String,
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// An attribute's declared length is shorter than its header or runs
    /// past the end of the buffer.
    #[error("invalid attribute length {length}: {remaining} bytes remaining")]
    MalformedLength {
        /// Declared (or requested) attribute length.
        length: usize,
        /// Bytes available for the record.
        remaining: usize,
    },

    /// The nested and net byte order flags were both set on one attribute.
    #[error("invalid attribute {kind}: cannot have both nested and net byte order flags")]
    ConflictingFlags {
        /// Attribute type with flag bits cleared.
        kind: u16,
    },

    /// Attribute tree exceeds the nesting limit.
    #[error("attribute nesting exceeds {max} levels")]
    NestingTooDeep {
        /// The configured nesting limit.
        max: usize,
    },

    /// An encoded attribute does not fit in a 16-bit length field.
    #[error("attribute {kind} too large: {length} bytes")]
    AttributeTooLarge {
        /// Attribute type.
        kind: u16,
        /// Encoded record length.
        length: usize,
    },

    /// Scalar payload has the wrong width for the requested accessor.
    #[error("unexpected attribute payload width: expected {expected} bytes, got {actual}")]
    WrongWidth {
        /// Width required by the accessor.
        expected: usize,
        /// Width of the payload.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Port ID mismatch.
    #[error("port ID mismatch: expected {expected}, got {actual}")]
    PidMismatch {
        /// Port ID of the local socket.
        expected: u32,
        /// Port ID found in the reply.
        actual: u32,
    },

    /// The connection joined a multicast group and can no longer carry
    /// request/response traffic.
    #[error(
        "connection is attached to one or more multicast groups and can no longer be used for queries"
    )]
    ConnIsMulticast,

    /// A group operation was called without any groups.
    #[error("no multicast groups given")]
    NoGroups,

    /// An error wrapped with the step that produced it.
    #[error("{context}: {source}")]
    Context {
        /// What was being done.
        context: &'static str,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a kernel error from an errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Create a kernel error with operation context.
    pub fn from_errno_with_context(errno: i32, operation: impl Into<String>) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::KernelWithContext {
            operation: operation.into(),
            errno: -errno,
            message,
        }
    }

    /// Wrap a socket error with the transport operation that produced it.
    pub fn transport(operation: &'static str, source: io::Error) -> Self {
        Self::Transport { operation, source }
    }

    /// Wrap this error with a description of the step that failed.
    pub fn context(self, context: &'static str) -> Self {
        Self::Context {
            context,
            source: Box::new(self),
        }
    }

    /// Add context to this error.
    ///
    /// Wraps kernel errors with operation context. Other errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Kernel { errno, message } => Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            },
            other => other,
        }
    }

    /// The innermost error, looking through [`Error::Context`] wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV, etc.).
    pub fn is_not_found(&self) -> bool {
        matches!(self.errno(), Some(libc::ENOENT | libc::ENODEV))
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self.root_cause() {
            Self::Transport { source, .. } => source.kind() == io::ErrorKind::PermissionDenied,
            other => matches!(other.errno(), Some(libc::EPERM | libc::EACCES)),
        }
    }

    /// Check if this is a "already exists" error (EEXIST).
    pub fn is_already_exists(&self) -> bool {
        self.errno() == Some(libc::EEXIST)
    }

    /// Check if this is a "device busy" error (EBUSY).
    pub fn is_busy(&self) -> bool {
        self.errno() == Some(libc::EBUSY)
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self.root_cause() {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_from_errno() {
        let err = Error::from_errno(-1); // EPERM
        assert!(err.is_permission_denied());
        assert_eq!(err.errno(), Some(1));
    }

    #[test]
    fn test_from_errno_with_context() {
        let err = Error::from_errno_with_context(-2, "dumping conntrack table"); // ENOENT
        assert!(err.is_not_found());
        let msg = err.to_string();
        assert!(msg.contains("dumping conntrack table"));
        assert!(msg.contains("No such file or directory"));
    }

    #[test]
    fn test_with_context() {
        let err = Error::from_errno(-13); // EACCES
        let err = err.with_context("creating ipset");
        assert!(err.is_permission_denied());
        assert!(err.to_string().contains("creating ipset"));
    }

    #[test]
    fn test_is_busy_and_exists() {
        assert!(Error::from_errno(-16).is_busy());
        assert!(!Error::from_errno(-1).is_busy());
        assert!(Error::from_errno(-17).is_already_exists());
    }

    #[test]
    fn test_context_keeps_root_cause() {
        let err = Error::ConflictingFlags { kind: 7 }.context("decoding attributes");
        assert!(matches!(
            err.root_cause(),
            Error::ConflictingFlags { kind: 7 }
        ));
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "decoding attributes: invalid attribute 7: cannot have both nested and net byte order flags"
        );
    }

    #[test]
    fn test_transport_message() {
        let err = Error::transport(
            "join group",
            io::Error::from_raw_os_error(libc::EINVAL),
        );
        assert!(err.to_string().starts_with("netlink join group: "));
        assert_eq!(err.errno(), None);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::ConnIsMulticast.to_string(),
            "connection is attached to one or more multicast groups and can no longer be used for queries"
        );
        assert_eq!(
            Error::WrongWidth {
                expected: 4,
                actual: 2
            }
            .to_string(),
            "unexpected attribute payload width: expected 4 bytes, got 2"
        );
    }
}
