//! Error types for the two-hop proxy.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating, resolving, dialing or relaying.
#[derive(Error, Debug)]
pub enum Error {
    /// First byte of a greeting or request was not the SOCKS5 version
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersionMismatch {
        /// Version this hop speaks
        expected: u8,
        /// Version byte the peer sent
        actual: u8,
    },

    /// Request command other than CONNECT
    #[error("unsupported command: 0x{0:02x}")]
    UnsupportedCommand(u8),

    /// Address type other than domain name
    #[error("unsupported address type: 0x{0:02x}")]
    UnsupportedAddressType(u8),

    /// Stream closed before a fixed-length field was complete
    #[error("short read: stream closed while reading {field}")]
    ShortRead {
        /// Field being read when the stream ended
        field: &'static str,
    },

    /// Variable-length field does not fit its 1-byte length prefix
    #[error("{field} too long: {len} bytes (max 255)")]
    FieldTooLong {
        /// Field name
        field: &'static str,
        /// Actual length in bytes
        len: usize,
    },

    /// Requested domain name is not valid UTF-8
    #[error("destination domain is not valid UTF-8 ({len} bytes)")]
    InvalidDomain {
        /// Length of the rejected domain
        len: usize,
    },

    /// Outbound connect failed
    #[error("dial {target} failed: {source}")]
    DialFailure {
        /// Address that was dialed
        target: String,
        /// Underlying connect error
        #[source]
        source: io::Error,
    },

    /// Outbound connect did not complete in time
    #[error("dial {target} timed out after {timeout:?}")]
    DialTimeout {
        /// Address that was dialed
        target: String,
        /// Connect timeout that elapsed
        timeout: Duration,
    },

    /// Greeting or request did not arrive in time
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// A copy direction failed while relaying
    #[error("relay error: {0}")]
    RelayIo(#[source] io::Error),

    /// Relay task panicked or was cancelled
    #[error("relay task aborted: {0}")]
    RelayAborted(String),

    /// Network I/O error outside the relay phase
    #[error("network error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a short-read error for the named field
    pub fn short_read(field: &'static str) -> Self {
        Error::ShortRead { field }
    }

    /// Wrap an I/O error from reading `field`, mapping a premature EOF to
    /// [`Error::ShortRead`].
    pub fn from_field_read(field: &'static str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::short_read(field)
        } else {
            Error::Io(err)
        }
    }

    /// Check if the peer sent something the wire codec refuses to parse
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::ProtocolVersionMismatch { .. }
                | Error::UnsupportedCommand(_)
                | Error::UnsupportedAddressType(_)
                | Error::ShortRead { .. }
                | Error::InvalidDomain { .. }
        )
    }

    /// Check if this error came from connecting to the next hop or target
    pub fn is_dial_error(&self) -> bool {
        matches!(self, Error::DialFailure { .. } | Error::DialTimeout { .. })
    }

    /// SOCKS5 reply code reported to the client under the strict reply policy.
    pub fn reply_code(&self) -> u8 {
        match self {
            Error::DialTimeout { .. } => crate::proxy::codec::REPLY_HOST_UNREACHABLE,
            Error::DialFailure { source, .. } => match source.kind() {
                io::ErrorKind::ConnectionRefused => crate::proxy::codec::REPLY_CONNECTION_REFUSED,
                _ => crate::proxy::codec::REPLY_GENERAL_FAILURE,
            },
            Error::UnsupportedCommand(_) => crate::proxy::codec::REPLY_COMMAND_NOT_SUPPORTED,
            Error::UnsupportedAddressType(_) => {
                crate::proxy::codec::REPLY_ADDRESS_TYPE_NOT_SUPPORTED
            }
            _ => crate::proxy::codec::REPLY_GENERAL_FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ProtocolVersionMismatch {
            expected: 5,
            actual: 4,
        };
        assert_eq!(err.to_string(), "protocol version mismatch: expected 5, got 4");

        let err = Error::UnsupportedAddressType(0x01);
        assert_eq!(err.to_string(), "unsupported address type: 0x01");

        let err = Error::short_read("port");
        assert_eq!(err.to_string(), "short read: stream closed while reading port");
    }

    #[test]
    fn test_field_read_mapping() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            Error::from_field_read("address", eof),
            Error::ShortRead { field: "address" }
        ));

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(Error::from_field_read("address", reset), Error::Io(_)));
    }

    #[test]
    fn test_error_classes() {
        assert!(Error::UnsupportedCommand(2).is_protocol_error());
        assert!(Error::short_read("methods").is_protocol_error());
        assert!(!Error::config("x").is_protocol_error());
        assert!(Error::InvalidDomain { len: 3 }.is_protocol_error());

        let dial = Error::DialTimeout {
            target: "localhost:80".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(dial.is_dial_error());
        assert!(!dial.is_protocol_error());
    }

    #[test]
    fn test_reply_codes() {
        let refused = Error::DialFailure {
            target: "localhost:1".into(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(refused.reply_code(), 0x05);

        let timeout = Error::DialTimeout {
            target: "localhost:1".into(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(timeout.reply_code(), 0x04);
        assert_eq!(Error::UnsupportedCommand(2).reply_code(), 0x07);
        assert_eq!(Error::config("x").reply_code(), 0x01);
    }
}
