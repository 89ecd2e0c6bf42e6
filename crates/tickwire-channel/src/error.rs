use std::fmt;
use std::io;

/// What part of the transport a [`ChannelError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    /// The target address is not an IPv4 or IPv6 address.
    AddressFamilyUnsupported,
    /// The socket could not be created.
    SocketCreation,
    /// Connecting failed or timed out.
    Connect,
    /// Sending failed, timed out, or the send request was rejected.
    Send,
    /// Receiving failed.
    Receive,
    /// The helper could not serialize an outbound packet.
    Serialize,
    /// The helper could not decode a packet header.
    DeserializeHeader,
    /// The helper could not decode a packet body.
    DeserializeBody,
}

impl NetworkErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddressFamilyUnsupported => "address-family-unsupported",
            Self::SocketCreation => "socket-creation",
            Self::Connect => "connect",
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Serialize => "serialize",
            Self::DeserializeHeader => "deserialize-header",
            Self::DeserializeBody => "deserialize-body",
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A channel failure.
///
/// The same value is returned to synchronous callers and published to
/// error subscribers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct ChannelError {
    /// Failure category.
    pub kind: NetworkErrorKind,
    /// Socket-level error, `None` when the failure did not come from a socket.
    pub socket_error: Option<io::ErrorKind>,
    /// Human-readable description.
    pub message: String,
}

impl ChannelError {
    /// Create an error that did not originate from a socket.
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            socket_error: None,
            message: message.into(),
        }
    }

    /// Create an error from a socket I/O failure.
    pub fn from_io(kind: NetworkErrorKind, err: &io::Error) -> Self {
        Self {
            kind,
            socket_error: Some(err.kind()),
            message: err.to_string(),
        }
    }

    /// Create the error synthesized when an operation outlives its timeout.
    pub fn timed_out(kind: NetworkErrorKind, waited_seconds: f32) -> Self {
        Self {
            kind,
            socket_error: Some(io::ErrorKind::TimedOut),
            message: format!("{kind} timed out after {waited_seconds:.2}s"),
        }
    }

    /// Whether this error was synthesized by the timeout accounting.
    pub fn is_timeout(&self) -> bool {
        self.socket_error == Some(io::ErrorKind::TimedOut)
    }
}

/// Errors returned by [`ChannelManager`](crate::ChannelManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// A channel with this name is already registered.
    #[error("channel '{0}' already exists")]
    AlreadyExists(String),

    /// The helper declares an unusable packet header length.
    #[error("packet header length must be positive (got {0})")]
    InvalidHeaderLength(usize),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = ChannelError::new(NetworkErrorKind::Send, "packet is invalid");
        assert_eq!(err.to_string(), "send error: packet is invalid");
        assert!(err.socket_error.is_none());
    }

    #[test]
    fn io_errors_keep_their_kind() {
        let io = io::Error::from(io::ErrorKind::ConnectionReset);
        let err = ChannelError::from_io(NetworkErrorKind::Receive, &io);
        assert_eq!(err.socket_error, Some(io::ErrorKind::ConnectionReset));
        assert!(!err.is_timeout());
    }

    #[test]
    fn timeouts_are_marked() {
        let err = ChannelError::timed_out(NetworkErrorKind::Connect, 10.5);
        assert!(err.is_timeout());
        assert_eq!(err.message, "connect timed out after 10.50s");
    }
}
