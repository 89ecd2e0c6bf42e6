use std::fmt;
use std::io;

use tickwire_channel::{ChannelError, ManagerError, NetworkErrorKind};
use tickwire_frame::FrameError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_kind_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_kind_code(err.kind()), format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn channel_error(context: &str, err: &ChannelError) -> CliError {
    let code = match (err.kind, err.socket_error) {
        (NetworkErrorKind::AddressFamilyUnsupported, _) => USAGE,
        (_, Some(kind)) => match io_kind_code(kind) {
            INTERNAL => TRANSPORT_ERROR,
            code => code,
        },
        (
            NetworkErrorKind::Serialize
            | NetworkErrorKind::DeserializeHeader
            | NetworkErrorKind::DeserializeBody,
            _,
        ) => DATA_INVALID,
        (NetworkErrorKind::Send, None) => USAGE,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn manager_error(context: &str, err: ManagerError) -> CliError {
    match err {
        ManagerError::AlreadyExists(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ManagerError::InvalidHeaderLength(_) => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
    }
}
