use std::fmt;

use thiserror::Error;

/// Outcome vocabulary shared by every client operation and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    NotFound,
    SizeExceeded,
    Busy,
    ConnectionFailed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NotFound => "NOT_FOUND",
            Status::SizeExceeded => "SIZE_EXCEEDED",
            Status::Busy => "BUSY",
            Status::ConnectionFailed => "CONNECTION_FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The segment is absent but the namespace's registry is alive.
    #[error("segment {name} not found; topic was never provisioned")]
    NotFound { name: String },
    /// The segment is absent and no registry has claimed the namespace.
    #[error("segment {name} not found; is the registry running?")]
    ConnectionFailed { name: String },
    #[error("payload of {len} bytes exceeds topic capacity of {capacity} bytes")]
    SizeExceeded { len: usize, capacity: usize },
    #[error("flag stayed busy after {attempts} attempts")]
    Busy { attempts: u32 },
    #[error("invalid segment name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("declaration {address} has an empty initial value")]
    EmptyInitialValue { address: String },
    #[error("config error: {0}")]
    Config(String),
    #[error("signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::NotFound { .. } => Status::NotFound,
            Error::SizeExceeded { .. } => Status::SizeExceeded,
            Error::Busy { .. } => Status::Busy,
            Error::ConnectionFailed { .. }
            | Error::InvalidName { .. }
            | Error::EmptyInitialValue { .. }
            | Error::Config(_)
            | Error::Signal(_)
            | Error::Io(_) => Status::ConnectionFailed,
        }
    }

    /// True when the named segment does not exist, whatever the registry state.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::ConnectionFailed { .. })
    }

    /// Only busy errors are worth retrying at a higher level.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Busy { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = Error::SizeExceeded {
            len: 8,
            capacity: 6,
        };
        assert_eq!(err.status(), Status::SizeExceeded);
        assert!(!err.is_connection());

        let err = Error::NotFound {
            name: "PBB_a_b".to_string(),
        };
        assert_eq!(err.status(), Status::NotFound);
        assert!(err.is_connection());

        let err = Error::ConnectionFailed {
            name: "PBB_a_b".to_string(),
        };
        assert_eq!(err.status(), Status::ConnectionFailed);
        assert!(err.is_connection());

        assert!(Error::Busy { attempts: 3 }.is_transient());
        assert_eq!(Status::Busy.to_string(), "BUSY");
    }
}
