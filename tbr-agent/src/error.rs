use thiserror::Error;

/// Error codes surfaced by the OpenThread stack. Codes are passed through
/// verbatim; anything without a dedicated variant lands in [`OtError::Other`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtError {
    #[error("Failed")]
    Failed,
    #[error("Drop")]
    Drop,
    #[error("NoBufs")]
    NoBufs,
    #[error("Busy")]
    Busy,
    #[error("Parse")]
    Parse,
    #[error("InvalidArgs")]
    InvalidArgs,
    #[error("Security")]
    Security,
    #[error("Abort")]
    Abort,
    #[error("NotImplemented")]
    NotImplemented,
    #[error("InvalidState")]
    InvalidState,
    #[error("Detached")]
    Detached,
    #[error("NotFound")]
    NotFound,
    #[error("Already")]
    Already,
    #[error("ResponseTimeout")]
    ResponseTimeout,
    #[error("InvalidCommand")]
    InvalidCommand,
    #[error("Rejected")]
    Rejected,
    #[error("Error {0}")]
    Other(u8),
    /// Failure in the adapter talking to the stack, rather than the stack itself
    #[error("Stack adapter error {0}")]
    Adapter(String),
}

impl OtError {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => OtError::Failed,
            2 => OtError::Drop,
            3 => OtError::NoBufs,
            5 => OtError::Busy,
            6 => OtError::Parse,
            7 => OtError::InvalidArgs,
            8 => OtError::Security,
            11 => OtError::Abort,
            12 => OtError::NotImplemented,
            13 => OtError::InvalidState,
            16 => OtError::Detached,
            23 => OtError::NotFound,
            24 => OtError::Already,
            28 => OtError::ResponseTimeout,
            35 => OtError::InvalidCommand,
            37 => OtError::Rejected,
            other => OtError::Other(other),
        }
    }

    /// Numeric stack code, `None` for adapter failures
    pub fn code(&self) -> Option<u8> {
        let code = match self {
            OtError::Failed => 1,
            OtError::Drop => 2,
            OtError::NoBufs => 3,
            OtError::Busy => 5,
            OtError::Parse => 6,
            OtError::InvalidArgs => 7,
            OtError::Security => 8,
            OtError::Abort => 11,
            OtError::NotImplemented => 12,
            OtError::InvalidState => 13,
            OtError::Detached => 16,
            OtError::NotFound => 23,
            OtError::Already => 24,
            OtError::ResponseTimeout => 28,
            OtError::InvalidCommand => 35,
            OtError::Rejected => 37,
            OtError::Other(code) => *code,
            OtError::Adapter(_) => return None,
        };
        Some(code)
    }
}

/// Errors returned (or delivered to result handlers) by the network
/// operations of [`ThreadHelper`](crate::ThreadHelper)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThreadError {
    #[error("An attach or join is already in progress")]
    Busy,
    #[error("Invalid argument: {0}")]
    InvalidArgs(String),
    #[error("Stack response timeout")]
    ResponseTimeout,
    #[error("Operation aborted")]
    Aborted,
    #[error("OT stack error: {0}")]
    Stack(OtError),
}

impl From<OtError> for ThreadError {
    fn from(e: OtError) -> Self {
        match e {
            OtError::ResponseTimeout => ThreadError::ResponseTimeout,
            OtError::Abort => ThreadError::Aborted,
            e => ThreadError::Stack(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_codes_pass_through() {
        for code in 0..=u8::MAX {
            assert_eq!(OtError::from_code(code).code(), Some(code));
        }
        assert_eq!(OtError::Adapter("ot-ctl missing".into()).code(), None);
    }

    #[test]
    fn timeout_maps_to_its_own_kind() {
        assert_eq!(
            ThreadError::from(OtError::ResponseTimeout),
            ThreadError::ResponseTimeout
        );
        assert_eq!(
            ThreadError::from(OtError::Security),
            ThreadError::Stack(OtError::Security)
        );
    }
}
