//! Mod for the concrete adapters the daemon runs with: the stack is
//! driven through the ot-ctl CLI and multicast routes are programmed
//! through smcroutectl
mod cli;
mod smcroute;

pub use cli::OtCliStack;
pub use smcroute::SmcRouteSink;

use thiserror::Error;

use crate::OtError;

#[derive(Error, Debug)]
pub enum OtClientError {
    #[error("I/O Error {0}")]
    Io(#[from] std::io::Error),
    #[error("Str utf8 parse Error")]
    StrParse(#[from] std::str::Utf8Error),
    #[error("OT stack error {0}")]
    Ot(#[from] OtError),
    #[error("OT Client Error {0}")]
    OtClientErr(String),
}

impl From<OtClientError> for OtError {
    fn from(e: OtClientError) -> Self {
        match e {
            OtClientError::Ot(e) => e,
            other => OtError::Adapter(other.to_string()),
        }
    }
}
