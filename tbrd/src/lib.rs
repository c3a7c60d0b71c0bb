//! Daemon side of the Thread border router: compile time configuration
//! and the event pump that keeps the [`tbr_agent::Agent`] actor fed

pub mod config;
pub mod pump;

use tbr_agent::OtError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TbrdError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Logger setup Error")]
    SetLogger(#[from] log::SetLoggerError),
    #[error("Tracing subscriber setup Error")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
    #[error("Agent mailbox Error")]
    Mailbox(#[from] actix::MailboxError),
    #[error("OT stack error {0}")]
    Ot(#[from] OtError),
    #[error("Config Error {0}")]
    Config(String),
}

pub type TbrdResult<T> = std::result::Result<T, TbrdError>;
