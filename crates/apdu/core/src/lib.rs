//! Core APDU types for smart card communication
//!
//! This crate provides the byte-level ISO 7816-4 command/response codec and
//! the [`CardTransport`] contract that concrete reader backends implement.
//! It carries no cryptography and no session state; higher layers build
//! secure messaging on top of these types.

mod command;
mod response;
mod transport;

pub use command::{Command, CommandError, MAX_DATA_LEN};
pub use response::{Response, ResponseError, StatusWord, check_status_word};
pub use transport::{CardTransport, MockTransport, TransportError};
