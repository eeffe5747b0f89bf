//! Error taxonomy for wallet card operations

use std::fmt;

use tessera_apdu_core::{CommandError, ResponseError, StatusWord, TransportError};

/// Result type for wallet card operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol step during which an error was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Applet selection.
    Select,
    /// Certificate retrieval.
    GetCertificate,
    /// Ephemeral key exchange.
    OpenSecureChannel,
    /// Mutual authentication.
    MutuallyAuthenticate,
    /// A secured command after the handshake.
    SecureCommand,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "SELECT",
            Self::GetCertificate => "GET CERTIFICATE",
            Self::OpenSecureChannel => "OPEN SECURE CHANNEL",
            Self::MutuallyAuthenticate => "MUTUALLY AUTHENTICATE",
            Self::SecureCommand => "secured command",
        };
        f.write_str(name)
    }
}

/// Error type for wallet card operations.
///
/// Every handshake-step error is unrecoverable for the current attempt: the
/// channel returns to `Disconnected` and the session is wiped. Retry means
/// calling `connect()` again.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport could not complete an exchange.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A command APDU could not be built or parsed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// A response APDU was structurally invalid.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// The card answered a step with a status word other than the expected
    /// one.
    #[error("unexpected status word during {step}: {sw}")]
    UnexpectedStatus {
        /// Step that observed the status.
        step: Step,
        /// Status word returned by the card.
        sw: StatusWord,
    },

    /// A response data field had the wrong size for its step.
    #[error("response length mismatch during {step}: expected {expected} bytes, got {actual}")]
    ResponseLengthMismatch {
        /// Step that observed the mismatch.
        step: Step,
        /// Required data length.
        expected: usize,
        /// Actual data length.
        actual: usize,
    },

    /// ECDH produced a degenerate shared secret.
    #[error("key agreement produced a degenerate shared secret")]
    KeyAgreementFailed,

    /// MAC verification failed on a secured response. Fatal to the session.
    #[error("MAC verification failed on secured response")]
    MacMismatch,

    /// No card is present on the reader.
    #[error("no card present")]
    NoCardPresent,

    /// `connect()` was called while a session is already authenticated.
    #[error("secure channel already established; disconnect first")]
    AlreadyConnected,

    /// A secured command was attempted without an authenticated session.
    #[error("secure channel not established")]
    SecureChannelNotEstablished,

    /// The card certificate violates its fixed layout.
    #[error("malformed card certificate: {0}")]
    InvalidCertificate(&'static str),

    /// Removing the bit padding of a decrypted payload failed.
    #[error("invalid padding in decrypted payload")]
    Unpad(#[from] cipher::block_padding::UnpadError),

    /// An elliptic curve operation rejected its input.
    #[error(transparent)]
    EllipticCurve(#[from] p256::elliptic_curve::Error),
}
