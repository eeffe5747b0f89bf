use bytes::Bytes;
use p256::{PublicKey, elliptic_curve::sec1::ToEncodedPoint};
use tessera_apdu_core::{Command, Response};

use crate::constants::{CLA_WALLET, INS_OPEN_SECURE_CHANNEL};
use crate::crypto::Salt;
use crate::error::{Error, Result, Step};

/// OPEN SECURE CHANNEL command for the wallet applet
#[derive(Debug)]
pub struct OpenSecureChannelCommand {
    public_key: PublicKey,
}

impl OpenSecureChannelCommand {
    /// Create an OPEN SECURE CHANNEL command announcing our ephemeral
    /// public key.
    pub fn with_public_key(public_key: &PublicKey) -> Self {
        Self {
            public_key: *public_key,
        }
    }

    /// Render as a command APDU. The data field is the SEC1 uncompressed
    /// encoding: the `04` format marker followed by the 64 coordinate
    /// bytes.
    pub fn to_command(&self) -> Command {
        let point = self.public_key.to_encoded_point(false);
        Command::new_with_data(
            CLA_WALLET,
            INS_OPEN_SECURE_CHANNEL,
            0x00,
            0x00,
            Bytes::copy_from_slice(point.as_bytes()),
        )
    }

    /// Extract the 32-byte session salt from the card's answer.
    pub fn parse_response(response: &Response) -> Result<Salt> {
        if !response.is_success() {
            return Err(Error::UnexpectedStatus {
                step: Step::OpenSecureChannel,
                sw: response.status(),
            });
        }
        match response.payload() {
            Some(payload) if payload.len() == 32 => Ok(Salt::clone_from_slice(payload)),
            payload => Err(Error::ResponseLengthMismatch {
                step: Step::OpenSecureChannel,
                expected: 32,
                actual: payload.map_or(0, |p| p.len()),
            }),
        }
    }
}
