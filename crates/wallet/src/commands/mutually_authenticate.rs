use bytes::{BufMut, Bytes, BytesMut};
use cipher::Iv;
use tessera_apdu_core::{Command, Response};

use crate::constants::{CLA_WALLET, INS_MUTUALLY_AUTHENTICATE, MUTUAL_AUTH_RESPONSE_LEN};
use crate::crypto::WalletScp;
use crate::error::{Error, Result, Step};

/// MUTUALLY AUTHENTICATE command for the wallet applet
#[derive(Debug)]
pub struct MutuallyAuthenticateCommand {
    mac: Iv<WalletScp>,
    ciphertext: Bytes,
}

impl MutuallyAuthenticateCommand {
    /// Create a MUTUALLY AUTHENTICATE command from the challenge ciphertext
    /// and its MAC.
    pub fn new(mac: &Iv<WalletScp>, ciphertext: &Bytes) -> Self {
        Self {
            mac: *mac,
            ciphertext: ciphertext.clone(),
        }
    }

    /// Render as a command APDU: `MAC(16) ‖ ciphertext`.
    pub fn to_command(&self) -> Command {
        let mut data = BytesMut::with_capacity(self.mac.len() + self.ciphertext.len());
        data.put_slice(&self.mac);
        data.put_slice(&self.ciphertext);
        Command::new_with_data(
            CLA_WALLET,
            INS_MUTUALLY_AUTHENTICATE,
            0x00,
            0x00,
            data.freeze(),
        )
    }

    /// Extract the initial rolling IV from the card's answer.
    ///
    /// The response data must be exactly 64 bytes; its first 16 bytes seed
    /// the session's rolling IV.
    pub fn parse_response(response: &Response) -> Result<Iv<WalletScp>> {
        if !response.is_success() {
            return Err(Error::UnexpectedStatus {
                step: Step::MutuallyAuthenticate,
                sw: response.status(),
            });
        }
        match response.payload() {
            Some(payload) if payload.len() == MUTUAL_AUTH_RESPONSE_LEN => {
                Ok(*Iv::<WalletScp>::from_slice(&payload[..16]))
            }
            payload => Err(Error::ResponseLengthMismatch {
                step: Step::MutuallyAuthenticate,
                expected: MUTUAL_AUTH_RESPONSE_LEN,
                actual: payload.map_or(0, |p| p.len()),
            }),
        }
    }
}
