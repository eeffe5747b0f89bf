use bytes::Bytes;
use tessera_apdu_core::{Command, Response};

use crate::certificate::CardCertificate;
use crate::constants::{CLA_WALLET, INS_GET_CERTIFICATE};
use crate::crypto::CardNonce;
use crate::error::{Error, Result, Step};

/// GET CERTIFICATE command for the wallet applet
#[derive(Debug)]
pub struct GetCertificateCommand {
    nonce: CardNonce,
}

impl GetCertificateCommand {
    /// Create a GET CERTIFICATE command carrying a fresh random nonce as
    /// challenge.
    pub fn with_nonce(nonce: &CardNonce) -> Self {
        Self { nonce: *nonce }
    }

    /// Render as a command APDU.
    pub fn to_command(&self) -> Command {
        Command::new_with_data(
            CLA_WALLET,
            INS_GET_CERTIFICATE,
            0x00,
            0x00,
            Bytes::copy_from_slice(&self.nonce),
        )
    }

    /// Extract the certificate from the card's answer.
    pub fn parse_response(response: &Response) -> Result<CardCertificate> {
        if !response.is_success() {
            return Err(Error::UnexpectedStatus {
                step: Step::GetCertificate,
                sw: response.status(),
            });
        }
        let payload = response.payload().cloned().unwrap_or_default();
        CardCertificate::from_bytes(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_carries_nonce() {
        let nonce = CardNonce::clone_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let cmd = GetCertificateCommand::with_nonce(&nonce);
        assert_eq!(
            cmd.to_command().to_bytes().as_ref(),
            hex::decode("80F80000080102030405060708").unwrap()
        );
    }

    #[test]
    fn test_missing_payload_is_malformed() {
        let response = Response::from_bytes(&[0x90, 0x00]).unwrap();
        assert!(matches!(
            GetCertificateCommand::parse_response(&response),
            Err(Error::InvalidCertificate(_))
        ));
    }
}
