use bytes::Bytes;
use tessera_apdu_core::{Command, Response};

use crate::constants::{CLA_ISO, INS_SELECT};
use crate::error::{Error, Result, Step};

/// SELECT command for the wallet applet
#[derive(Debug)]
pub struct SelectCommand {
    aid: Bytes,
}

impl SelectCommand {
    /// Create a SELECT command for an application identifier.
    pub fn with_aid(aid: impl Into<Bytes>) -> Self {
        Self { aid: aid.into() }
    }

    /// Render as a command APDU.
    pub fn to_command(&self) -> Command {
        Command::new_with_data(CLA_ISO, INS_SELECT, 0x04, 0x00, self.aid.clone())
    }

    /// Check the card's answer; any status other than `90 00` means the
    /// applet is absent or refused selection.
    pub fn parse_response(response: &Response) -> Result<()> {
        if !response.is_success() {
            return Err(Error::UnexpectedStatus {
                step: Step::Select,
                sw: response.status(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::WALLET_AID;
    use tessera_apdu_core::StatusWord;

    #[test]
    fn test_select_wire_format() {
        let cmd = SelectCommand::with_aid(WALLET_AID);
        assert_eq!(
            cmd.to_command().to_bytes().as_ref(),
            hex::decode("00A4040007A0000010000112").unwrap()
        );
    }

    #[test]
    fn test_rejects_file_not_found() {
        let response = Response::from_bytes(&[0x6A, 0x82]).unwrap();
        let err = SelectCommand::parse_response(&response).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedStatus {
                step: Step::Select,
                sw,
            } if sw == StatusWord::new(0x6A, 0x82)
        ));
    }
}
