//! Response APDU parsing and status word handling

use std::fmt;

use bytes::Bytes;

/// Errors raised while interpreting a response APDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    /// The buffer is shorter than the two-byte status trailer.
    #[error("response shorter than the two-byte status trailer")]
    TooShort,

    /// The trailer did not match the status expected for this step.
    #[error("unexpected status word: expected {expected}, got {actual}")]
    UnexpectedStatus {
        /// Status the caller required.
        expected: StatusWord,
        /// Status actually returned by the card.
        actual: StatusWord,
    },
}

/// The two trailer bytes `SW1 SW2` of a response APDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte.
    pub sw1: u8,
    /// Second status byte.
    pub sw2: u8,
}

impl StatusWord {
    /// Normal completion, `90 00`.
    pub const SUCCESS: Self = Self::new(0x90, 0x00);

    /// Create a status word from its two bytes.
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Whether this is the `90 00` success status.
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// A parsed response APDU: optional payload plus the status trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    data: Option<Bytes>,
    status: StatusWord,
}

impl Response {
    /// Split raw wire bytes into payload and status word.
    ///
    /// The last two bytes are always the status word; anything before them
    /// is the data field.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ResponseError> {
        if bytes.len() < 2 {
            return Err(ResponseError::TooShort);
        }

        let (payload, trailer) = bytes.split_at(bytes.len() - 2);
        let data = if payload.is_empty() {
            None
        } else {
            Some(Bytes::copy_from_slice(payload))
        };

        Ok(Self {
            data,
            status: StatusWord::new(trailer[0], trailer[1]),
        })
    }

    /// Data field preceding the status trailer, if any.
    pub const fn payload(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Status word.
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Whether the status word is `90 00`.
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Require an exact status word, returning the payload on match.
    pub fn expect_status(&self, expected: StatusWord) -> Result<Option<&Bytes>, ResponseError> {
        if self.status == expected {
            Ok(self.payload())
        } else {
            Err(ResponseError::UnexpectedStatus {
                expected,
                actual: self.status,
            })
        }
    }
}

/// Check the status trailer of a raw response buffer against an expected
/// value.
///
/// Fails with [`ResponseError::TooShort`] when the buffer is under two
/// bytes; otherwise the comparison is an exact match of the last two bytes,
/// with no wildcard semantics and no other side effect.
pub fn check_status_word(response: &[u8], expected: StatusWord) -> Result<(), ResponseError> {
    if response.len() < 2 {
        return Err(ResponseError::TooShort);
    }

    let actual = StatusWord::new(response[response.len() - 2], response[response.len() - 1]);
    if actual == expected {
        Ok(())
    } else {
        Err(ResponseError::UnexpectedStatus { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_payload_and_status() {
        let response = Response::from_bytes(&[0xDE, 0xAD, 0xBE, 0xEF, 0x90, 0x00]).unwrap();
        assert_eq!(response.payload().unwrap().as_ref(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(response.is_success());
    }

    #[test]
    fn test_status_only() {
        let response = Response::from_bytes(&[0x6A, 0x82]).unwrap();
        assert!(response.payload().is_none());
        assert_eq!(response.status(), StatusWord::new(0x6A, 0x82));
        assert!(!response.is_success());
    }

    #[test]
    fn test_too_short() {
        assert_eq!(Response::from_bytes(&[0x90]), Err(ResponseError::TooShort));
        assert_eq!(Response::from_bytes(&[]), Err(ResponseError::TooShort));
    }

    #[test]
    fn test_check_status_word_exact_match_only() {
        assert!(check_status_word(&[0x01, 0x90, 0x00], StatusWord::SUCCESS).is_ok());
        // Near misses must not pass
        assert!(check_status_word(&[0x90, 0x01], StatusWord::SUCCESS).is_err());
        assert!(check_status_word(&[0x91, 0x00], StatusWord::SUCCESS).is_err());
        assert!(check_status_word(&[0x61, 0x10], StatusWord::SUCCESS).is_err());
        // And short buffers report the structural problem
        assert_eq!(
            check_status_word(&[0x90], StatusWord::SUCCESS),
            Err(ResponseError::TooShort)
        );
    }

    #[test]
    fn test_expect_status() {
        let response = Response::from_bytes(&[0xAA, 0x90, 0x00]).unwrap();
        assert!(response.expect_status(StatusWord::SUCCESS).is_ok());
        let err = response
            .expect_status(StatusWord::new(0x61, 0x00))
            .unwrap_err();
        assert_eq!(
            err,
            ResponseError::UnexpectedStatus {
                expected: StatusWord::new(0x61, 0x00),
                actual: StatusWord::SUCCESS,
            }
        );
    }
}
