//! ISO 7816-4 command APDU construction and parsing

use bytes::{BufMut, Bytes, BytesMut};

/// Maximum size of a short-APDU data field.
pub const MAX_DATA_LEN: usize = 255;

/// Errors raised while parsing a command APDU from raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Fewer than the four mandatory header bytes.
    #[error("command shorter than the four-byte header")]
    Truncated,

    /// The Lc byte does not match the actual data field length.
    #[error("command length field inconsistent with buffer size")]
    InvalidLength,
}

/// A command APDU: class, instruction, parameters, optional data field and
/// optional expected-length byte.
///
/// The data field is limited to [`MAX_DATA_LEN`] bytes; exceeding it is a
/// caller programming error and asserts during serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Option<Bytes>,
    le: Option<u8>,
}

impl Command {
    /// Create a case-1 command (header only).
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a command with a data field.
    pub fn new_with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: impl Into<Bytes>) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Attach a data field.
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Attach an expected-length (Le) byte.
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Class byte.
    pub const fn class(&self) -> u8 {
        self.cla
    }

    /// Instruction byte.
    pub const fn instruction(&self) -> u8 {
        self.ins
    }

    /// First parameter byte.
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter byte.
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Data field, if any.
    pub const fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// The four header bytes `CLA INS P1 P2`.
    pub const fn header(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        let data_len = self.data.as_ref().map_or(0, Bytes::len);
        assert!(
            data_len <= MAX_DATA_LEN,
            "APDU data field exceeds {MAX_DATA_LEN} bytes"
        );

        let mut buf = BytesMut::with_capacity(4 + 1 + data_len + 1);
        buf.put_u8(self.cla);
        buf.put_u8(self.ins);
        buf.put_u8(self.p1);
        buf.put_u8(self.p2);
        if let Some(data) = &self.data {
            buf.put_u8(data.len() as u8);
            buf.put_slice(data);
        }
        if let Some(le) = self.le {
            buf.put_u8(le);
        }
        buf.freeze()
    }

    /// Parse a short command APDU from wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CommandError> {
        if bytes.len() < 4 {
            return Err(CommandError::Truncated);
        }

        let mut command = Self::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        match bytes.len() {
            // Case 1: header only
            4 => Ok(command),
            // Case 2: header + Le
            5 => Ok(command.with_le(bytes[4])),
            // Case 3/4: header + Lc + data (+ Le)
            n => {
                let lc = bytes[4] as usize;
                match n - 5 {
                    rest if rest == lc => {
                        command.data = Some(Bytes::copy_from_slice(&bytes[5..5 + lc]));
                        Ok(command)
                    }
                    rest if rest == lc + 1 => {
                        command.data = Some(Bytes::copy_from_slice(&bytes[5..5 + lc]));
                        Ok(command.with_le(bytes[n - 1]))
                    }
                    _ => Err(CommandError::InvalidLength),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_only() {
        let cmd = Command::new(0x00, 0xA4, 0x04, 0x00);
        assert_eq!(cmd.to_bytes().as_ref(), &[0x00, 0xA4, 0x04, 0x00]);
    }

    #[test]
    fn test_with_data_and_le() {
        let aid = hex::decode("A0000010000112").unwrap();
        let cmd = Command::new_with_data(0x00, 0xA4, 0x04, 0x00, aid).with_le(0x00);
        assert_eq!(
            cmd.to_bytes().as_ref(),
            hex::decode("00A4040007A000001000011200").unwrap()
        );
    }

    #[test]
    fn test_roundtrip() {
        let cmd = Command::new_with_data(0x80, 0x20, 0x00, 0x00, vec![1, 2, 3]);
        let parsed = Command::from_bytes(&cmd.to_bytes()).unwrap();
        assert_eq!(parsed, cmd);
        assert_eq!(parsed.header(), [0x80, 0x20, 0x00, 0x00]);
        assert_eq!(parsed.data().unwrap().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_case_2_parses_le() {
        let parsed = Command::from_bytes(&[0x80, 0xF2, 0x00, 0x00, 0x10]).unwrap();
        assert!(parsed.data().is_none());
        assert_eq!(parsed.to_bytes().as_ref(), &[0x80, 0xF2, 0x00, 0x00, 0x10]);
    }

    #[test]
    fn test_truncated_and_inconsistent() {
        assert_eq!(
            Command::from_bytes(&[0x00, 0xA4]),
            Err(CommandError::Truncated)
        );
        // Lc claims 4 bytes, only 2 present
        assert_eq!(
            Command::from_bytes(&[0x00, 0xA4, 0x04, 0x00, 0x04, 0xAA, 0xBB]),
            Err(CommandError::InvalidLength)
        );
    }
}
