//! Card transport contract
//!
//! A transport exchanges one command buffer for one response buffer against
//! a single present card. It has no encryption semantics; secure messaging
//! is layered above it.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use tracing::trace;

/// Errors surfaced by a transport backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The reader device could not be reached or initialized.
    #[error("device error: {0}")]
    Device(String),

    /// The exchange could not complete.
    #[error("transmission failed: {0}")]
    Transmission(String),

    /// The exchange did not complete in time.
    #[error("transmission timed out")]
    Timeout,
}

/// Half-duplex request/response transport against a single card.
///
/// Implementations block the calling thread for the duration of each
/// exchange; timeout handling, if any, lives entirely behind this trait.
pub trait CardTransport: fmt::Debug {
    /// Initialize the underlying reader hardware or service.
    fn begin(&mut self) -> Result<(), TransportError>;

    /// Whether a card is currently present in the field.
    fn is_target_present(&mut self) -> bool;

    /// Exchange one command APDU for one response APDU.
    ///
    /// The returned buffer includes the two-byte status trailer.
    fn exchange(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Force the reader back into a state where a new card can be detected.
    fn reset_to_detection_ready(&mut self) -> Result<(), TransportError>;

    /// Optional diagnostic string describing the reader firmware.
    ///
    /// Not required for protocol correctness.
    fn firmware_info(&mut self) -> Option<String> {
        None
    }
}

/// Scripted transport for tests: plays back queued responses and records
/// every transmitted command.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: VecDeque<Bytes>,
    commands: Vec<Bytes>,
    target_present: bool,
    reset_count: usize,
}

impl MockTransport {
    /// Create an empty mock with a card present.
    pub fn new() -> Self {
        Self {
            target_present: true,
            ..Self::default()
        }
    }

    /// Create a mock that will answer with a single response.
    pub fn with_response(response: Bytes) -> Self {
        Self::with_responses([response])
    }

    /// Create a mock that will answer with the given responses, in order.
    pub fn with_responses(responses: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            target_present: true,
            ..Self::default()
        }
    }

    /// Queue another response.
    pub fn push_response(&mut self, response: Bytes) {
        self.responses.push_back(response);
    }

    /// Control the card-presence flag.
    pub fn set_target_present(&mut self, present: bool) {
        self.target_present = present;
    }

    /// Commands transmitted so far, in order.
    pub fn commands(&self) -> &[Bytes] {
        &self.commands
    }

    /// How many times the reader was reset to detection-ready.
    pub const fn reset_count(&self) -> usize {
        self.reset_count
    }
}

impl CardTransport for MockTransport {
    fn begin(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_target_present(&mut self) -> bool {
        self.target_present
    }

    fn exchange(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "mock exchange");
        self.commands.push(Bytes::copy_from_slice(command));
        self.responses
            .pop_front()
            .ok_or_else(|| TransportError::Transmission("no scripted response left".into()))
    }

    fn reset_to_detection_ready(&mut self) -> Result<(), TransportError> {
        self.reset_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_plays_back_in_order() {
        let mut mock = MockTransport::with_responses([
            Bytes::from_static(&[0x90, 0x00]),
            Bytes::from_static(&[0x6A, 0x82]),
        ]);

        assert!(mock.is_target_present());
        assert_eq!(
            mock.exchange(&[0x00, 0xA4, 0x04, 0x00]).unwrap().as_ref(),
            &[0x90, 0x00]
        );
        assert_eq!(mock.exchange(&[0x80, 0xF2]).unwrap().as_ref(), &[0x6A, 0x82]);
        assert!(mock.exchange(&[0x00]).is_err());
        assert_eq!(mock.commands().len(), 3);
    }

    #[test]
    fn test_mock_reset_counting() {
        let mut mock = MockTransport::new();
        mock.reset_to_detection_ready().unwrap();
        mock.reset_to_detection_ready().unwrap();
        assert_eq!(mock.reset_count(), 2);
    }
}
