//! Card certificate parsing
//!
//! The card answers GET CERTIFICATE with a fixed-layout buffer:
//!
//! | offset | length | field                                   |
//! |--------|--------|-----------------------------------------|
//! | 0      | 1      | format tag                              |
//! | 1      | 8      | nonce echo                              |
//! | 9      | 65     | uncompressed EC point (`04` ‖ X ‖ Y)    |
//! | 74     | var    | signature over the preceding fields     |
//!
//! The signature is carried opaquely; this client has no root of trust to
//! verify it against.

use bytes::Bytes;
use p256::PublicKey;

use crate::error::Error;

const NONCE_OFFSET: usize = 1;
const NONCE_LEN: usize = 8;
const POINT_OFFSET: usize = NONCE_OFFSET + NONCE_LEN;
const POINT_LEN: usize = 65;
const SIGNATURE_OFFSET: usize = POINT_OFFSET + POINT_LEN;

const UNCOMPRESSED_POINT_TAG: u8 = 0x04;

/// Immutable view over the certificate bytes returned by the card.
#[derive(Debug, Clone)]
pub struct CardCertificate {
    raw: Bytes,
}

impl CardCertificate {
    /// Wrap a raw certificate buffer, validating only the fixed-layout
    /// length. Field-level checks happen in the accessors.
    pub fn from_bytes(raw: Bytes) -> Result<Self, Error> {
        if raw.len() < SIGNATURE_OFFSET {
            return Err(Error::InvalidCertificate(
                "shorter than the fixed-layout fields",
            ));
        }
        Ok(Self { raw })
    }

    /// Format tag byte.
    pub fn format_tag(&self) -> u8 {
        self.raw[0]
    }

    /// The eight nonce bytes echoed back from the GET CERTIFICATE challenge.
    pub fn nonce(&self) -> &[u8] {
        &self.raw[NONCE_OFFSET..NONCE_OFFSET + NONCE_LEN]
    }

    /// The 64 coordinate bytes (X ‖ Y) of the card's ephemeral public key.
    ///
    /// Fails closed when the point is not marked as uncompressed; a card
    /// sending anything but `04` here is out of contract.
    pub fn public_key_point(&self) -> Result<&[u8], Error> {
        if self.raw[POINT_OFFSET] != UNCOMPRESSED_POINT_TAG {
            return Err(Error::InvalidCertificate(
                "ephemeral key is not an uncompressed EC point",
            ));
        }
        Ok(&self.raw[POINT_OFFSET + 1..SIGNATURE_OFFSET])
    }

    /// The card's ephemeral public key, for ECDH.
    pub fn public_key(&self) -> Result<PublicKey, Error> {
        // Run the marker check first so a malformed point reports as a
        // certificate problem rather than a generic curve error.
        self.public_key_point()?;
        let point = &self.raw[POINT_OFFSET..SIGNATURE_OFFSET];
        Ok(PublicKey::from_sec1_bytes(point)?)
    }

    /// Signature bytes trailing the fixed-layout fields. Not verified.
    pub fn signature(&self) -> &[u8] {
        &self.raw[SIGNATURE_OFFSET..]
    }

    /// The whole certificate as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}
