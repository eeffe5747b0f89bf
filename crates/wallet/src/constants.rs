//! Protocol constants for the wallet applet

/// Application identifier of the wallet applet.
pub const WALLET_AID: &[u8] = b"\xA0\x00\x00\x10\x00\x01\x12";

/// Fixed ASCII label mixed into the session key derivation, 33 bytes, no
/// terminator.
pub(crate) const SESSION_KEY_LABEL: &[u8; 33] = b"Tessera Wallet Secure Channel v1.";

/// IV used to encrypt the host challenge during MUTUAL AUTHENTICATE. All
/// later exchanges use the rolling session IV instead.
pub(crate) const MUTUAL_AUTH_ENC_IV: [u8; 16] = [0xFF; 16];

/// ISO interindustry class byte.
pub(crate) const CLA_ISO: u8 = 0x00;
/// Proprietary class byte used by all wallet applet commands.
pub(crate) const CLA_WALLET: u8 = 0x80;

pub(crate) const INS_SELECT: u8 = 0xA4;
pub(crate) const INS_GET_CERTIFICATE: u8 = 0xF8;
pub(crate) const INS_OPEN_SECURE_CHANNEL: u8 = 0x10;
pub(crate) const INS_MUTUALLY_AUTHENTICATE: u8 = 0x11;
pub(crate) const INS_VERIFY_PIN: u8 = 0x20;
pub(crate) const INS_GET_CARD_INFO: u8 = 0xFA;

/// Exact data length of a MUTUAL AUTHENTICATE response.
pub(crate) const MUTUAL_AUTH_RESPONSE_LEN: usize = 64;
