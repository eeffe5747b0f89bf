//! Session state for the wallet secure channel
//!
//! A [`Session`] holds the derived AES-256 keys and the rolling IV. The
//! three fields are only ever populated together, at the end of a
//! successful mutual authentication, and every byte is wiped when the
//! session is dropped or explicitly cleared.

use std::fmt;

use cipher::{Iv, Key};
use zeroize::Zeroize;

use crate::crypto::{ApduMeta, WalletScp, calculate_mac};

/// Derived secure channel keys.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Keys {
    /// Encryption key
    enc: [u8; 32],
    /// MAC key
    mac: [u8; 32],
}

impl Keys {
    /// Create a new key set from the two derived keys.
    pub(crate) fn new(enc_key: Key<WalletScp>, mac_key: Key<WalletScp>) -> Self {
        let mut enc = [0u8; 32];
        let mut mac = [0u8; 32];
        enc.copy_from_slice(&enc_key);
        mac.copy_from_slice(&mac_key);
        Self { enc, mac }
    }

    /// Get the encryption key
    pub(crate) fn enc(&self) -> &Key<WalletScp> {
        Key::<WalletScp>::from_slice(&self.enc)
    }

    /// Get the MAC key
    pub(crate) fn mac(&self) -> &Key<WalletScp> {
        Key::<WalletScp>::from_slice(&self.mac)
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material never reaches logs
        f.write_str("Keys(..)")
    }
}

/// Cryptographic state of an established secure channel.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Session {
    keys: Keys,
    iv: [u8; 16],
}

impl Session {
    /// Assemble a session from freshly derived keys and the IV returned by
    /// MUTUAL AUTHENTICATE.
    pub(crate) fn new(keys: Keys, iv: Iv<WalletScp>) -> Self {
        let mut session = Self { keys, iv: [0u8; 16] };
        session.iv.copy_from_slice(&iv);
        session
    }

    /// Assemble a session from raw key and IV bytes.
    pub fn from_raw(
        enc_key: &Key<WalletScp>,
        mac_key: &Key<WalletScp>,
        iv: &Iv<WalletScp>,
    ) -> Self {
        Self::new(Keys::new(*enc_key, *mac_key), *iv)
    }

    /// The session keys.
    pub(crate) const fn keys(&self) -> &Keys {
        &self.keys
    }

    /// The current rolling IV.
    pub fn iv(&self) -> &Iv<WalletScp> {
        Iv::<WalletScp>::from_slice(&self.iv)
    }

    /// Advance the rolling IV to the MAC of an outbound command.
    pub(crate) fn update_iv(&mut self, meta: &ApduMeta, data: &[u8]) {
        let mac = calculate_mac(meta, data, self.keys.mac());
        self.iv.copy_from_slice(&mac);
    }

    /// Replace the rolling IV with the MAC carried by a verified response.
    pub(crate) fn replace_iv(&mut self, iv: Iv<WalletScp>) {
        self.iv.copy_from_slice(&iv);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("keys", &self.keys).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_iv_tracks_command_mac() {
        let enc = Key::<WalletScp>::clone_from_slice(&[0x01; 32]);
        let mac = Key::<WalletScp>::clone_from_slice(&[0x02; 32]);
        let iv = Iv::<WalletScp>::clone_from_slice(&[0x03; 16]);
        let mut session = Session::from_raw(&enc, &mac, &iv);

        let meta = ApduMeta::default();
        let data = [0x55u8; 16];
        session.update_iv(&meta, &data);

        let expected = calculate_mac(&meta, &data, session.keys().mac());
        assert_eq!(session.iv(), &expected);
    }

    #[test]
    fn test_zeroize_clears_all_fields() {
        let enc = Key::<WalletScp>::clone_from_slice(&[0xAA; 32]);
        let mac = Key::<WalletScp>::clone_from_slice(&[0xBB; 32]);
        let iv = Iv::<WalletScp>::clone_from_slice(&[0xCC; 16]);
        let mut session = Session::from_raw(&enc, &mac, &iv);

        session.zeroize();

        assert_eq!(session.iv().as_slice(), &[0u8; 16]);
        assert_eq!(session.keys().enc().as_slice(), &[0u8; 32]);
        assert_eq!(session.keys().mac().as_slice(), &[0u8; 32]);
    }
}
