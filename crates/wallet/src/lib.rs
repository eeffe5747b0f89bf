//! Secure channel client for the Tessera contact-less wallet card
//!
//! The card exposes its functions behind an authenticated, encrypted
//! command channel layered over plain ISO 7816-4 APDUs: an ECDH handshake
//! on P-256 derives AES-256 session keys, and every subsequent command is
//! encrypted and MAC'd with a rolling IV chaining the exchanges together.
//!
//! The entry point is [`SecureChannel`], generic over any
//! [`CardTransport`](tessera_apdu_core::CardTransport) backend:
//!
//! ```no_run
//! use tessera_apdu_core::MockTransport;
//! use tessera_wallet::SecureChannel;
//!
//! # fn main() -> tessera_wallet::Result<()> {
//! let mut channel = SecureChannel::new(MockTransport::new());
//! channel.connect()?;
//! channel.verify_pin("123456")?;
//! let info = channel.get_card_info()?;
//! println!("card info: {}", hex::encode(info));
//! channel.disconnect()?;
//! # Ok(())
//! # }
//! ```

mod certificate;
mod commands;
mod constants;
mod crypto;
mod error;
mod secure_channel;
mod session;

pub use certificate::CardCertificate;
pub use commands::{
    GetCertificateCommand, MutuallyAuthenticateCommand, OpenSecureChannelCommand, SelectCommand,
};
pub use constants::WALLET_AID;
pub use crypto::{CardNonce, Challenge, Salt, WalletScp};
pub use error::{Error, Result, Step};
pub use secure_channel::{ChannelState, SecureChannel};
pub use session::{Keys, Session};
