//! Secure channel state machine and secure messaging pipeline
//!
//! The channel walks a linear sequence of states with no back-edges:
//!
//! ```text
//! Disconnected → Selected → CertificateObtained → ChannelOpen → Authenticated
//! ```
//!
//! Any failed step drops the session and returns to `Disconnected`; retry
//! means calling [`SecureChannel::connect`] again. Once authenticated, all
//! card traffic flows through one encrypt-MAC-send / verify-decrypt
//! pipeline that carries the rolling IV forward between exchanges.

use std::fmt;

use bytes::{Bytes, BytesMut};
use cipher::Iv;
use p256::SecretKey;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use tracing::{debug, trace, warn};

use tessera_apdu_core::{CardTransport, Command, Response};

use crate::commands::{
    GetCertificateCommand, MutuallyAuthenticateCommand, OpenSecureChannelCommand, SelectCommand,
};
use crate::constants::{
    CLA_WALLET, INS_GET_CARD_INFO, INS_MUTUALLY_AUTHENTICATE, INS_VERIFY_PIN, MUTUAL_AUTH_ENC_IV,
    WALLET_AID,
};
use crate::crypto::{self, ApduMeta, CardNonce, Challenge, WalletScp};
use crate::error::{Error, Result, Step};
use crate::session::{Keys, Session};

/// Lifecycle states of the secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No card interaction in progress.
    Disconnected,
    /// The wallet applet answered SELECT.
    Selected,
    /// The card certificate was retrieved and parsed.
    CertificateObtained,
    /// Ephemeral keys are exchanged; the card returned its salt.
    ChannelOpen,
    /// Mutual authentication completed; secured commands are available.
    Authenticated,
}

/// Secure channel to a wallet card over an APDU transport.
///
/// The randomness source is injected at construction so tests can run the
/// whole handshake deterministically; production code uses the OS CSPRNG.
pub struct SecureChannel<T, R = OsRng>
where
    T: CardTransport,
    R: CryptoRng + RngCore,
{
    transport: T,
    rng: R,
    state: ChannelState,
    session: Option<Session>,
}

impl<T: CardTransport> SecureChannel<T> {
    /// Create a channel over the given transport, using the operating
    /// system's randomness source.
    pub fn new(transport: T) -> Self {
        Self::with_rng(transport, OsRng)
    }
}

impl<T, R> fmt::Debug for SecureChannel<T, R>
where
    T: CardTransport,
    R: CryptoRng + RngCore,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel")
            .field("state", &self.state)
            .field("session_established", &self.session.is_some())
            .finish()
    }
}

impl<T, R> SecureChannel<T, R>
where
    T: CardTransport,
    R: CryptoRng + RngCore,
{
    /// Create a channel with an explicit randomness source.
    pub fn with_rng(transport: T, rng: R) -> Self {
        Self {
            transport,
            rng,
            state: ChannelState::Disconnected,
            session: None,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether mutual authentication has completed.
    pub fn is_authenticated(&self) -> bool {
        self.state == ChannelState::Authenticated
    }

    /// The established session, if any.
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Access the underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Optional reader firmware diagnostic, passed through from the
    /// transport.
    pub fn reader_firmware(&mut self) -> Option<String> {
        self.transport.firmware_info()
    }

    /// Connect to a present card and establish the secure channel.
    ///
    /// Fails with [`Error::AlreadyConnected`] while a session is live; the
    /// caller decides whether to [`disconnect`](Self::disconnect) and
    /// re-establish. Fails with [`Error::NoCardPresent`] when the transport
    /// reports an empty field.
    pub fn connect(&mut self) -> Result<()> {
        if self.state == ChannelState::Authenticated {
            return Err(Error::AlreadyConnected);
        }
        if !self.transport.is_target_present() {
            return Err(Error::NoCardPresent);
        }
        self.establish_secure_channel()
    }

    /// Run the full establishment sequence against an already-detected
    /// card.
    ///
    /// On any failure the channel returns to `Disconnected` with the
    /// session wiped; no partial key material survives.
    pub fn establish_secure_channel(&mut self) -> Result<()> {
        match self.run_handshake() {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "secure channel establishment failed");
                self.invalidate();
                Err(e)
            }
        }
    }

    /// Drop the session and return the reader to its detection-ready
    /// state. Idempotent.
    pub fn disconnect(&mut self) -> Result<()> {
        debug!("closing secure channel");
        self.invalidate();
        self.transport.reset_to_detection_ready()?;
        Ok(())
    }

    /// Verify the card PIN over the secure channel.
    pub fn verify_pin(&mut self, pin: &str) -> Result<()> {
        debug!("verifying PIN");
        self.transmit_secure(INS_VERIFY_PIN, 0x00, 0x00, Bytes::copy_from_slice(pin.as_bytes()))
            .map(|_| ())
    }

    /// Query card information over the secure channel.
    pub fn get_card_info(&mut self) -> Result<Bytes> {
        debug!("requesting card info");
        self.transmit_secure(INS_GET_CARD_INFO, 0x00, 0x00, Bytes::new())
    }

    /// Execute one secured exchange: encrypt and MAC the payload, send it,
    /// check the status word, then verify and decrypt the answer.
    ///
    /// A MAC mismatch on the response is fatal to the session: the channel
    /// is invalidated before the error is returned.
    pub fn transmit_secure(&mut self, ins: u8, p1: u8, p2: u8, plaintext: Bytes) -> Result<Bytes> {
        if self.state != ChannelState::Authenticated {
            return Err(Error::SecureChannelNotEstablished);
        }

        let command = self.protect_command(ins, p1, p2, plaintext)?;
        let response_bytes = self.transport.exchange(&command.to_bytes())?;
        let response = Response::from_bytes(&response_bytes)?;

        if !response.is_success() {
            return Err(Error::UnexpectedStatus {
                step: Step::SecureCommand,
                sw: response.status(),
            });
        }

        match self.process_response(&response) {
            Ok(payload) => Ok(payload),
            Err(e) => {
                if matches!(e, Error::MacMismatch) {
                    warn!("response MAC mismatch, tearing down session");
                    self.invalidate();
                }
                Err(e)
            }
        }
    }

    fn invalidate(&mut self) {
        // Session keys and IV zeroize on drop
        self.session = None;
        self.state = ChannelState::Disconnected;
    }

    fn transmit(&mut self, command: &Command) -> Result<Response> {
        let response_bytes = self.transport.exchange(&command.to_bytes())?;
        Ok(Response::from_bytes(&response_bytes)?)
    }

    fn run_handshake(&mut self) -> Result<()> {
        debug!("selecting wallet applet");
        let select = SelectCommand::with_aid(WALLET_AID);
        let response = self.transmit(&select.to_command())?;
        SelectCommand::parse_response(&response)?;
        self.state = ChannelState::Selected;

        debug!("retrieving card certificate");
        let mut nonce = CardNonce::default();
        self.rng.fill_bytes(&mut nonce);
        let get_certificate = GetCertificateCommand::with_nonce(&nonce);
        let response = self.transmit(&get_certificate.to_command())?;
        let certificate = GetCertificateCommand::parse_response(&response)?;
        self.state = ChannelState::CertificateObtained;
        trace!(nonce_echo = %hex::encode(certificate.nonce()), "certificate received");

        let card_key = certificate.public_key()?;

        debug!("opening secure channel");
        let host_secret = SecretKey::random(&mut self.rng);
        let open = OpenSecureChannelCommand::with_public_key(&host_secret.public_key());
        let response = self.transmit(&open.to_command())?;
        let salt = OpenSecureChannelCommand::parse_response(&response)?;
        self.state = ChannelState::ChannelOpen;

        debug!("running mutual authentication");
        let shared_secret = crypto::generate_ecdh_shared_secret(&host_secret, &card_key);
        if crypto::shared_secret_is_degenerate(&shared_secret) {
            return Err(Error::KeyAgreementFailed);
        }
        let (enc_key, mac_key) = crypto::derive_session_keys(&shared_secret, &salt);
        let keys = Keys::new(enc_key, mac_key);
        drop(shared_secret);
        drop(host_secret);

        let mut challenge = Challenge::default();
        self.rng.fill_bytes(&mut challenge);

        let mut plaintext = BytesMut::from(challenge.as_slice());
        let auth_iv = Iv::<WalletScp>::from(MUTUAL_AUTH_ENC_IV);
        let ciphertext = crypto::encrypt_data(&mut plaintext, keys.enc(), &auth_iv);

        let mut meta = ApduMeta::default();
        meta[0] = CLA_WALLET;
        meta[1] = INS_MUTUALLY_AUTHENTICATE;
        meta[4] = (ciphertext.len() + 16) as u8;
        let mac = crypto::calculate_mac(&meta, &ciphertext, keys.mac());

        let authenticate = MutuallyAuthenticateCommand::new(&mac, &ciphertext);
        let response = self.transmit(&authenticate.to_command())?;
        let session_iv = MutuallyAuthenticateCommand::parse_response(&response)?;

        // The session becomes visible only here, fully populated
        self.session = Some(Session::new(keys, session_iv));
        self.state = ChannelState::Authenticated;
        debug!("secure channel established");
        Ok(())
    }

    /// Encrypt and MAC one command payload. The command MAC becomes the
    /// session IV for the response leg.
    fn protect_command(&mut self, ins: u8, p1: u8, p2: u8, payload: Bytes) -> Result<Command> {
        let session = self
            .session
            .as_mut()
            .ok_or(Error::SecureChannelNotEstablished)?;

        let mut data_to_encrypt = BytesMut::from(payload.as_ref());
        let encrypted = crypto::encrypt_data(&mut data_to_encrypt, session.keys().enc(), session.iv());

        let mut meta = ApduMeta::default();
        meta[0] = CLA_WALLET;
        meta[1] = ins;
        meta[2] = p1;
        meta[3] = p2;
        meta[4] = (encrypted.len() + 16) as u8;

        session.update_iv(&meta, &encrypted);

        let mut data = BytesMut::with_capacity(16 + encrypted.len());
        data.extend_from_slice(session.iv());
        data.extend_from_slice(&encrypted);
        trace!(len = encrypted.len(), "command protected");

        Ok(Command::new_with_data(CLA_WALLET, ins, p1, p2, data.freeze()))
    }

    /// Verify and decrypt one secured response, advancing the rolling IV
    /// to the response MAC.
    fn process_response(&mut self, response: &Response) -> Result<Bytes> {
        let session = self
            .session
            .as_mut()
            .ok_or(Error::SecureChannelNotEstablished)?;

        let payload = response.payload().map(Bytes::as_ref).unwrap_or_default();
        if payload.len() < 32 || payload.len() % 16 != 0 {
            return Err(Error::ResponseLengthMismatch {
                step: Step::SecureCommand,
                expected: 32,
                actual: payload.len(),
            });
        }

        let (received_mac, ciphertext) = payload.split_at(16);

        let mut meta = ApduMeta::default();
        meta[0] = ciphertext.len() as u8;
        let expected_mac = crypto::calculate_mac(&meta, ciphertext, session.keys().mac());

        if !bool::from(received_mac.ct_eq(expected_mac.as_slice())) {
            return Err(Error::MacMismatch);
        }

        // Decrypt with the outbound command MAC as IV, then roll the IV
        // forward to the response MAC
        let mut data_to_decrypt = BytesMut::from(ciphertext);
        let decrypted =
            crypto::decrypt_data(&mut data_to_decrypt, session.keys().enc(), session.iv())?;
        session.replace_iv(expected_mac);

        trace!(len = decrypted.len(), "secured response decrypted");
        Ok(decrypted)
    }
}
