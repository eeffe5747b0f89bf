//! Cryptographic primitives for the wallet secure channel
//!
//! Pure functions only: ECDH on P-256, the SHA-512 session key derivation,
//! AES-256-CBC payload encryption with ISO/IEC 9797-1 method-2 bit padding,
//! and the CBC-MAC used both for integrity and as the rolling IV source.

use aes::cipher::{
    BlockDecryptMut, BlockEncryptMut, Iv, IvSizeUser, Key, KeyIvInit, KeySizeUser,
    block_padding::{Iso7816, NoPadding},
    typenum::{U8, U16, U32},
};
use bytes::{Bytes, BytesMut};
use cipher::block_padding::UnpadError;
use generic_array::GenericArray;
use p256::{PublicKey, SecretKey, ecdh::SharedSecret};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::constants::SESSION_KEY_LABEL;

/// 32-byte host challenge sent during MUTUAL AUTHENTICATE.
pub type Challenge = GenericArray<u8, U32>;
/// 32-byte salt returned by OPEN SECURE CHANNEL.
pub type Salt = GenericArray<u8, U32>;
/// 8-byte random nonce sent with GET CERTIFICATE.
pub type CardNonce = GenericArray<u8, U8>;
/// One cipher block of APDU metadata covered by the command MAC.
pub(crate) type ApduMeta = GenericArray<u8, U16>;

type Encryptor = cbc::Encryptor<aes::Aes256>;
type Decryptor = cbc::Decryptor<aes::Aes256>;

/// Marker for the wallet secure channel cipher parameters: AES-256 keys,
/// 16-byte IVs.
#[derive(Debug)]
pub struct WalletScp;

impl KeySizeUser for WalletScp {
    type KeySize = U32;
}

impl IvSizeUser for WalletScp {
    type IvSize = U16;
}

/// Compute the ECDH shared secret between our ephemeral private key and the
/// card's ephemeral public key.
pub(crate) fn generate_ecdh_shared_secret(
    private: &SecretKey,
    public: &PublicKey,
) -> SharedSecret {
    p256::elliptic_curve::ecdh::diffie_hellman(private.to_nonzero_scalar(), public.as_affine())
}

/// Whether key agreement collapsed to a degenerate (all-zero) secret.
///
/// Constant-time; a degenerate result must never be fed into the KDF.
pub(crate) fn shared_secret_is_degenerate(secret: &SharedSecret) -> bool {
    secret
        .raw_secret_bytes()
        .as_slice()
        .ct_eq(&[0u8; 32])
        .into()
}

/// Derive the session keys from the ECDH shared secret and the card salt.
///
/// Keys are derived as `(K(enc) | K(mac)) = SHA-512(secret | label | salt)`
/// with the fixed protocol label in between. The intermediate digest is
/// wiped before returning; the shared secret wipes itself on drop.
pub(crate) fn derive_session_keys(
    secret: &SharedSecret,
    salt: &Salt,
) -> (Key<WalletScp>, Key<WalletScp>) {
    let mut hasher = Sha512::new();
    hasher.update(secret.raw_secret_bytes());
    hasher.update(SESSION_KEY_LABEL);
    hasher.update(salt);

    let mut digest = [0u8; 64];
    hasher.finalize_into(GenericArray::from_mut_slice(&mut digest));

    let enc_key = Key::<WalletScp>::clone_from_slice(&digest[0..32]);
    let mac_key = Key::<WalletScp>::clone_from_slice(&digest[32..64]);
    digest.zeroize();

    (enc_key, mac_key)
}

/// Encrypt data with the provided key and IV, bit-padding it to the block
/// boundary (`0x80` then zeros).
pub(crate) fn encrypt_data(
    data: &mut BytesMut,
    enc_key: &Key<WalletScp>,
    iv: &Iv<WalletScp>,
) -> Bytes {
    let msg_len = reserve_padding(data);
    // SAFETY: the buffer was extended to the next block boundary, so
    // padded encryption cannot fail.
    let encrypted = Encryptor::new(enc_key, iv)
        .encrypt_padded_mut::<Iso7816>(data, msg_len)
        .unwrap();
    Bytes::copy_from_slice(encrypted)
}

/// Decrypt data with the provided key and IV and strip the bit padding.
pub(crate) fn decrypt_data(
    data: &mut BytesMut,
    enc_key: &Key<WalletScp>,
    iv: &Iv<WalletScp>,
) -> Result<Bytes, UnpadError> {
    let decrypted = Decryptor::new(enc_key, iv).decrypt_padded_mut::<Iso7816>(data)?;

    Ok(BytesMut::from(decrypted).into())
}

/// CBC-MAC over one metadata block followed by ciphertext.
///
/// The MAC is the final block of an AES-256-CBC pass with a zero IV and no
/// padding; both inputs are already block-aligned.
pub(crate) fn calculate_mac(
    meta: &ApduMeta,
    data: &[u8],
    mac_key: &Key<WalletScp>,
) -> Iv<WalletScp> {
    let iv = Iv::<WalletScp>::default();

    let mut buf = BytesMut::with_capacity(meta.len() + data.len());
    buf.extend_from_slice(meta);
    buf.extend_from_slice(data);
    debug_assert_eq!(buf.len() % 16, 0, "MAC input must be block-aligned");

    let msg_len = buf.len();
    // SAFETY: the input is block-aligned, so unpadded encryption cannot
    // fail.
    let ciphertext = Encryptor::new(mac_key, &iv)
        .encrypt_padded_mut::<NoPadding>(&mut buf, msg_len)
        .unwrap();

    *Iv::<WalletScp>::from_slice(&ciphertext[ciphertext.len() - 16..])
}

// Extend the buffer to the next block boundary so in-place padding has room,
// returning the original message length.
fn reserve_padding(data: &mut BytesMut) -> usize {
    let len = data.len();
    data.resize(len + 16 - len % 16, 0);

    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn test_ecdh_shared_secret_symmetry() {
        let pk1 = SecretKey::random(&mut thread_rng());
        let pk2 = SecretKey::random(&mut thread_rng());

        let pub1 = pk1.public_key();
        let pub2 = pk2.public_key();

        let shared_secret1 = generate_ecdh_shared_secret(&pk1, &pub2);
        let shared_secret2 = generate_ecdh_shared_secret(&pk2, &pub1);

        assert_eq!(
            shared_secret1.raw_secret_bytes(),
            shared_secret2.raw_secret_bytes()
        );
        assert!(!shared_secret_is_degenerate(&shared_secret1));
    }

    #[test]
    fn test_derive_session_keys() {
        let secret = hex::decode("B410E816DA313545151807E25A830201FA389913A977066AB0C6DE0E8631E400")
            .unwrap();
        let salt = hex::decode("1D7C033E75E10EC578AB538F69F1B02538571BA3831441F1649E3F24B5B3E3E7")
            .unwrap();

        let mut hasher = Sha512::new();
        hasher.update(&secret);
        hasher.update(SESSION_KEY_LABEL);
        hasher.update(&salt);
        let digest = hasher.finalize();

        let expected_enc =
            hex::decode("BE90FC02FA851ACACF937731DA657049965754C4488506586B0E1E7F53C45593")
                .unwrap();
        let expected_mac =
            hex::decode("DB4E4C8C5FD1AE1E0B186695D839A4CB54B75D8DBDB3A9B0C8C1C275452B57D6")
                .unwrap();

        assert_eq!(expected_enc, digest[..32].to_vec());
        assert_eq!(expected_mac, digest[32..].to_vec());
    }

    #[test]
    fn test_derive_session_keys_deterministic_and_salt_sensitive() {
        let host = SecretKey::random(&mut thread_rng());
        let card = SecretKey::random(&mut thread_rng());
        let secret = generate_ecdh_shared_secret(&host, &card.public_key());

        let salt_a = Salt::clone_from_slice(&[0x11; 32]);
        let mut salt_b = salt_a;
        salt_b[31] ^= 0x01;

        let (enc_a1, mac_a1) = derive_session_keys(&secret, &salt_a);
        let (enc_a2, mac_a2) = derive_session_keys(&secret, &salt_a);
        let (enc_b, mac_b) = derive_session_keys(&secret, &salt_b);

        assert_eq!(enc_a1, enc_a2);
        assert_eq!(mac_a1, mac_a2);
        assert_ne!(enc_a1, enc_b);
        assert_ne!(mac_a1, mac_b);
        assert_ne!(enc_a1, mac_a1);
    }

    #[test]
    fn test_encrypt_data() {
        let data = hex::decode("A8A686D0E3290459BCB36088A8FD04A76BF13283BE4B1EAE2E1248EF609F94DC")
            .unwrap();
        let enc_key =
            hex::decode("44D689AB4B18206F7EEE5439FB9A71A8A617406BA5259728D1EBC2786D24896C")
                .unwrap();
        let iv = hex::decode("9D3EF41EF1D221DD98A54AD5470F58F2").unwrap();

        let encrypted = encrypt_data(
            &mut BytesMut::from(data.as_slice()),
            Key::<WalletScp>::from_slice(&enc_key),
            Iv::<WalletScp>::from_slice(&iv),
        );

        let expected = hex::decode(
            "FFB41FED5F71A2B57A6AE62D5D5ECD1C12616F6464637DD0A7A930920ACBA55867A7E12CC4F06B089AF34FF4ED4BAB08"
        ).unwrap();
        assert_eq!(expected, encrypted.to_vec());
    }

    #[test]
    fn test_decrypt_data() {
        let enc_data = hex::decode(
            "73B58B66372E3446E14A9F54BA59666DC1ADB5C3B88970425AE29CB4B3AA18C6",
        )
        .unwrap();
        let enc_key =
            hex::decode("D93D8E6164196D5C5B5F84F10E4B90D98F8D282ED145513ED666AA55C9871E79")
                .unwrap();
        let iv = hex::decode("F959B1220333046D3C47D61B1E1B891B").unwrap();

        let mut enc_data = BytesMut::from(enc_data.as_slice());
        let data = decrypt_data(
            &mut enc_data,
            Key::<WalletScp>::from_slice(&enc_key),
            Iv::<WalletScp>::from_slice(&iv),
        )
        .unwrap();

        // 28-byte plaintext: the final block carried four bytes of padding
        let expected =
            hex::decode("2E21F9F2B2C2CC9038D518A5C6B490613E7955BD19D19108B7778698").unwrap();
        assert_eq!(expected, data.to_vec());
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_all_short_lengths() {
        let key = Key::<WalletScp>::clone_from_slice(&[0x42; 32]);
        let iv = Iv::<WalletScp>::clone_from_slice(&[0x24; 16]);

        for len in 0..48usize {
            let plaintext: Vec<u8> = (0..len).map(|i| i as u8).collect();

            let mut buf = BytesMut::from(plaintext.as_slice());
            let encrypted = encrypt_data(&mut buf, &key, &iv);
            assert_eq!(encrypted.len() % 16, 0);
            assert!(encrypted.len() > len, "padding always adds bytes");

            let mut enc_buf = BytesMut::from(encrypted.as_ref());
            let decrypted = decrypt_data(&mut enc_buf, &key, &iv).unwrap();
            assert_eq!(plaintext, decrypted.to_vec(), "length {len}");
        }
    }

    #[test]
    fn test_calculate_mac() {
        let mac_key =
            hex::decode("2FB70219E6635EE0958AB3F7A428BA87E8CD6E6F873A5725A55F25B102D0F1F7")
                .unwrap();
        let ciphertext = hex::decode(
            "FFB41FED5F71A2B57A6AE62D5D5ECD1C12616F6464637DD0A7A930920ACBA55867A7E12CC4F06B089AF34FF4ED4BAB08"
        ).unwrap();

        let mut meta = ApduMeta::default();
        meta[0] = 0x80;
        meta[1] = 0x20;
        meta[4] = 0x30;

        let mac = calculate_mac(&meta, &ciphertext, Key::<WalletScp>::from_slice(&mac_key));

        let expected = hex::decode("F87AAD2529FD35E857E0074F2CEC707F").unwrap();
        assert_eq!(expected, mac.to_vec());
    }

    #[test]
    fn test_calculate_mac_changes_with_meta() {
        let mac_key = Key::<WalletScp>::clone_from_slice(&[0x07; 32]);
        let data = [0xAB; 32];

        let mut meta = ApduMeta::default();
        meta[0] = 0x80;
        let mac1 = calculate_mac(&meta, &data, &mac_key);
        meta[0] = 0x81;
        let mac2 = calculate_mac(&meta, &data, &mac_key);

        assert_ne!(mac1, mac2);
    }
}
