//! Key exchange and session keying.
//!
//! Every connection performs an X25519 exchange alongside SRP. The two
//! secrets are bound together with HKDF-SHA256 into one independent 256-bit
//! key per traffic direction. In anonymous mode the SRP contribution is
//! empty and the KDF salt is a fixed context constant instead of the user's
//! SRP salt.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519Public, SharedSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::ProtocolViolation;

/// Length of an X25519 private key seed in bytes.
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// Length of an X25519 public key in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of one derived traffic key in bytes.
pub const SESSION_KEY_LENGTH: usize = 32;

/// Domain label bound into the session KDF.
const KDF_INFO_LABEL: &[u8] = b"aspia-session-v1";

/// KDF salt for the anonymous path, which has no SRP salt to use.
const ANONYMOUS_KDF_SALT: &[u8; 32] = b"aspia-anonymous-session-salt-v1!";

/// An X25519 key pair: ephemeral per connection, or the server's long-term
/// identity when loaded from a seed.
pub struct KeyPair {
    secret: StaticSecret,
    public: X25519Public,
}

impl KeyPair {
    /// Fresh random pair for one connection.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    /// Deterministic pair from a stored 32-byte seed; the server's identity
    /// key for anonymous access.
    pub fn from_seed(seed: [u8; PRIVATE_KEY_LENGTH]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    /// The public half, as sent in the hello messages.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.public.to_bytes()
    }

    /// Runs the exchange against a peer public key from the wire.
    ///
    /// Rejects values of the wrong width and exchanges that land on the
    /// identity point, so a peer cannot force a known shared secret.
    pub(crate) fn shared_secret(&self, peer: &[u8]) -> Result<SharedSecret, ProtocolViolation> {
        let peer: [u8; PUBLIC_KEY_LENGTH] = peer
            .try_into()
            .map_err(|_| ProtocolViolation::Malformed("ecdh public key"))?;

        let shared = self.secret.diffie_hellman(&X25519Public::from(peer));
        if !shared.was_contributory() {
            return Err(ProtocolViolation::WeakKeyExchange);
        }

        Ok(shared)
    }
}

/// The SRP session key `K`; an intermediate secret, never used directly as a
/// traffic key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct SrpKey([u8; 32]);

impl SrpKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// One derived 256-bit traffic key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LENGTH]);

impl SessionKey {
    pub(crate) fn from_bytes(bytes: [u8; SESSION_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// The raw key material. Never log or persist this.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LENGTH] {
        &self.0
    }
}

/// The two directional keys a completed key exchange yields.
pub struct SessionKeyPair {
    /// Seals client-to-server frames.
    pub client_to_server: SessionKey,
    /// Seals server-to-client frames.
    pub server_to_client: SessionKey,
}

/// Binds the SRP session key and the X25519 shared secret into the two
/// directional traffic keys.
///
/// `srp_key` is `None` on the anonymous path; `kdf_salt` is the user's SRP
/// salt, or ignored in favor of the fixed anonymous salt when there is no
/// SRP contribution. The info string carries the domain label and a 4-byte
/// session-type word, zero while negotiation is still in flight.
pub(crate) fn derive_session_keys(
    srp_key: Option<&SrpKey>,
    ecdh_shared: &SharedSecret,
    kdf_salt: &[u8],
) -> SessionKeyPair {
    let salt = match srp_key {
        Some(_) => kdf_salt,
        None => ANONYMOUS_KDF_SALT.as_slice(),
    };

    let mut ikm = Zeroizing::new(Vec::with_capacity(64));
    if let Some(key) = srp_key {
        ikm.extend_from_slice(key.as_bytes());
    }
    ikm.extend_from_slice(ecdh_shared.as_bytes());

    let mut info = Vec::with_capacity(KDF_INFO_LABEL.len() + 4);
    info.extend_from_slice(KDF_INFO_LABEL);
    info.extend_from_slice(&0_u32.to_le_bytes());

    let kdf = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut okm = Zeroizing::new([0_u8; SESSION_KEY_LENGTH * 2]);
    kdf.expand(&info, okm.as_mut())
        .expect("64 bytes is a valid hkdf-sha256 output length");

    let mut client_to_server = [0_u8; SESSION_KEY_LENGTH];
    let mut server_to_client = [0_u8; SESSION_KEY_LENGTH];
    client_to_server.copy_from_slice(&okm[..SESSION_KEY_LENGTH]);
    server_to_client.copy_from_slice(&okm[SESSION_KEY_LENGTH..]);

    SessionKeyPair {
        client_to_server: SessionKey(client_to_server),
        server_to_client: SessionKey(server_to_client),
    }
}
