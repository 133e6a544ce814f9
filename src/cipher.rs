//! Authenticated encryption for post-handshake traffic.
//!
//! One [`FrameCipher`] holds both directions of a connection: a sealing
//! state for outbound frames and an opening state for inbound frames, each
//! with its own nonce counter starting at zero. A sealed frame is
//! `nonce || ciphertext || tag`; the nonce is explicit on the wire and also
//! checked against the expected counter, so a reordered or replayed frame
//! fails before decryption.
//!
//! The one-shot functions seal the single handshake payload that travels
//! inside a key-exchange message, where the nonce comes from the message's
//! `iv` field instead of a counter.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use crate::error::CipherError;
use crate::key::SessionKey;

/// Explicit nonce length in bytes.
pub const NONCE_LENGTH: usize = 12;

/// Authentication tag length in bytes.
pub const TAG_LENGTH: usize = 16;

/// Width of the `iv` fields carried by the key-exchange messages.
pub const IV_LENGTH: usize = 16;

fn counter_nonce(counter: u64) -> [u8; NONCE_LENGTH] {
    let mut nonce = [0_u8; NONCE_LENGTH];
    nonce[..8].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Both directions of a connection's frame encryption.
pub struct FrameCipher {
    sealer: ChaCha20Poly1305,
    opener: ChaCha20Poly1305,
    seal_counter: u64,
    open_counter: u64,
}

impl FrameCipher {
    /// `send_key` seals outbound frames, `recv_key` opens inbound ones.
    /// Which derived key plays which role depends on the side of the
    /// connection; the channel wires this up.
    pub fn new(send_key: &SessionKey, recv_key: &SessionKey) -> Self {
        Self {
            sealer: ChaCha20Poly1305::new(Key::from_slice(send_key.as_bytes())),
            opener: ChaCha20Poly1305::new(Key::from_slice(recv_key.as_bytes())),
            seal_counter: 0,
            open_counter: 0,
        }
    }

    /// Seals one outbound frame as `nonce || ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Only when the direction's frame counter is exhausted.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if self.seal_counter == u64::MAX {
            return Err(CipherError::CounterExhausted);
        }

        let nonce = counter_nonce(self.seal_counter);
        let ciphertext = self
            .sealer
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .expect("sealing into an owned buffer cannot fail");
        self.seal_counter += 1;

        let mut frame = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        frame.extend_from_slice(&nonce);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Opens one inbound frame. The counter advances only on success.
    ///
    /// # Errors
    ///
    /// On truncation, an out-of-sequence nonce, or tag mismatch.
    pub fn open(&mut self, frame: &[u8]) -> Result<Vec<u8>, CipherError> {
        if frame.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CipherError::Truncated);
        }

        let (nonce, ciphertext) = frame.split_at(NONCE_LENGTH);
        if nonce != counter_nonce(self.open_counter) {
            return Err(CipherError::OutOfSequence);
        }

        let plaintext = self
            .opener
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::BadTag)?;
        self.open_counter += 1;

        Ok(plaintext)
    }
}

/// Seals a handshake payload under an explicit iv from the wire.
pub(crate) fn seal_once(
    key: &SessionKey,
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    if iv.len() < NONCE_LENGTH {
        return Err(CipherError::Truncated);
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    Ok(cipher
        .encrypt(Nonce::from_slice(&iv[..NONCE_LENGTH]), plaintext)
        .expect("sealing into an owned buffer cannot fail"))
}

/// Opens a handshake payload sealed by [`seal_once`].
pub(crate) fn open_once(
    key: &SessionKey,
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    if iv.len() < NONCE_LENGTH || ciphertext.len() < TAG_LENGTH {
        return Err(CipherError::Truncated);
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(&iv[..NONCE_LENGTH]), ciphertext)
        .map_err(|_| CipherError::BadTag)
}
