//! Length-prefixed message framing over any reliable byte stream.
//!
//! Each frame is a 4-byte big-endian length followed by that many payload
//! bytes. The handshake runs over cleartext frames; once both sides hold the
//! derived keys, [`FramedChannel::set_encryption`] installs the frame cipher
//! and every subsequent frame is sealed, starting with the next one written
//! or read.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::cipher::FrameCipher;
use crate::error::ChannelError;
use crate::key::SessionKey;

/// Hard upper bound on a frame's payload as it appears on the wire.
///
/// Enforced against the length prefix before any buffer is allocated, so a
/// hostile peer cannot make the receiver reserve 4 GiB with five bytes.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A message channel over a reliable, ordered byte stream.
///
/// Generic over the transport; production wraps a TCP stream, the tests an
/// in-memory duplex.
pub struct FramedChannel<T> {
    stream: T,
    cipher: Option<FrameCipher>,
}

impl<T: AsyncRead + AsyncWrite + Unpin> FramedChannel<T> {
    /// Wraps a stream. Frames start out cleartext.
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            cipher: None,
        }
    }

    /// Reads the next frame, decrypting it when encryption is installed.
    ///
    /// # Errors
    ///
    /// Transport failures, an oversized length prefix, or a frame that
    /// fails authenticated decryption.
    pub async fn recv(&mut self) -> Result<Vec<u8>, ChannelError> {
        let mut prefix = [0_u8; 4];
        self.stream.read_exact(&mut prefix).await?;

        let length = u32::from_be_bytes(prefix) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(ChannelError::FrameTooLarge(length));
        }

        let mut payload = vec![0_u8; length];
        self.stream.read_exact(&mut payload).await?;
        trace!(length, encrypted = self.cipher.is_some(), "frame in");

        match &mut self.cipher {
            Some(cipher) => Ok(cipher.open(&payload)?),
            None => Ok(payload),
        }
    }

    /// Writes one frame, encrypting it when encryption is installed.
    /// Completion means the bytes were handed to the transport.
    ///
    /// # Errors
    ///
    /// Transport failures, or a payload over the frame limit.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        let frame = match &mut self.cipher {
            Some(cipher) => cipher.seal(payload)?,
            None => payload.to_vec(),
        };

        if frame.len() > MAX_FRAME_SIZE {
            return Err(ChannelError::FrameTooLarge(frame.len()));
        }

        let mut wire = Vec::with_capacity(4 + frame.len());
        wire.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        wire.extend_from_slice(&frame);

        self.stream.write_all(&wire).await?;
        self.stream.flush().await?;
        trace!(
            length = frame.len(),
            encrypted = self.cipher.is_some(),
            "frame out"
        );
        Ok(())
    }

    /// Installs authenticated encryption for all subsequent frames.
    ///
    /// `send_key` seals what this side writes, `recv_key` opens what it
    /// reads; the server passes the server-to-client key first, the client
    /// the reverse.
    pub fn set_encryption(&mut self, send_key: &SessionKey, recv_key: &SessionKey) {
        self.cipher = Some(FrameCipher::new(send_key, recv_key));
    }

    /// Whether frames are currently being sealed.
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// The wrapped stream.
    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    /// Unwraps the stream, discarding any installed encryption state.
    pub fn into_inner(self) -> T {
        self.stream
    }
}
