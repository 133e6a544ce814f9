//! The errors surfaced by the handshake and its supporting pieces.
//!
//! [`AuthError`] is the classified outcome reported to the caller when a
//! handshake fails. Nothing from this module is ever written to the wire;
//! the remote peer only observes a closed connection.

use thiserror::Error;

use crate::channel::MAX_FRAME_SIZE;

/// Terminal result of a failed handshake.
///
/// Every deviation is fatal to the connection and none is retried. Denied
/// access and denied session negotiation are deliberately indistinguishable
/// on the wire; the distinction only exists in this classification.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed message, message in the wrong state, or an invalid field.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Unknown user, disabled user, wrong password, or a session type the
    /// user is not permitted to open.
    #[error("access denied")]
    AccessDenied,

    /// Authentication succeeded but no session type was mutually acceptable.
    #[error("no mutually acceptable session type")]
    SessionDenied,

    /// The handshake did not complete within the configured deadline.
    #[error("handshake deadline exceeded")]
    Timeout,

    /// The underlying transport failed or was closed by the peer.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// A state that the linear state machine cannot reach. Fails closed.
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

/// The concrete protocol violations behind [`AuthError::Protocol`].
#[derive(Debug, Error)]
pub enum ProtocolViolation {
    /// A length prefix announced more than [`MAX_FRAME_SIZE`] bytes.
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_SIZE} byte limit")]
    OversizedFrame(usize),

    /// A frame did not decode as the message the state machine expected.
    #[error("failed to decode {0}")]
    Malformed(&'static str),

    /// The peer speaks a version older than the supported minimum.
    #[error("peer protocol version {0} is below the supported minimum")]
    UnsupportedVersion(u32),

    /// The identify step carried a name outside the allowed charset.
    #[error(transparent)]
    InvalidUsername(#[from] UsernameError),

    /// A key exchange named a group this implementation does not know.
    #[error("unknown SRP group identifier {0}")]
    UnknownGroup(u32),

    /// An SRP public value was zero modulo the group prime.
    #[error("public value is a multiple of the group prime")]
    InvalidPublicKey,

    /// The scrambling parameter `u` hashed to zero.
    #[error("scrambling parameter reduced to zero")]
    InvalidScrambler,

    /// The X25519 exchange produced a degenerate shared secret.
    #[error("key exchange produced a non-contributory shared secret")]
    WeakKeyExchange,

    /// An encrypted frame failed authentication where no denial was
    /// pending.
    #[error("frame failed authenticated decryption")]
    FrameCrypto,
}

/// Why a name was rejected by [`Username::new`](crate::username::Username::new).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsernameError {
    /// Below the minimum length, carried in the variant.
    #[error("user name is shorter than {0} characters")]
    TooShort(usize),

    /// Above the maximum length, carried in the variant.
    #[error("user name is longer than {0} characters")]
    TooLong(usize),

    /// The offending character.
    #[error("character {0:?} is not allowed in user names")]
    BadCharacter(char),
}

/// Errors from mutating a [`UserList`](crate::user::UserList) or building a
/// [`User`](crate::user::User).
#[derive(Debug, Error)]
pub enum UserError {
    /// A user with the same case-folded name already exists.
    #[error("a user with this name already exists")]
    Duplicate,

    /// The record named a user the list does not contain.
    #[error("no user with this name exists")]
    UnknownUser,

    #[error(transparent)]
    InvalidName(#[from] UsernameError),

    /// Password empty or over the maximum length.
    #[error("password does not satisfy the validity rules")]
    InvalidPassword,

    /// The stored database bytes did not decode.
    #[error("user database is malformed: {0}")]
    MalformedDatabase(#[from] prost::DecodeError),

    /// A record inside a decoded database was unusable (bad group id,
    /// empty salt or verifier).
    #[error("user database contains an invalid record for {0:?}")]
    InvalidRecord(String),
}

/// Rejected authenticator configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The private key seed has the wrong length.
    #[error("private key must be exactly 32 bytes")]
    InvalidPrivateKey,

    /// Anonymous access cannot be enabled before a private key is set.
    #[error("anonymous access requires a private key")]
    AnonymousRequiresKey,
}

/// Transport-level failures of the framed channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying stream failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The length prefix announced more than [`MAX_FRAME_SIZE`] bytes.
    /// Raised before any allocation happens.
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_SIZE} byte limit")]
    FrameTooLarge(usize),

    /// An encrypted frame failed to open.
    #[error(transparent)]
    Crypto(#[from] CipherError),
}

/// Failures of the authenticated frame cipher.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Ciphertext too short to carry a nonce and a tag.
    #[error("ciphertext is truncated")]
    Truncated,

    /// The explicit nonce does not match the expected frame counter.
    #[error("frame arrived out of sequence")]
    OutOfSequence,

    /// Tag verification failed.
    #[error("message failed authentication")]
    BadTag,

    /// The per-direction frame counter would wrap.
    #[error("frame counter exhausted")]
    CounterExhausted,
}

impl From<ChannelError> for AuthError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Io(io) => AuthError::Transport(io),
            ChannelError::FrameTooLarge(n) => {
                AuthError::Protocol(ProtocolViolation::OversizedFrame(n))
            }
            ChannelError::Crypto(_) => AuthError::Protocol(ProtocolViolation::FrameCrypto),
        }
    }
}

impl AuthError {
    /// Whether the failure should be reported to the session layer as an
    /// authorization problem rather than a broken peer.
    pub fn is_denied(&self) -> bool {
        matches!(self, AuthError::AccessDenied | AuthError::SessionDenied)
    }
}
