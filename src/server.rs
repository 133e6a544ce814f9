//! Server side of the peer authentication handshake.
//!
//! One [`ServerAuthenticator`] handles exactly one connection. Configure it,
//! then call [`ServerAuthenticator::authenticate`] with the connection's
//! channel; the call consumes the authenticator and drives the handshake to
//! completion or to a single classified failure. There are no retries inside
//! a connection.
//!
//! The message sequence is strictly linear:
//!
//! ```text
//! READ_CLIENT_HELLO -> SEND_SERVER_HELLO -> READ_IDENTIFY
//!   -> SEND_SERVER_KEY_EXCHANGE -> READ_CLIENT_KEY_EXCHANGE
//!   -> SEND_SESSION_CHALLENGE -> READ_SESSION_RESPONSE -> DONE
//! ```
//!
//! with the SRP-only steps skipped on the anonymous path. Any deviation is
//! fatal; nothing diagnostic is ever written back to the wire.
//!
//! # User enumeration resistance
//!
//! A name that matches no usable record (unknown or disabled user) gets a
//! deterministic decoy salt and verifier, and the handshake proceeds through
//! the same computations as for a real user. The connection is only failed
//! at the session-response step, the same point at which a wrong password or
//! a disallowed session type fails, so the three cases are not
//! distinguishable by round-trip count or reply shape.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::{thread_rng, RngCore};
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, warn};
use x25519_dalek::SharedSecret;
use zeroize::Zeroize;

use crate::bigint::{Integer, SecretInteger};
use crate::channel::FramedChannel;
use crate::cipher::{self, IV_LENGTH};
use crate::error::{AuthError, ChannelError, ConfigError, ProtocolViolation};
use crate::key::{derive_session_keys, KeyPair, PRIVATE_KEY_LENGTH};
use crate::primes::SrpGroup;
use crate::proto;
use crate::user::{SessionType, SharedUserList, UserList};
use crate::username::Username;

/// Version this implementation speaks.
pub const PROTOCOL_VERSION: u32 = 2;

/// Oldest peer version still accepted.
pub const MINIMUM_PROTOCOL_VERSION: u32 = 1;

/// Wall-clock budget for a whole handshake unless overridden.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

static NEXT_HANDSHAKE_ID: AtomicU64 = AtomicU64::new(1);

/// Whether unauthenticated peers are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnonymousAccess {
    /// Admit anonymous peers, confined to the configured session types.
    Enable,
    /// Reject every peer that cannot authenticate. The default.
    Disable,
}

/// Outcome of a completed handshake, handed to the session layer.
///
/// The channel the handshake ran over already has the derived keys
/// installed.
#[derive(Debug)]
pub struct Authenticated {
    /// `None` for anonymous peers.
    pub username: Option<Username>,
    /// The session type both sides committed to.
    pub session_type: SessionType,
    /// The negotiated protocol version.
    pub version: u32,
}

/// The server half of the handshake state machine.
pub struct ServerAuthenticator {
    user_list: Option<SharedUserList>,
    identity_key: Option<KeyPair>,
    anonymous_access: AnonymousAccess,
    anonymous_session_types: u32,
    handshake_timeout: Duration,
    default_group: SrpGroup,
    decoy_secret: [u8; 32],
}

impl ServerAuthenticator {
    /// An authenticator with default configuration: no users, no anonymous
    /// access, the default group and deadline.
    pub fn new() -> Self {
        // Without a configured private key the decoy secret is per-process
        // random; with one it is re-derived from the key so probes see the
        // same decoy salt across restarts.
        let mut decoy_secret = [0_u8; 32];
        thread_rng().fill_bytes(&mut decoy_secret);

        Self {
            user_list: None,
            identity_key: None,
            anonymous_access: AnonymousAccess::Disable,
            anonymous_session_types: 0,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            default_group: SrpGroup::default(),
            decoy_secret,
        }
    }

    /// Sets the user catalog. Required unless anonymous access is enabled.
    /// A snapshot is taken when the handshake starts; later swaps do not
    /// affect this connection.
    pub fn set_user_list(&mut self, user_list: SharedUserList) {
        self.user_list = Some(user_list);
    }

    /// Loads the server's long-term identity key from a 32-byte seed.
    /// Required for anonymous access.
    ///
    /// # Errors
    ///
    /// If the seed is not exactly 32 bytes.
    pub fn set_private_key(&mut self, key: &[u8]) -> Result<(), ConfigError> {
        let mut seed: [u8; PRIVATE_KEY_LENGTH] =
            key.try_into().map_err(|_| ConfigError::InvalidPrivateKey)?;

        let mut mac =
            Hmac::<Sha256>::new_from_slice(&seed).expect("hmac accepts any key length");
        mac.update(b"decoy secret");
        self.decoy_secret = mac.finalize().into_bytes().into();

        self.identity_key = Some(KeyPair::from_seed(seed));
        seed.zeroize();
        Ok(())
    }

    /// Enables or disables anonymous access, confined to `session_types`.
    /// The private key must already be set when enabling.
    ///
    /// # Errors
    ///
    /// If enabling without a configured private key.
    pub fn set_anonymous_access(
        &mut self,
        anonymous_access: AnonymousAccess,
        session_types: u32,
    ) -> Result<(), ConfigError> {
        if anonymous_access == AnonymousAccess::Enable && self.identity_key.is_none() {
            return Err(ConfigError::AnonymousRequiresKey);
        }

        self.anonymous_access = anonymous_access;
        self.anonymous_session_types = session_types;
        Ok(())
    }

    /// Overrides the [`DEFAULT_HANDSHAKE_TIMEOUT`] deadline.
    pub fn set_handshake_timeout(&mut self, timeout: Duration) {
        self.handshake_timeout = timeout;
    }

    /// Group used for decoy records. Real records carry their own group.
    pub fn set_default_group(&mut self, group: SrpGroup) {
        self.default_group = group;
    }

    /// Runs the handshake over `channel` to completion or to a fatal error.
    ///
    /// On success the channel has the derived keys installed and is ready to
    /// carry session traffic. On any failure the caller must drop the
    /// connection; no failure reason is sent to the peer.
    ///
    /// # Errors
    ///
    /// One [`AuthError`] from the taxonomy in [`crate::error`]; exceeding
    /// the configured deadline yields [`AuthError::Timeout`].
    pub async fn authenticate<T>(
        self,
        channel: &mut FramedChannel<T>,
    ) -> Result<Authenticated, AuthError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let handshake = NEXT_HANDSHAKE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(handshake, "peer handshake started");

        let deadline = self.handshake_timeout;
        let result = match timeout(deadline, self.run(channel, handshake)).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::Timeout),
        };

        match &result {
            Ok(done) => debug!(
                handshake,
                session_type = ?done.session_type,
                anonymous = done.username.is_none(),
                "peer handshake complete"
            ),
            Err(error) => warn!(handshake, %error, "peer handshake failed"),
        }
        result
    }

    async fn run<T>(
        self,
        channel: &mut FramedChannel<T>,
        handshake: u64,
    ) -> Result<Authenticated, AuthError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        // READ_CLIENT_HELLO
        let frame = channel.recv().await?;
        let hello: proto::ClientHello = proto::decode(&frame, "ClientHello")?;

        if hello.version < MINIMUM_PROTOCOL_VERSION {
            return Err(ProtocolViolation::UnsupportedVersion(hello.version).into());
        }
        let version = hello.version.min(PROTOCOL_VERSION);

        let users = self.user_list.as_ref().map(SharedUserList::snapshot);
        let have_users = users.as_ref().map_or(false, |list| !list.is_empty());

        // SRP wins whenever it is offered and usable; anonymous is the
        // fallback, never an override.
        let srp_offered = hello.methods & proto::METHOD_SRP != 0;
        let anonymous_offered = hello.methods & proto::METHOD_ANONYMOUS != 0;
        let anonymous_enabled =
            self.anonymous_access == AnonymousAccess::Enable && self.identity_key.is_some();

        if srp_offered && have_users {
            let ephemeral = KeyPair::generate();
            let shared = ephemeral.shared_secret(&hello.ecdh_public)?;

            // SEND_SERVER_HELLO
            channel
                .send(&proto::encode(&proto::ServerHello {
                    version,
                    method: proto::METHOD_SRP,
                    ecdh_public: ephemeral.public_key().to_vec(),
                }))
                .await?;

            let users = users.ok_or(AuthError::Internal("srp selected without a user list"))?;
            self.run_srp(channel, handshake, version, &users, shared).await
        } else if anonymous_offered && anonymous_enabled {
            let identity = self
                .identity_key
                .as_ref()
                .ok_or(AuthError::Internal("anonymous access without identity key"))?;
            let shared = identity.shared_secret(&hello.ecdh_public)?;

            // SEND_SERVER_HELLO: the identity public key doubles as the
            // pinnable proof of who the anonymous client is talking to.
            channel
                .send(&proto::encode(&proto::ServerHello {
                    version,
                    method: proto::METHOD_ANONYMOUS,
                    ecdh_public: identity.public_key().to_vec(),
                }))
                .await?;

            self.run_anonymous(channel, handshake, version, shared).await
        } else {
            Err(AuthError::AccessDenied)
        }
    }

    async fn run_srp<T>(
        self,
        channel: &mut FramedChannel<T>,
        handshake: u64,
        version: u32,
        users: &UserList,
        ecdh_shared: SharedSecret,
    ) -> Result<Authenticated, AuthError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        // READ_IDENTIFY
        let frame = channel.recv().await?;
        let identify: proto::Identify = proto::decode(&frame, "Identify")?;
        let username = Username::new(identify.username)
            .map_err(|e| AuthError::Protocol(e.into()))?;
        debug!(handshake, user = %username, "peer identified");

        // A denial is recorded here but acted on only at the session
        // response, so every denied path fails at the same step.
        let mut denial: Option<AuthError> = None;

        let (group, salt, verifier, allowed_sessions) = match users.find(&username.key()) {
            Some(user) if user.is_enabled() => (
                user.group,
                user.salt.clone(),
                Integer::from_bytes_be(&user.verifier),
                user.sessions,
            ),
            _ => {
                denial = Some(AuthError::AccessDenied);
                let (salt, verifier) =
                    crate::srp::synthesize_decoy(&self.decoy_secret, &username.key(), self.default_group);
                (self.default_group, salt, verifier, 0)
            }
        };

        let n = group.prime();
        let b = SecretInteger::random_below(&n);
        let server_public = crate::srp::calculate_server_public_key(group, &verifier, &b);

        let mut iv = vec![0_u8; IV_LENGTH];
        thread_rng().fill_bytes(&mut iv);

        // SEND_SERVER_KEY_EXCHANGE
        channel
            .send(&proto::encode(&proto::ServerKeyExchange {
                n_group: group.wire_id(),
                salt: salt.clone(),
                server_public: server_public.to_padded_bytes_be(group.byte_width()),
                iv,
            }))
            .await?;

        // READ_CLIENT_KEY_EXCHANGE
        let frame = channel.recv().await?;
        let exchange: proto::ClientKeyExchange = proto::decode(&frame, "ClientKeyExchange")?;

        if exchange.client_public.len() != group.byte_width() {
            return Err(ProtocolViolation::Malformed("client public key").into());
        }
        let client_public = Integer::from_bytes_be(&exchange.client_public);
        if client_public.is_zero() || client_public.mod_is_zero(&n) {
            return Err(ProtocolViolation::InvalidPublicKey.into());
        }

        let u = crate::srp::calculate_u(group, &client_public, &server_public);
        if u.is_zero() {
            return Err(ProtocolViolation::InvalidScrambler.into());
        }

        let premaster = crate::srp::calculate_server_premaster(group, &client_public, &verifier, &u, &b);
        let srp_key = crate::srp::calculate_session_key(&premaster);
        let keys = derive_session_keys(Some(&srp_key), &ecdh_shared, &salt);

        let offered = match cipher::open_once(
            &keys.client_to_server,
            &exchange.iv,
            &exchange.encrypted_session_types,
        ) {
            Ok(plaintext) if denial.is_none() => {
                let requested: [u8; 4] = plaintext
                    .as_slice()
                    .try_into()
                    .map_err(|_| ProtocolViolation::Malformed("session type payload"))?;
                let requested = u32::from_le_bytes(requested);

                let intersection = requested & allowed_sessions;
                if intersection == 0 {
                    denial = Some(AuthError::AccessDenied);
                }
                intersection
            }
            Ok(_) => 0,
            Err(_) => {
                // Wrong password, or the decoy keys doing their job.
                denial.get_or_insert(AuthError::AccessDenied);
                0
            }
        };

        channel.set_encryption(&keys.server_to_client, &keys.client_to_server);

        // SEND_SESSION_CHALLENGE: a denied peer is offered the empty mask so
        // its response cannot succeed.
        let offered = if denial.is_some() { 0 } else { offered };
        channel
            .send(&proto::encode(&proto::SessionChallenge {
                session_types: offered,
                cpu_features: 0,
                version,
            }))
            .await?;

        // READ_SESSION_RESPONSE
        let response = self.read_session_response(channel, &mut denial).await?;
        if let Some(denied) = denial {
            return Err(denied);
        }

        let session_type = chosen_session_type(response.session_type, offered)?;
        Ok(Authenticated {
            username: Some(username),
            session_type,
            version,
        })
    }

    async fn run_anonymous<T>(
        self,
        channel: &mut FramedChannel<T>,
        handshake: u64,
        version: u32,
        ecdh_shared: SharedSecret,
    ) -> Result<Authenticated, AuthError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        debug!(handshake, "anonymous key exchange");

        let keys = derive_session_keys(None, &ecdh_shared, &[]);
        channel.set_encryption(&keys.server_to_client, &keys.client_to_server);

        // SEND_SESSION_CHALLENGE
        let offered = self.anonymous_session_types;
        channel
            .send(&proto::encode(&proto::SessionChallenge {
                session_types: offered,
                cpu_features: 0,
                version,
            }))
            .await?;

        // READ_SESSION_RESPONSE
        let mut denial = None;
        let response = self.read_session_response(channel, &mut denial).await?;
        if let Some(denied) = denial {
            return Err(denied);
        }

        let session_type = chosen_session_type(response.session_type, offered)?;
        Ok(Authenticated {
            username: None,
            session_type,
            version,
        })
    }

    /// Reads the final message, folding every failure into the recorded
    /// denial when one is pending so denied peers observe nothing that a
    /// broken transport would not also produce.
    async fn read_session_response<T>(
        &self,
        channel: &mut FramedChannel<T>,
        denial: &mut Option<AuthError>,
    ) -> Result<proto::SessionResponse, AuthError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let frame = match channel.recv().await {
            Ok(frame) => frame,
            Err(error) => {
                return Err(match denial.take() {
                    Some(denied) => denied,
                    None => match error {
                        ChannelError::Crypto(_) => AuthError::AccessDenied,
                        other => other.into(),
                    },
                })
            }
        };

        match proto::decode(&frame, "SessionResponse") {
            Ok(response) => Ok(response),
            Err(violation) => Err(denial.take().unwrap_or(AuthError::Protocol(violation))),
        }
    }
}

impl Default for ServerAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

/// The response must name exactly one session type, drawn from the offered
/// mask.
fn chosen_session_type(bit: u32, offered: u32) -> Result<SessionType, AuthError> {
    if bit == 0 || !bit.is_power_of_two() || bit & offered != bit {
        return Err(AuthError::SessionDenied);
    }

    SessionType::from_bit(bit).ok_or(AuthError::SessionDenied)
}
