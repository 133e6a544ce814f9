//! Client side of the peer authentication handshake.
//!
//! The counterpart of [`ServerAuthenticator`](crate::server::ServerAuthenticator):
//! one instance per connection, consumed by
//! [`ClientAuthenticator::authenticate`]. The client drives the same linear
//! message sequence from the other end and performs the mirrored SRP
//! computations, so both sides finish holding identical directional keys.
//!
//! A client never learns why it was rejected. Whether the name was unknown,
//! the password wrong or the session type not permitted, the observable
//! outcome is the same: the session challenge cannot be satisfied.

use rand::{thread_rng, RngCore};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;
use zeroize::Zeroizing;

use crate::bigint::{Integer, SecretInteger};
use crate::channel::FramedChannel;
use crate::cipher::{self, IV_LENGTH};
use crate::error::{AuthError, ChannelError, ProtocolViolation};
use crate::key::{derive_session_keys, KeyPair, SessionKeyPair, PUBLIC_KEY_LENGTH};
use crate::primes::SrpGroup;
use crate::proto;
use crate::server::{Authenticated, MINIMUM_PROTOCOL_VERSION, PROTOCOL_VERSION};
use crate::user::SessionType;
use crate::username::Username;

/// The client half of the handshake state machine.
pub struct ClientAuthenticator {
    username: Option<Username>,
    password: Zeroizing<String>,
    methods: u32,
    requested_sessions: u32,
    pinned_server_key: Option<[u8; PUBLIC_KEY_LENGTH]>,
}

impl ClientAuthenticator {
    /// Authenticates as `username` with `password` over SRP.
    pub fn for_user(username: Username, password: &str) -> Self {
        Self {
            username: Some(username),
            password: Zeroizing::new(password.to_owned()),
            methods: proto::METHOD_SRP,
            requested_sessions: SessionType::ALL,
            pinned_server_key: None,
        }
    }

    /// Connects anonymously. Only works against servers that enable it.
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: Zeroizing::new(String::new()),
            methods: proto::METHOD_ANONYMOUS,
            requested_sessions: SessionType::ALL,
            pinned_server_key: None,
        }
    }

    /// Restricts the session types this client asks for. Defaults to all.
    pub fn set_requested_sessions(&mut self, session_types: u32) {
        self.requested_sessions = session_types;
    }

    /// Pins the server's identity key. An anonymous handshake against a
    /// server presenting any other key is refused before key exchange.
    pub fn pin_server_key(&mut self, key: [u8; PUBLIC_KEY_LENGTH]) {
        self.pinned_server_key = Some(key);
    }

    /// Runs the handshake over `channel`.
    ///
    /// On success the channel has the derived keys installed. The returned
    /// [`Authenticated`] mirrors what the server hands its session layer.
    ///
    /// # Errors
    ///
    /// Any rejection by the server surfaces as [`AuthError::AccessDenied`];
    /// malformed or out-of-order messages as [`AuthError::Protocol`].
    pub async fn authenticate<T>(
        self,
        channel: &mut FramedChannel<T>,
    ) -> Result<Authenticated, AuthError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let ephemeral = KeyPair::generate();

        channel
            .send(&proto::encode(&proto::ClientHello {
                version: PROTOCOL_VERSION,
                methods: self.methods,
                ecdh_public: ephemeral.public_key().to_vec(),
            }))
            .await?;

        let frame = channel.recv().await?;
        let hello: proto::ServerHello = proto::decode(&frame, "ServerHello")?;

        if hello.version < MINIMUM_PROTOCOL_VERSION || hello.version > PROTOCOL_VERSION {
            return Err(ProtocolViolation::UnsupportedVersion(hello.version).into());
        }
        if hello.method & self.methods != hello.method || hello.method.count_ones() != 1 {
            return Err(ProtocolViolation::Malformed("ServerHello method").into());
        }

        if hello.method == proto::METHOD_ANONYMOUS {
            if let Some(pinned) = self.pinned_server_key {
                if hello.ecdh_public != pinned {
                    return Err(AuthError::AccessDenied);
                }
            }
        }

        let shared = ephemeral.shared_secret(&hello.ecdh_public)?;

        let keys = match hello.method {
            proto::METHOD_SRP => self.key_exchange(channel, &shared, hello.version).await?,
            proto::METHOD_ANONYMOUS => derive_session_keys(None, &shared, &[]),
            _ => return Err(ProtocolViolation::Malformed("ServerHello method").into()),
        };

        channel.set_encryption(&keys.client_to_server, &keys.server_to_client);
        self.negotiate_session(channel, hello.version).await
    }

    /// The SRP key-exchange steps: identify, receive the group parameters,
    /// send the client public value with the sealed session-type request.
    async fn key_exchange<T>(
        &self,
        channel: &mut FramedChannel<T>,
        ecdh_shared: &x25519_dalek::SharedSecret,
        version: u32,
    ) -> Result<SessionKeyPair, AuthError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let username = self
            .username
            .as_ref()
            .ok_or(AuthError::Internal("srp without a username"))?;
        debug!(user = %username, version, "identifying");

        channel
            .send(&proto::encode(&proto::Identify {
                username: username.as_str().to_owned(),
            }))
            .await?;

        let frame = channel.recv().await?;
        let exchange: proto::ServerKeyExchange = proto::decode(&frame, "ServerKeyExchange")?;

        let group = SrpGroup::from_wire_id(exchange.n_group)
            .ok_or(ProtocolViolation::UnknownGroup(exchange.n_group))?;
        if exchange.salt.is_empty() {
            return Err(ProtocolViolation::Malformed("empty salt").into());
        }
        if exchange.server_public.len() != group.byte_width() {
            return Err(ProtocolViolation::Malformed("server public key").into());
        }

        let n = group.prime();
        let server_public = Integer::from_bytes_be(&exchange.server_public);
        if server_public.is_zero() || server_public.mod_is_zero(&n) {
            return Err(ProtocolViolation::InvalidPublicKey.into());
        }

        let a = SecretInteger::random_below(&n);
        let client_public = crate::srp::calculate_client_public_key(group, &a);

        let u = crate::srp::calculate_u(group, &client_public, &server_public);
        if u.is_zero() {
            return Err(ProtocolViolation::InvalidScrambler.into());
        }

        let x = crate::srp::calculate_x(username, &self.password, &exchange.salt);
        let premaster =
            crate::srp::calculate_client_premaster(group, &server_public, &x, &a, &u);
        let srp_key = crate::srp::calculate_session_key(&premaster);
        let keys = derive_session_keys(Some(&srp_key), ecdh_shared, &exchange.salt);

        let mut iv = vec![0_u8; IV_LENGTH];
        thread_rng().fill_bytes(&mut iv);
        let sealed = cipher::seal_once(
            &keys.client_to_server,
            &iv,
            &self.requested_sessions.to_le_bytes(),
        )
        .map_err(|_| AuthError::Internal("sealing the session type request"))?;

        channel
            .send(&proto::encode(&proto::ClientKeyExchange {
                client_public: client_public.to_padded_bytes_be(group.byte_width()),
                iv,
                encrypted_session_types: sealed,
            }))
            .await?;

        Ok(keys)
    }

    /// Receives the challenge and answers with one session type out of the
    /// offered mask.
    async fn negotiate_session<T>(
        self,
        channel: &mut FramedChannel<T>,
        version: u32,
    ) -> Result<Authenticated, AuthError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let frame = match channel.recv().await {
            Ok(frame) => frame,
            // A challenge that does not decrypt is the merged rejection
            // signal: wrong password and unknown user land here alike.
            Err(ChannelError::Crypto(_)) => return Err(AuthError::AccessDenied),
            Err(error) => return Err(error.into()),
        };
        let challenge: proto::SessionChallenge = proto::decode(&frame, "SessionChallenge")?;

        // Only ever accept something we asked for, regardless of what the
        // server claims to offer.
        let acceptable = challenge.session_types & self.requested_sessions;
        if acceptable == 0 {
            return Err(AuthError::AccessDenied);
        }

        let bit = 1_u32 << acceptable.trailing_zeros();
        let session_type = SessionType::from_bit(bit)
            .ok_or(ProtocolViolation::Malformed("session challenge mask"))?;

        channel
            .send(&proto::encode(&proto::SessionResponse {
                session_type: bit,
                cpu_features: 0,
            }))
            .await?;

        Ok(Authenticated {
            username: self.username,
            session_type,
            version,
        })
    }
}
