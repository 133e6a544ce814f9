//! Peer authentication for remote desktop connections.
//!
//! A host that is about to be controlled and a client that wants to control
//! it authenticate each other with a fresh handshake per connection: an
//! SRP6a password proof against a stored verifier, an X25519 exchange, and
//! a session-type negotiation, after which both sides hold identical
//! directional keys and the channel carries only authenticated ciphertext.
//! The server never stores passwords and a wire observer never sees one.
//!
//! # Structure
//!
//! * A [`server`] module with the [`ServerAuthenticator`] state machine run
//!   by the host.
//! * A [`client`] module with the [`ClientAuthenticator`] counterpart.
//! * A [`user`] module with the [`UserList`] catalog, the password policy
//!   and the [`SharedUserList`] swap handle.
//! * A [`channel`] module with the length-prefixed [`FramedChannel`] the
//!   handshake runs over, and which carries sealed frames afterwards.
//! * A [`primes`] module with the supported SRP groups.
//! * A [`proto`] module with the wire messages.
//! * An [`error`] module with the failure taxonomy: one classified reason
//!   per failed handshake and nothing written to the wire.
//!
//! # Server usage
//!
//! Records are created from a name and password, stored in a [`UserList`],
//! and the list is shared with the authenticators through a
//! [`SharedUserList`]:
//!
//! ```
//! use peer_srp::{SessionType, SharedUserList, User, UserList, Username};
//!
//! fn build_catalog() -> Result<SharedUserList, Box<dyn std::error::Error>> {
//!     let mut alice = User::create(Username::new("alice")?, "Correct_Horse9")?;
//!     alice.sessions = SessionType::DesktopManage.bit() | SessionType::DesktopView.bit();
//!
//!     let mut list = UserList::new();
//!     list.add(alice)?;
//!     Ok(SharedUserList::new(list))
//! }
//! # build_catalog().unwrap();
//! ```
//!
//! Each accepted connection gets its own [`ServerAuthenticator`]:
//!
//! ```
//! use peer_srp::{FramedChannel, ServerAuthenticator, SharedUserList};
//! use tokio::io::{AsyncRead, AsyncWrite};
//!
//! async fn accept<T: AsyncRead + AsyncWrite + Unpin>(
//!     stream: T,
//!     users: SharedUserList,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut authenticator = ServerAuthenticator::new();
//!     authenticator.set_user_list(users);
//!
//!     let mut channel = FramedChannel::new(stream);
//!     let session = authenticator.authenticate(&mut channel).await?;
//!
//!     // The channel now carries only sealed frames; hand it and the
//!     // negotiated session type to the session layer.
//!     let _ = (session.session_type, session.username);
//!     Ok(())
//! }
//! ```
//!
//! # Client usage
//!
//! ```
//! use peer_srp::{ClientAuthenticator, FramedChannel, SessionType, Username};
//! use tokio::io::{AsyncRead, AsyncWrite};
//!
//! async fn connect<T: AsyncRead + AsyncWrite + Unpin>(
//!     stream: T,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut authenticator =
//!         ClientAuthenticator::for_user(Username::new("alice")?, "Correct_Horse9");
//!     authenticator.set_requested_sessions(SessionType::DesktopView.bit());
//!
//!     let mut channel = FramedChannel::new(stream);
//!     let session = authenticator.authenticate(&mut channel).await?;
//!     assert_eq!(session.session_type, SessionType::DesktopView);
//!     Ok(())
//! }
//! ```
//!
//! # Failure behavior
//!
//! Every deviation is fatal to the connection and surfaces as a single
//! [`AuthError`]. Unknown users, disabled users and wrong passwords are
//! indistinguishable to the peer: the server answers with a deterministic
//! decoy key exchange and the connection fails at the same step in every
//! case. See [`error`] for the taxonomy.

#![forbid(unsafe_code)]
#![warn(
    clippy::perf,
    clippy::correctness,
    clippy::style,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::unseparated_literal_suffix,
    missing_docs
)]

pub use channel::{FramedChannel, MAX_FRAME_SIZE};
pub use client::ClientAuthenticator;
pub use error::{AuthError, ConfigError};
pub use key::{KeyPair, SessionKey, SessionKeyPair};
pub use key::{PRIVATE_KEY_LENGTH, PUBLIC_KEY_LENGTH, SESSION_KEY_LENGTH};
pub use primes::SrpGroup;
pub use server::{AnonymousAccess, Authenticated, ServerAuthenticator};
pub use server::{DEFAULT_HANDSHAKE_TIMEOUT, MINIMUM_PROTOCOL_VERSION, PROTOCOL_VERSION};
pub use user::{SessionType, SharedUserList, User, UserFlags, UserList};
pub use username::Username;

pub(crate) mod bigint;
pub mod channel;
pub mod cipher;
pub mod client;
pub mod error;
pub mod key;
pub mod primes;
pub mod proto;
pub mod server;
pub(crate) mod srp;
pub mod user;
pub mod username;
