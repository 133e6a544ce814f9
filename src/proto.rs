//! Wire messages of the handshake and of the stored user database.
//!
//! Every handshake step is exactly one framed message. The encoding is
//! protobuf; field numbers are part of the protocol contract and must never
//! be reassigned. Handshake messages carry no secrets beyond what the
//! protocol itself exposes (salts, public values, sealed payloads).

// Field-by-field docs would only restate the wire table; the message docs
// carry the semantics.
#![allow(missing_docs)]

use prost::Message;

use crate::error::ProtocolViolation;

/// Bit advertised in [`ClientHello::methods`] and chosen in
/// [`ServerHello::method`]: SRP6a user authentication.
pub const METHOD_SRP: u32 = 0x01;

/// Bit advertised in [`ClientHello::methods`] and chosen in
/// [`ServerHello::method`]: anonymous access.
pub const METHOD_ANONYMOUS: u32 = 0x02;

/// First message, client to server.
///
/// `ecdh_public` is the client's ephemeral X25519 public key; carrying it
/// here lets the anonymous path complete its key exchange without any
/// further client message before the session challenge.
#[derive(Clone, PartialEq, Message)]
pub struct ClientHello {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(uint32, tag = "2")]
    pub methods: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub ecdh_public: Vec<u8>,
}

/// Reply to [`ClientHello`], server to client.
#[derive(Clone, PartialEq, Message)]
pub struct ServerHello {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(uint32, tag = "2")]
    pub method: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub ecdh_public: Vec<u8>,
}

/// SRP path only, client to server.
#[derive(Clone, PartialEq, Message)]
pub struct Identify {
    #[prost(string, tag = "1")]
    pub username: String,
}

/// SRP path only, server to client.
///
/// `server_public` is `PAD(B)`. The `iv` field is fixed at 16 random bytes;
/// it is reserved by the wire format and keeps key-exchange replies
/// byte-uniform across real and decoy records.
#[derive(Clone, PartialEq, Message)]
pub struct ServerKeyExchange {
    #[prost(uint32, tag = "1")]
    pub n_group: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub salt: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub server_public: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub iv: Vec<u8>,
}

/// SRP path only, client to server.
///
/// `client_public` is `PAD(A)`. `encrypted_session_types` carries the
/// requested session-type bitmask sealed under the freshly derived
/// client-to-server key with `iv` as the nonce source.
#[derive(Clone, PartialEq, Message)]
pub struct ClientKeyExchange {
    #[prost(bytes = "vec", tag = "1")]
    pub client_public: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub iv: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub encrypted_session_types: Vec<u8>,
}

/// Server to client, first message after channel encryption is installed.
#[derive(Clone, PartialEq, Message)]
pub struct SessionChallenge {
    #[prost(uint32, tag = "1")]
    pub session_types: u32,
    #[prost(uint32, tag = "2")]
    pub cpu_features: u32,
    #[prost(uint32, tag = "3")]
    pub version: u32,
}

/// Client to server, final handshake message.
#[derive(Clone, PartialEq, Message)]
pub struct SessionResponse {
    #[prost(uint32, tag = "1")]
    pub session_type: u32,
    #[prost(uint32, tag = "2")]
    pub cpu_features: u32,
}

/// One stored user record, as persisted in the user database file.
#[derive(Clone, PartialEq, Message)]
pub struct UserEntry {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub salt: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub verifier: Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub group: u32,
    #[prost(uint32, tag = "5")]
    pub sessions: u32,
    #[prost(uint32, tag = "6")]
    pub flags: u32,
}

/// The user database file: a flat list of records.
#[derive(Clone, PartialEq, Message)]
pub struct UserDatabase {
    #[prost(message, repeated, tag = "1")]
    pub users: Vec<UserEntry>,
}

pub(crate) fn encode<M: Message>(message: &M) -> Vec<u8> {
    message.encode_to_vec()
}

pub(crate) fn decode<M: Message + Default>(
    buffer: &[u8],
    what: &'static str,
) -> Result<M, ProtocolViolation> {
    M::decode(buffer).map_err(|_| ProtocolViolation::Malformed(what))
}
