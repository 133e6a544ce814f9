//! End-to-end handshakes between a real server and a real client over an
//! in-memory duplex, plus hostile drivers speaking the raw wire format.

use std::time::Duration;

use prost::Message;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use peer_srp::error::ProtocolViolation;
use peer_srp::proto;
use peer_srp::{
    AnonymousAccess, AuthError, Authenticated, ClientAuthenticator, FramedChannel, KeyPair,
    ServerAuthenticator, SessionType, SharedUserList, User, UserFlags, UserList, Username,
    MAX_FRAME_SIZE, PROTOCOL_VERSION,
};

type Channel = FramedChannel<DuplexStream>;

fn catalog(users: Vec<User>) -> SharedUserList {
    let mut list = UserList::new();
    for user in users {
        list.add(user).unwrap();
    }
    SharedUserList::new(list)
}

fn alice() -> User {
    let mut user = User::create(Username::new("alice").unwrap(), "Correct_Horse9").unwrap();
    user.sessions = SessionType::DesktopManage.bit() | SessionType::DesktopView.bit();
    user
}

fn disabled_bob() -> User {
    let mut user = User::create(Username::new("bob").unwrap(), "Hunter2!!").unwrap();
    user.sessions = SessionType::ALL;
    user.flags = UserFlags::empty();
    user
}

fn server_with(users: SharedUserList) -> ServerAuthenticator {
    let mut server = ServerAuthenticator::new();
    server.set_user_list(users);
    server
}

async fn drive_server(
    server: ServerAuthenticator,
    stream: DuplexStream,
) -> (Result<Authenticated, AuthError>, Option<Channel>) {
    let mut channel = FramedChannel::new(stream);
    match server.authenticate(&mut channel).await {
        Ok(done) => (Ok(done), Some(channel)),
        // Dropping the channel is how a failed handshake closes the
        // connection; the peer observes nothing but EOF.
        Err(error) => (Err(error), None),
    }
}

async fn drive_client(
    client: ClientAuthenticator,
    stream: DuplexStream,
) -> (Result<Authenticated, AuthError>, Option<Channel>) {
    let mut channel = FramedChannel::new(stream);
    match client.authenticate(&mut channel).await {
        Ok(done) => (Ok(done), Some(channel)),
        Err(error) => (Err(error), None),
    }
}

async fn handshake(
    server: ServerAuthenticator,
    client: ClientAuthenticator,
) -> (
    (Result<Authenticated, AuthError>, Option<Channel>),
    (Result<Authenticated, AuthError>, Option<Channel>),
) {
    let (near, far) = duplex(1 << 16);
    tokio::join!(drive_server(server, near), drive_client(client, far))
}

#[tokio::test]
async fn full_srp_handshake_negotiates_the_requested_session() {
    let mut client = ClientAuthenticator::for_user(Username::new("alice").unwrap(), "Correct_Horse9");
    client.set_requested_sessions(SessionType::DesktopView.bit());

    let ((server_result, server_channel), (client_result, client_channel)) =
        handshake(server_with(catalog(vec![alice()])), client).await;

    let server_done = server_result.unwrap();
    let client_done = client_result.unwrap();

    assert_eq!(server_done.session_type, SessionType::DesktopView);
    assert_eq!(client_done.session_type, SessionType::DesktopView);
    assert_eq!(server_done.username.unwrap().to_string(), "alice");
    assert_eq!(server_done.version, PROTOCOL_VERSION);

    // Both sides must hold identical directional keys: application frames
    // sealed by one end open on the other, in both directions.
    let mut server_channel = server_channel.unwrap();
    let mut client_channel = client_channel.unwrap();
    assert!(server_channel.is_encrypted());

    server_channel.send(b"host to client").await.unwrap();
    client_channel.send(b"client to host").await.unwrap();
    assert_eq!(client_channel.recv().await.unwrap(), b"host to client");
    assert_eq!(server_channel.recv().await.unwrap(), b"client to host");
}

#[tokio::test]
async fn case_insensitive_login_reaches_the_same_record() {
    let client = ClientAuthenticator::for_user(Username::new("ALICE").unwrap(), "Correct_Horse9");

    let ((server_result, _), (client_result, _)) =
        handshake(server_with(catalog(vec![alice()])), client).await;

    assert!(server_result.is_ok());
    assert!(client_result.is_ok());
}

#[tokio::test]
async fn disabled_user_with_the_correct_password_is_denied() {
    let client = ClientAuthenticator::for_user(Username::new("bob").unwrap(), "Hunter2!!");

    let ((server_result, _), (client_result, _)) =
        handshake(server_with(catalog(vec![alice(), disabled_bob()])), client).await;

    assert!(matches!(server_result, Err(AuthError::AccessDenied)));
    assert!(matches!(client_result, Err(AuthError::AccessDenied)));
}

#[tokio::test]
async fn unknown_user_is_denied_exactly_like_a_disabled_one() {
    let client = ClientAuthenticator::for_user(Username::new("eve").unwrap(), "whatever1");

    let ((server_result, _), (client_result, _)) =
        handshake(server_with(catalog(vec![alice()])), client).await;

    assert!(matches!(server_result, Err(AuthError::AccessDenied)));
    assert!(matches!(client_result, Err(AuthError::AccessDenied)));
}

#[tokio::test]
async fn wrong_password_is_denied() {
    let client = ClientAuthenticator::for_user(Username::new("alice").unwrap(), "Wrong_Horse9");

    let ((server_result, _), (client_result, _)) =
        handshake(server_with(catalog(vec![alice()])), client).await;

    assert!(matches!(server_result, Err(AuthError::AccessDenied)));
    assert!(matches!(client_result, Err(AuthError::AccessDenied)));
}

#[tokio::test]
async fn session_type_outside_the_user_mask_is_denied() {
    let mut user = User::create(Username::new("carol").unwrap(), "Str0ng_pass!").unwrap();
    user.sessions = SessionType::DesktopView.bit() | SessionType::FileTransfer.bit();
    let users = catalog(vec![user]);

    let mut client = ClientAuthenticator::for_user(Username::new("carol").unwrap(), "Str0ng_pass!");
    client.set_requested_sessions(SessionType::DesktopManage.bit());

    let ((server_result, _), (client_result, _)) =
        handshake(server_with(users.clone()), client).await;
    assert!(matches!(server_result, Err(AuthError::AccessDenied)));
    assert!(matches!(client_result, Err(AuthError::AccessDenied)));

    // The same user succeeds with a permitted type.
    let mut client = ClientAuthenticator::for_user(Username::new("carol").unwrap(), "Str0ng_pass!");
    client.set_requested_sessions(SessionType::DesktopView.bit());

    let ((server_result, _), (client_result, _)) = handshake(server_with(users), client).await;
    assert_eq!(server_result.unwrap().session_type, SessionType::DesktopView);
    assert!(client_result.is_ok());
}

#[tokio::test]
async fn challenge_carries_the_intersection_and_the_client_picks_from_it() {
    // Client asks for everything; the user may only view and transfer
    // files. The negotiated type must come out of the intersection.
    let mut user = User::create(Username::new("dave").unwrap(), "Str0ng_pass!").unwrap();
    user.sessions = SessionType::DesktopView.bit() | SessionType::FileTransfer.bit();

    let client = ClientAuthenticator::for_user(Username::new("dave").unwrap(), "Str0ng_pass!");

    let ((server_result, _), (client_result, _)) =
        handshake(server_with(catalog(vec![user])), client).await;

    let negotiated = server_result.unwrap().session_type;
    assert_eq!(client_result.unwrap().session_type, negotiated);
    assert!(
        negotiated == SessionType::DesktopView || negotiated == SessionType::FileTransfer,
        "negotiated {:?} outside the user mask",
        negotiated
    );
}

#[tokio::test]
async fn anonymous_access_when_enabled() {
    let mut server = ServerAuthenticator::new();
    server.set_private_key(&[7_u8; 32]).unwrap();
    server
        .set_anonymous_access(AnonymousAccess::Enable, SessionType::DesktopView.bit())
        .unwrap();

    let ((server_result, server_channel), (client_result, client_channel)) =
        handshake(server, ClientAuthenticator::anonymous()).await;

    let server_done = server_result.unwrap();
    assert!(server_done.username.is_none());
    assert_eq!(server_done.session_type, SessionType::DesktopView);
    assert_eq!(client_result.unwrap().session_type, SessionType::DesktopView);

    let mut server_channel = server_channel.unwrap();
    let mut client_channel = client_channel.unwrap();
    server_channel.send(b"anonymous traffic").await.unwrap();
    assert_eq!(client_channel.recv().await.unwrap(), b"anonymous traffic");
}

#[tokio::test]
async fn anonymous_access_when_disabled_is_denied() {
    let ((server_result, _), (client_result, _)) = handshake(
        server_with(catalog(vec![alice()])),
        ClientAuthenticator::anonymous(),
    )
    .await;

    assert!(matches!(server_result, Err(AuthError::AccessDenied)));
    // The server closes without replying; the client sees the transport die.
    assert!(client_result.is_err());
}

#[tokio::test]
async fn pinned_identity_key_rejects_an_imposter() {
    let mut server = ServerAuthenticator::new();
    server.set_private_key(&[7_u8; 32]).unwrap();
    server
        .set_anonymous_access(AnonymousAccess::Enable, SessionType::ALL)
        .unwrap();

    let mut client = ClientAuthenticator::anonymous();
    client.pin_server_key(KeyPair::from_seed([9_u8; 32]).public_key());

    let ((_, _), (client_result, _)) = handshake(server, client).await;
    assert!(matches!(client_result, Err(AuthError::AccessDenied)));

    // The same pin accepts the genuine key.
    let mut server = ServerAuthenticator::new();
    server.set_private_key(&[7_u8; 32]).unwrap();
    server
        .set_anonymous_access(AnonymousAccess::Enable, SessionType::ALL)
        .unwrap();

    let mut client = ClientAuthenticator::anonymous();
    client.pin_server_key(KeyPair::from_seed([7_u8; 32]).public_key());

    let ((server_result, _), (client_result, _)) = handshake(server, client).await;
    assert!(server_result.is_ok());
    assert!(client_result.is_ok());
}

#[tokio::test]
async fn malformed_client_hello_fails_before_any_reply() {
    let (near, mut far) = duplex(1024);
    let server = server_with(catalog(vec![alice()]));

    let server_task = async {
        let mut channel = FramedChannel::new(near);
        let result = server.authenticate(&mut channel).await;
        drop(channel);
        result
    };

    let probe = async {
        // One framed byte: a field header with its varint value missing.
        far.write_all(&1_u32.to_be_bytes()).await.unwrap();
        far.write_all(&[0x08]).await.unwrap();

        // The server must close without writing anything back.
        let mut buffer = [0_u8; 1];
        far.read(&mut buffer).await.unwrap()
    };

    let (result, bytes_from_server) = tokio::join!(server_task, probe);
    assert!(matches!(
        result,
        Err(AuthError::Protocol(ProtocolViolation::Malformed(_)))
    ));
    assert_eq!(bytes_from_server, 0, "server replied to a malformed hello");
}

#[tokio::test]
async fn identify_with_an_embedded_nul_is_a_protocol_error() {
    let (near, far) = duplex(1 << 16);
    let server = server_with(catalog(vec![alice()]));

    let server_task = async {
        let mut channel = FramedChannel::new(near);
        server.authenticate(&mut channel).await
    };

    let driver = async {
        let mut channel = FramedChannel::new(far);
        let ephemeral = KeyPair::generate();

        channel
            .send(
                &proto::ClientHello {
                    version: PROTOCOL_VERSION,
                    methods: proto::METHOD_SRP,
                    ecdh_public: ephemeral.public_key().to_vec(),
                }
                .encode_to_vec(),
            )
            .await
            .unwrap();
        let _server_hello = channel.recv().await.unwrap();

        channel
            .send(
                &proto::Identify {
                    username: "alice\u{0}drop".to_owned(),
                }
                .encode_to_vec(),
            )
            .await
            .unwrap();
    };

    let (result, ()) = tokio::join!(server_task, driver);
    assert!(matches!(
        result,
        Err(AuthError::Protocol(ProtocolViolation::InvalidUsername(_)))
    ));
}

#[tokio::test]
async fn oversized_frame_is_rejected_from_the_length_prefix_alone() {
    let (near, mut far) = duplex(1024);
    let server = server_with(catalog(vec![alice()]));

    let server_task = async {
        let mut channel = FramedChannel::new(near);
        server.authenticate(&mut channel).await
    };

    let probe = async {
        let announced = (MAX_FRAME_SIZE as u32) + 1;
        far.write_all(&announced.to_be_bytes()).await.unwrap();
    };

    let (result, ()) = tokio::join!(server_task, probe);
    assert!(matches!(
        result,
        Err(AuthError::Protocol(ProtocolViolation::OversizedFrame(_)))
    ));
}

#[tokio::test]
async fn a_stalling_client_hits_the_deadline() {
    let (near, far) = duplex(1 << 16);

    let mut server = server_with(catalog(vec![alice()]));
    server.set_handshake_timeout(Duration::from_millis(100));

    let server_task = async {
        let mut channel = FramedChannel::new(near);
        server.authenticate(&mut channel).await
    };

    let staller = async {
        let mut channel = FramedChannel::new(far);
        let ephemeral = KeyPair::generate();
        channel
            .send(
                &proto::ClientHello {
                    version: PROTOCOL_VERSION,
                    methods: proto::METHOD_SRP,
                    ecdh_public: ephemeral.public_key().to_vec(),
                }
                .encode_to_vec(),
            )
            .await
            .unwrap();
        let _server_hello = channel.recv().await.unwrap();

        // Never send Identify.
        tokio::time::sleep(Duration::from_millis(400)).await;
    };

    let (result, ()) = tokio::join!(server_task, staller);
    assert!(matches!(result, Err(AuthError::Timeout)));
}

#[tokio::test]
async fn garbage_frames_classify_cleanly_in_every_state() {
    // First frame garbage: undecodable hellos of various shapes.
    for garbage in [
        vec![0xff],
        vec![0xff; 64],
        vec![0x00, 0x00, 0x00],
        vec![0x08, 0x01, 0x12], // valid field then truncated field header
    ] {
        let (near, far) = duplex(1 << 16);
        let server = server_with(catalog(vec![alice()]));

        let server_task = async {
            let mut channel = FramedChannel::new(near);
            let result = server.authenticate(&mut channel).await;
            drop(channel);
            result
        };
        let probe = async {
            let mut channel = FramedChannel::new(far);
            channel.send(&garbage).await.unwrap();
            let _ = channel.recv().await;
        };

        let (result, ()) = tokio::join!(server_task, probe);
        assert!(
            matches!(result, Err(AuthError::Protocol(_))),
            "garbage hello must be a protocol error"
        );
    }

    // Garbage where Identify belongs. A random byte string can decode as a
    // protobuf carrying some unusable name, so either protocol error or
    // denial is acceptable; success or panic is not.
    let (near, far) = duplex(1 << 16);
    let server = server_with(catalog(vec![alice()]));

    let server_task = async {
        let mut channel = FramedChannel::new(near);
        let result = server.authenticate(&mut channel).await;
        drop(channel);
        result
    };
    let probe = async {
        let mut channel = FramedChannel::new(far);
        let ephemeral = KeyPair::generate();
        channel
            .send(
                &proto::ClientHello {
                    version: PROTOCOL_VERSION,
                    methods: proto::METHOD_SRP,
                    ecdh_public: ephemeral.public_key().to_vec(),
                }
                .encode_to_vec(),
            )
            .await
            .unwrap();
        let _server_hello = channel.recv().await.unwrap();
        channel.send(&[0xde, 0xad, 0xbe, 0xef, 0x99]).await.unwrap();
        let _ = channel.recv().await;
    };

    let (result, ()) = tokio::join!(server_task, probe);
    assert!(result.is_err());
}

/// Drives the wire up to ServerKeyExchange for `name` and returns the reply.
async fn probe_key_exchange(name: &str) -> proto::ServerKeyExchange {
    let mut server = server_with(catalog(vec![alice()]));
    // A fixed private key makes decoy records deterministic across probes.
    server.set_private_key(&[42_u8; 32]).unwrap();

    let (near, far) = duplex(1 << 16);
    let server_task = async {
        let mut channel = FramedChannel::new(near);
        let _ = server.authenticate(&mut channel).await;
    };

    let probe = async {
        let mut channel = FramedChannel::new(far);
        let ephemeral = KeyPair::generate();
        channel
            .send(
                &proto::ClientHello {
                    version: PROTOCOL_VERSION,
                    methods: proto::METHOD_SRP,
                    ecdh_public: ephemeral.public_key().to_vec(),
                }
                .encode_to_vec(),
            )
            .await
            .unwrap();
        let _server_hello = channel.recv().await.unwrap();

        channel
            .send(
                &proto::Identify {
                    username: name.to_owned(),
                }
                .encode_to_vec(),
            )
            .await
            .unwrap();

        let reply = channel.recv().await.unwrap();
        proto::ServerKeyExchange::decode(reply.as_slice()).unwrap()
    };

    let ((), exchange) = tokio::join!(server_task, probe);
    exchange
}

#[tokio::test]
async fn key_exchange_replies_are_shaped_alike_for_real_and_unknown_users() {
    let real = probe_key_exchange("alice").await;
    let unknown = probe_key_exchange("eve").await;

    assert_eq!(real.n_group, unknown.n_group);
    assert_eq!(real.salt.len(), unknown.salt.len());
    assert_eq!(real.server_public.len(), unknown.server_public.len());
    assert_eq!(real.iv.len(), unknown.iv.len());

    // Probing the same unknown name again yields the same salt, like a
    // stored record would.
    let again = probe_key_exchange("eve").await;
    assert_eq!(unknown.salt, again.salt);
    // The ephemeral side of the reply still changes per connection.
    assert_ne!(unknown.server_public, again.server_public);
}
