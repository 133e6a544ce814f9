//! The SRP6a computations for both sides of the handshake.
//!
//! Function-per-value, in protocol order. `H` is SHA-256 throughout and every
//! hashed number is padded to the byte width of the group prime, so both
//! sides hash identical byte strings regardless of leading zeros.
//!
//! Secret inputs and outputs (`x`, the private exponents, the premaster `S`)
//! travel as [`SecretInteger`] so the bytes a caller holds between protocol
//! steps are zeroized on drop; the bignum backend is only entered transiently
//! inside each function.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::bigint::{Integer, SecretInteger};
use crate::key::SrpKey;
use crate::primes::SrpGroup;
use crate::user::SALT_LENGTH;
use crate::username::Username;

type HmacSha256 = Hmac<Sha256>;

/// `x = H(salt || H(name || ":" || password))`.
///
/// The name is hashed in its case-folded form so that any spelling a client
/// identifies with produces the verifier stored for the record.
pub(crate) fn calculate_x(username: &Username, password: &str, salt: &[u8]) -> SecretInteger {
    let identity = Sha256::new()
        .chain_update(username.key())
        .chain_update(":")
        .chain_update(password)
        .finalize();

    let x = Sha256::new()
        .chain_update(salt)
        .chain_update(identity)
        .finalize();

    SecretInteger::from_bytes_be(&x)
}

/// `v = g^x mod N`.
pub(crate) fn calculate_verifier(group: SrpGroup, x: &SecretInteger) -> Integer {
    group.generator_int().modpow(&x.expose(), &group.prime())
}

/// `B = (k*v + g^b) mod N`.
pub(crate) fn calculate_server_public_key(
    group: SrpGroup,
    v: &Integer,
    b: &SecretInteger,
) -> Integer {
    let n = group.prime();
    let term = (group.multiplier() * v.mod_reduce(&n)).mod_reduce(&n);

    (term + group.generator_int().modpow(&b.expose(), &n)) % n
}

/// `A = g^a mod N`.
pub(crate) fn calculate_client_public_key(group: SrpGroup, a: &SecretInteger) -> Integer {
    group.generator_int().modpow(&a.expose(), &group.prime())
}

/// `u = H(PAD(A) || PAD(B))`.
pub(crate) fn calculate_u(
    group: SrpGroup,
    client_public: &Integer,
    server_public: &Integer,
) -> Integer {
    let width = group.byte_width();
    let u = Sha256::new()
        .chain_update(client_public.to_padded_bytes_be(width))
        .chain_update(server_public.to_padded_bytes_be(width))
        .finalize();

    Integer::from_bytes_be(&u)
}

/// Server-side premaster secret `S = (A * v^u)^b mod N`.
pub(crate) fn calculate_server_premaster(
    group: SrpGroup,
    client_public: &Integer,
    v: &Integer,
    u: &Integer,
    b: &SecretInteger,
) -> SecretInteger {
    let n = group.prime();
    let base = (client_public.mod_reduce(&n) * v.modpow(u, &n)) % group.prime();

    SecretInteger::new(base.modpow(&b.expose(), &n), group.byte_width())
}

/// Client-side premaster secret `S = (B - k*g^x)^(a + u*x) mod N`.
pub(crate) fn calculate_client_premaster(
    group: SrpGroup,
    server_public: &Integer,
    x: &SecretInteger,
    a: &SecretInteger,
    u: &Integer,
) -> SecretInteger {
    let n = group.prime();

    // Lift the subtraction out of the ring so it cannot underflow.
    let gx = (group.multiplier() * group.generator_int().modpow(&x.expose(), &n)).mod_reduce(&n);
    let base = (server_public.mod_reduce(&n) + (group.prime() - gx)) % group.prime();

    let exponent = a.expose() + u.clone() * x.expose();

    SecretInteger::new(base.modpow(&exponent, &n), group.byte_width())
}

/// `K = H(PAD(S))`, the shared session key both sides feed into the KDF.
///
/// The premaster is already stored at the group's padded width, so its bytes
/// are hashed as they sit.
pub(crate) fn calculate_session_key(premaster: &SecretInteger) -> SrpKey {
    let digest = Sha256::new().chain_update(premaster.as_bytes()).finalize();

    SrpKey::from_bytes(digest.into())
}

/// Deterministic stand-in record for a name that has no usable user.
///
/// Salt and verifier are derived from a keyed hash of the folded name, so a
/// probing client sees a stable, plausible key-exchange reply for any name it
/// tries; nothing distinguishes an unknown user, a disabled user or a real
/// one at this step. The produced verifier corresponds to no password.
pub(crate) fn synthesize_decoy(
    secret: &[u8],
    name_key: &str,
    group: SrpGroup,
) -> (Vec<u8>, Integer) {
    let mut salt_mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    salt_mac.update(b"decoy salt");
    salt_mac.update(name_key.as_bytes());
    let salt = salt_mac.finalize().into_bytes();
    debug_assert_eq!(salt.len(), SALT_LENGTH);

    let mut x_mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    x_mac.update(b"decoy verifier");
    x_mac.update(name_key.as_bytes());
    let x = SecretInteger::from_bytes_be(&x_mac.finalize().into_bytes());

    (salt.to_vec(), calculate_verifier(group, &x))
}

#[cfg(test)]
mod test {
    use crate::bigint::SecretInteger;
    use crate::primes::SrpGroup;
    use crate::srp::{
        calculate_client_premaster, calculate_client_public_key, calculate_server_premaster,
        calculate_server_public_key, calculate_session_key, calculate_u, calculate_verifier,
        calculate_x, synthesize_decoy,
    };
    use crate::username::Username;
    use rand::{thread_rng, RngCore};

    // x is a SHA-256 output, so 32-byte private exponents exercise the same
    // arithmetic as production values while keeping the tests fast.
    fn random_exponent() -> SecretInteger {
        let mut bytes = [0_u8; 32];
        thread_rng().fill_bytes(&mut bytes);
        SecretInteger::from_bytes_be(&bytes)
    }

    fn random_salt() -> [u8; 32] {
        let mut salt = [0_u8; 32];
        thread_rng().fill_bytes(&mut salt);
        salt
    }

    #[test]
    fn both_sides_agree_on_the_premaster() {
        for group in [SrpGroup::Bits1024, SrpGroup::Bits3072] {
            let username = Username::new("alice").unwrap();
            let salt = random_salt();

            let x = calculate_x(&username, "Correct_Horse9", &salt);
            let v = calculate_verifier(group, &x);

            let b = random_exponent();
            let server_public = calculate_server_public_key(group, &v, &b);

            let a = random_exponent();
            let client_public = calculate_client_public_key(group, &a);

            let u = calculate_u(group, &client_public, &server_public);

            let server_s = calculate_server_premaster(group, &client_public, &v, &u, &b);
            let client_s = calculate_client_premaster(group, &server_public, &x, &a, &u);

            assert_eq!(server_s.as_bytes(), client_s.as_bytes());

            let server_key = calculate_session_key(&server_s);
            let client_key = calculate_session_key(&client_s);
            assert_eq!(server_key.as_bytes(), client_key.as_bytes());
        }
    }

    #[test]
    fn username_case_does_not_change_x() {
        let salt = random_salt();
        let lower = calculate_x(&Username::new("alice").unwrap(), "pw", &salt);
        let upper = calculate_x(&Username::new("ALICE").unwrap(), "pw", &salt);
        assert_eq!(lower.as_bytes(), upper.as_bytes());
    }

    #[test]
    fn password_changes_x() {
        let salt = random_salt();
        let username = Username::new("alice").unwrap();
        let one = calculate_x(&username, "one", &salt);
        let two = calculate_x(&username, "two", &salt);
        assert_ne!(one.as_bytes(), two.as_bytes());
    }

    #[test]
    fn a_client_without_the_password_never_reaches_the_key() {
        // The verifier belongs to the real password; each trial runs the
        // exchange with a random secret in place of the real x.
        let group = SrpGroup::Bits1024;
        let username = Username::new("alice").unwrap();
        let salt = random_salt();

        let real_x = calculate_x(&username, "Correct_Horse9", &salt);
        let v = calculate_verifier(group, &real_x);

        for _ in 0..1000 {
            let b = random_exponent();
            let server_public = calculate_server_public_key(group, &v, &b);

            let a = random_exponent();
            let client_public = calculate_client_public_key(group, &a);
            let u = calculate_u(group, &client_public, &server_public);

            let wrong_x = random_exponent();
            let server_s = calculate_server_premaster(group, &client_public, &v, &u, &b);
            let client_s = calculate_client_premaster(group, &server_public, &wrong_x, &a, &u);

            assert_ne!(
                calculate_session_key(&server_s).as_bytes(),
                calculate_session_key(&client_s).as_bytes(),
            );
        }
    }

    #[test]
    fn decoys_are_deterministic_per_name_and_secret() {
        let group = SrpGroup::default();
        let secret = [7_u8; 32];

        let (salt_a, v_a) = synthesize_decoy(&secret, "eve", group);
        let (salt_b, v_b) = synthesize_decoy(&secret, "eve", group);
        assert_eq!(salt_a, salt_b);
        assert_eq!(v_a.to_bytes_be(), v_b.to_bytes_be());

        let (salt_c, v_c) = synthesize_decoy(&secret, "mallory", group);
        assert_ne!(salt_a, salt_c);
        assert_ne!(v_a.to_bytes_be(), v_c.to_bytes_be());

        let (salt_d, v_d) = synthesize_decoy(&[8_u8; 32], "eve", group);
        assert_ne!(salt_a, salt_d);
        assert_ne!(v_a.to_bytes_be(), v_d.to_bytes_be());
    }

    #[test]
    fn decoys_have_the_shape_of_real_records() {
        let group = SrpGroup::default();
        let (salt, v) = synthesize_decoy(&[1_u8; 32], "eve", group);

        assert_eq!(salt.len(), crate::user::SALT_LENGTH);
        assert_eq!(
            v.to_padded_bytes_be(group.byte_width()).len(),
            group.byte_width()
        );
        assert!(!v.is_zero());
    }
}
