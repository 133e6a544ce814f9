use num_bigint::{BigInt, Sign};
use rand::{thread_rng, RngCore};
use std::ops;
use zeroize::Zeroizing;

/// Thin wrapper around the bignum backend so the rest of the crate only sees
/// the handful of operations the handshake actually needs.
///
/// Holds public protocol values (`N`, `g`, `A`, `B`, `u`, verifiers) and the
/// transients of a computation. Secrets that outlive a single computation
/// (`b`, `x`, premaster secrets) live in [`SecretInteger`] instead, because
/// `BigInt` gives no way to scrub its heap digits on drop. `num-bigint` also
/// does not offer constant-time arithmetic; the state machine compensates by
/// performing the same sequence of operations on the decoy path as on the
/// real path.
#[derive(Clone)]
pub(crate) struct Integer {
    value: BigInt,
}

/// A secret value held as fixed-width big-endian bytes, zeroized on drop.
///
/// Carries the SRP private exponents and premaster secrets for as long as
/// the handshake needs them. Arithmetic goes through [`SecretInteger::expose`],
/// which hands out a transient [`Integer`]; keep that view to a single
/// expression so the unscrubbed copy dies inside the computation.
pub(crate) struct SecretInteger {
    bytes: Zeroizing<Vec<u8>>,
}

impl SecretInteger {
    /// Captures an already-computed value at `width` bytes, zero-padded the
    /// way `PAD` pads.
    pub fn new(value: Integer, width: usize) -> Self {
        Self {
            bytes: Zeroizing::new(value.to_padded_bytes_be(width)),
        }
    }

    /// Wraps raw big-endian bytes, typically a hash output.
    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        Self {
            bytes: Zeroizing::new(bytes.to_vec()),
        }
    }

    /// Uniformly sampled value in `[1, bound - 1]`, stored at the bound's
    /// byte width.
    pub fn random_below(bound: &Integer) -> Self {
        let width = bound.to_bytes_be().len();
        Self::new(Integer::random_below(bound), width)
    }

    /// Transient bignum view for one computation.
    pub fn expose(&self) -> Integer {
        Integer::from_bytes_be(&self.bytes)
    }

    /// The padded big-endian representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Integer {
    const fn from_bigint(value: BigInt) -> Self {
        Self { value }
    }

    pub fn from_bytes_be(v: &[u8]) -> Self {
        Self::from_bigint(BigInt::from_bytes_be(Sign::Plus, v))
    }

    /// Minimal big-endian representation, no leading zeros.
    pub fn to_bytes_be(&self) -> Vec<u8> {
        self.value.to_bytes_be().1
    }

    /// Big-endian representation zero-padded on the left to `width` bytes.
    ///
    /// This is the `PAD` operation of the protocol: every number that is
    /// hashed or sent over the wire uses the byte width of the group prime.
    pub fn to_padded_bytes_be(&self, width: usize) -> Vec<u8> {
        let value = self.value.to_bytes_be().1;
        debug_assert!(value.len() <= width, "value wider than its group prime");

        let mut padded = vec![0_u8; width];
        let offset = width.saturating_sub(value.len());
        padded[offset..].copy_from_slice(&value[value.len().saturating_sub(width)..]);
        padded
    }

    pub fn is_zero(&self) -> bool {
        self.value.sign() == Sign::NoSign
    }

    pub fn mod_is_zero(&self, modulus: &Self) -> bool {
        (&self.value % &modulus.value).sign() == Sign::NoSign
    }

    pub fn modpow(&self, exponent: &Self, modulus: &Self) -> Self {
        Self::from_bigint(self.value.modpow(&exponent.value, &modulus.value))
    }

    pub fn mod_reduce(&self, modulus: &Self) -> Self {
        Self::from_bigint(&self.value % &modulus.value)
    }

    /// Uniformly sampled value in `[1, bound - 1]`.
    ///
    /// Samples the full byte width of the bound and reduces, retrying on the
    /// (astronomically unlikely) zero result so the private exponent is never
    /// degenerate.
    pub fn random_below(bound: &Self) -> Self {
        let width = bound.value.to_bytes_be().1.len();
        let mut bytes = vec![0_u8; width];

        loop {
            thread_rng().fill_bytes(&mut bytes);
            let candidate = Self::from_bytes_be(&bytes).mod_reduce(bound);
            if !candidate.is_zero() {
                return candidate;
            }
        }
    }
}

impl From<u8> for Integer {
    fn from(v: u8) -> Self {
        Self::from_bigint(BigInt::from(v))
    }
}

impl ops::Mul<Integer> for Integer {
    type Output = Self;

    fn mul(self, rhs: Integer) -> Self::Output {
        Self::from_bigint(self.value * rhs.value)
    }
}

impl ops::Add<Integer> for Integer {
    type Output = Self;

    fn add(self, rhs: Integer) -> Self::Output {
        Self::from_bigint(self.value + rhs.value)
    }
}

impl ops::Sub<Integer> for Integer {
    type Output = Self;

    fn sub(self, rhs: Integer) -> Self::Output {
        Self::from_bigint(self.value - rhs.value)
    }
}

impl ops::Rem<Integer> for Integer {
    type Output = Self;

    fn rem(self, rhs: Integer) -> Self::Output {
        Self::from_bigint(self.value % rhs.value)
    }
}
