use hex_literal::hex;
use sha2::{Digest, Sha256};

use crate::bigint::Integer;

/// The SRP prime groups a user record can reference.
///
/// The 1024-bit group is the Oakley group 2 modulus, the larger three are the
/// MODP groups of RFC 3526, with the generators RFC 5054 assigns to them.
/// All four are safe primes. User records pin the group their verifier was
/// computed against; [`SrpGroup::default`] is what new records get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SrpGroup {
    /// 1024-bit modulus, `g = 2`. Kept for legacy records only.
    Bits1024,
    /// 2048-bit modulus, `g = 2`.
    Bits2048,
    /// 3072-bit modulus, `g = 5`. The default for new records.
    Bits3072,
    /// 4096-bit modulus, `g = 5`.
    Bits4096,
}

const GROUP_1024_PRIME: [u8; 128] = hex!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74"
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437"
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED"
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381FFFFFFFFFFFFFFFF"
);

const GROUP_2048_PRIME: [u8; 256] = hex!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74"
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437"
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED"
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05"
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB"
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B"
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718"
    "3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF"
);

const GROUP_3072_PRIME: [u8; 384] = hex!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74"
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437"
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED"
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05"
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB"
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B"
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718"
    "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33"
    "A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7"
    "ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864"
    "D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2"
    "08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF"
);

const GROUP_4096_PRIME: [u8; 512] = hex!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74"
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437"
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED"
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05"
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB"
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B"
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718"
    "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33"
    "A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7"
    "ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864"
    "D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2"
    "08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A92108011A723C12A787E6D7"
    "88719A10BDBA5B2699C327186AF4E23C1A946834B6150BDA2583E9CA2AD44CE8"
    "DBBBC2DB04DE8EF92E8EFC141FBECAA6287C59474E6BC05D99B2964FA090C3A2"
    "233BA186515BE7ED1F612970CEE2D7AFB81BDD762170481CD0069127D5B05AA9"
    "93B4EA988D8FDDC186FFB7DC90A6C08F4DF435C934063199FFFFFFFFFFFFFFFF"
);

impl SrpGroup {
    /// Byte width of the modulus. Every padded value of the group (`PAD`)
    /// has exactly this many bytes.
    pub const fn byte_width(self) -> usize {
        match self {
            SrpGroup::Bits1024 => 128,
            SrpGroup::Bits2048 => 256,
            SrpGroup::Bits3072 => 384,
            SrpGroup::Bits4096 => 512,
        }
    }

    /// The generator `g`.
    pub const fn generator(self) -> u8 {
        match self {
            SrpGroup::Bits1024 | SrpGroup::Bits2048 => 2,
            SrpGroup::Bits3072 | SrpGroup::Bits4096 => 5,
        }
    }

    /// The modulus `N` as big-endian bytes.
    pub const fn prime_bytes(self) -> &'static [u8] {
        match self {
            SrpGroup::Bits1024 => &GROUP_1024_PRIME,
            SrpGroup::Bits2048 => &GROUP_2048_PRIME,
            SrpGroup::Bits3072 => &GROUP_3072_PRIME,
            SrpGroup::Bits4096 => &GROUP_4096_PRIME,
        }
    }

    /// The bit size doubles as the wire identifier of the group.
    pub const fn wire_id(self) -> u32 {
        match self {
            SrpGroup::Bits1024 => 1024,
            SrpGroup::Bits2048 => 2048,
            SrpGroup::Bits3072 => 3072,
            SrpGroup::Bits4096 => 4096,
        }
    }

    /// The group a wire identifier names, if any.
    pub const fn from_wire_id(id: u32) -> Option<Self> {
        match id {
            1024 => Some(SrpGroup::Bits1024),
            2048 => Some(SrpGroup::Bits2048),
            3072 => Some(SrpGroup::Bits3072),
            4096 => Some(SrpGroup::Bits4096),
            _ => None,
        }
    }

    pub(crate) fn prime(self) -> Integer {
        Integer::from_bytes_be(self.prime_bytes())
    }

    pub(crate) fn generator_int(self) -> Integer {
        Integer::from(self.generator())
    }

    /// The SRP6a multiplier `k = H(N || PAD(g))`.
    pub(crate) fn multiplier(self) -> Integer {
        let digest = Sha256::new()
            .chain_update(self.prime_bytes())
            .chain_update(self.generator_int().to_padded_bytes_be(self.byte_width()))
            .finalize();

        Integer::from_bytes_be(&digest)
    }
}

impl Default for SrpGroup {
    fn default() -> Self {
        SrpGroup::Bits3072
    }
}

#[cfg(test)]
mod test {
    use crate::bigint::Integer;
    use crate::primes::SrpGroup;

    const ALL: [SrpGroup; 4] = [
        SrpGroup::Bits1024,
        SrpGroup::Bits2048,
        SrpGroup::Bits3072,
        SrpGroup::Bits4096,
    ];

    #[test]
    fn prime_widths_match_declared_widths() {
        for group in ALL {
            assert_eq!(group.prime_bytes().len(), group.byte_width());
            // No leading zero bytes, the modulus fills its full width.
            assert_eq!(
                group.prime().to_bytes_be().len(),
                group.byte_width(),
                "{:?}",
                group
            );
        }
    }

    #[test]
    fn wire_ids_round_trip() {
        for group in ALL {
            assert_eq!(SrpGroup::from_wire_id(group.wire_id()), Some(group));
        }
        assert_eq!(SrpGroup::from_wire_id(0), None);
        assert_eq!(SrpGroup::from_wire_id(1536), None);
    }

    #[test]
    fn multiplier_is_nonzero_and_group_specific() {
        let mut seen = Vec::new();
        for group in ALL {
            let k = group.multiplier();
            assert!(!k.is_zero());
            let bytes = k.to_bytes_be();
            assert!(!seen.contains(&bytes), "k collides between groups");
            seen.push(bytes);
        }
    }

    #[test]
    fn generator_is_not_a_residue_of_the_prime() {
        for group in ALL {
            let g = group.generator_int();
            assert!(!g.mod_is_zero(&group.prime()));
        }
    }

    #[test]
    fn moduli_begin_and_end_saturated() {
        // Every MODP modulus starts and ends with a full 64-bit run of
        // ones; a transcription slip would almost surely break this.
        for group in [SrpGroup::Bits2048, SrpGroup::Bits3072, SrpGroup::Bits4096] {
            let bytes = group.prime_bytes();
            assert_eq!(hex::encode(&bytes[..8]), "ffffffffffffffff");
            assert_eq!(hex::encode(&bytes[bytes.len() - 8..]), "ffffffffffffffff");
        }
    }

    #[test]
    fn shared_prefix_of_the_modp_chain() {
        // The 2048/3072/4096 moduli share their leading 64 bytes.
        let base = &SrpGroup::Bits2048.prime_bytes()[..64];
        assert_eq!(&SrpGroup::Bits3072.prime_bytes()[..64], base);
        assert_eq!(&SrpGroup::Bits4096.prime_bytes()[..64], base);
    }

    #[test]
    fn default_group_is_3072() {
        assert_eq!(SrpGroup::default(), SrpGroup::Bits3072);
        let width = SrpGroup::default().byte_width();
        assert_eq!(width, 384);
        let padded = Integer::from(1_u8).to_padded_bytes_be(width);
        assert_eq!(padded.len(), width);
    }
}
