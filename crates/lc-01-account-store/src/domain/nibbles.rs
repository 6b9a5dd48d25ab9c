use super::errors::TrieError;
use shared_types::Address;

/// Half-byte path used to walk the trie. A 20-byte address is 40 nibbles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Nibbles(pub Vec<u8>);

impl Nibbles {
    pub fn from_address(addr: &Address) -> Self {
        Self::from_bytes(addr)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Nibbles(bytes.iter().flat_map(|b| [b >> 4, b & 0x0F]).collect())
    }

    /// Concatenate `prefix` and `rest` into a new path.
    pub fn join(prefix: &[u8], rest: &[u8]) -> Self {
        let mut path = Vec::with_capacity(prefix.len() + rest.len());
        path.extend_from_slice(prefix);
        path.extend_from_slice(rest);
        Nibbles(path)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex-prefix encoding (Yellow Paper appendix C). The high nibble of the
    /// first byte carries the flags: bit 1 = leaf, bit 0 = odd length.
    pub fn encode_hex_prefix(&self, is_leaf: bool) -> Vec<u8> {
        let odd = self.len() % 2 == 1;
        let flags = (u8::from(is_leaf) << 1) | u8::from(odd);

        let mut out = Vec::with_capacity(self.len() / 2 + 1);
        let rest = if odd {
            out.push((flags << 4) | self.0[0]);
            &self.0[1..]
        } else {
            out.push(flags << 4);
            &self.0[..]
        };
        out.extend(rest.chunks(2).map(|pair| (pair[0] << 4) | pair[1]));
        out
    }

    /// Inverse of [`Nibbles::encode_hex_prefix`]; returns the path and leaf flag.
    pub fn decode_hex_prefix(encoded: &[u8]) -> Result<(Self, bool), TrieError> {
        let Some((&first, rest)) = encoded.split_first() else {
            return Err(TrieError::CorruptNode("empty hex-prefix path".into()));
        };
        let flags = first >> 4;
        if flags > 3 {
            return Err(TrieError::CorruptNode(format!("bad hex-prefix flags {flags}")));
        }
        let odd = flags & 1 == 1;
        if !odd && first & 0x0F != 0 {
            return Err(TrieError::CorruptNode("non-zero padding nibble".into()));
        }

        let mut nibbles = Vec::with_capacity(rest.len() * 2 + 1);
        if odd {
            nibbles.push(first & 0x0F);
        }
        nibbles.extend(rest.iter().flat_map(|b| [b >> 4, b & 0x0F]));
        Ok((Nibbles(nibbles), flags & 2 == 2))
    }
}

/// Length of the shared prefix of two nibble paths.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibbles_from_address() {
        let mut addr = [0u8; 20];
        addr[0] = 0xAB;
        addr[19] = 0xFF;
        let nibbles = Nibbles::from_address(&addr);
        assert_eq!(nibbles.len(), 40);
        assert_eq!(&nibbles.0[..2], &[0x0A, 0x0B]);
        assert_eq!(&nibbles.0[38..], &[0x0F, 0x0F]);
    }

    #[test]
    fn test_hex_prefix_vectors() {
        // Yellow Paper examples
        assert_eq!(Nibbles(vec![1, 2, 3, 4, 5]).encode_hex_prefix(false), vec![0x11, 0x23, 0x45]);
        assert_eq!(Nibbles(vec![0, 1, 2, 3, 4, 5]).encode_hex_prefix(false), vec![0x00, 0x01, 0x23, 0x45]);
        assert_eq!(Nibbles(vec![0x0f, 1, 0x0c, 0x0b, 8]).encode_hex_prefix(true), vec![0x3f, 0x1c, 0xb8]);
        assert_eq!(Nibbles(vec![]).encode_hex_prefix(true), vec![0x20]);
    }

    #[test]
    fn test_hex_prefix_decode_inverts_encode() {
        for (path, leaf) in [(vec![1, 2, 3], true), (vec![4, 5], false), (vec![], true)] {
            let encoded = Nibbles(path.clone()).encode_hex_prefix(leaf);
            let (decoded, is_leaf) = Nibbles::decode_hex_prefix(&encoded).unwrap();
            assert_eq!(decoded.0, path);
            assert_eq!(is_leaf, leaf);
        }
    }

    #[test]
    fn test_hex_prefix_rejects_garbage() {
        assert!(Nibbles::decode_hex_prefix(&[]).is_err());
        assert!(Nibbles::decode_hex_prefix(&[0x40]).is_err());
        assert!(Nibbles::decode_hex_prefix(&[0x05]).is_err());
    }

    #[test]
    fn test_common_prefix_len() {
        assert_eq!(common_prefix_len(&[1, 2, 3], &[1, 2, 4]), 2);
        assert_eq!(common_prefix_len(&[], &[1]), 0);
    }
}
