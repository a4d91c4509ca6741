//! Content hashing for stored artifact blobs.

use std::io::{ErrorKind, Read};

use sha2::{Digest, Sha256};

use consignvault_common::{ContentHash, Result};

const READ_BUFFER: usize = 64 * 1024;

/// SHA-256 over everything `reader` yields.
pub fn content_hash<R: Read>(mut reader: R) -> Result<ContentHash> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(ContentHash::from_bytes(hasher.finalize().into()))
}

/// SHA-256 of an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    ContentHash::from_bytes(Sha256::digest(data).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            hash_bytes(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_reader_matches_buffer() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 13) as u8).collect();
        assert_eq!(content_hash(&data[..]).unwrap(), hash_bytes(&data));
    }

    #[test]
    fn test_single_bit_changes_hash() {
        let mut data = vec![0u8; 1000];
        let before = hash_bytes(&data);
        data[999] ^= 1;
        assert_ne!(before, hash_bytes(&data));
    }
}
