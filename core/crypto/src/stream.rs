//! Streaming AES-256-GCM for artifact blobs.
//!
//! Plaintext is processed in fixed-size chunks so memory use stays bounded
//! regardless of file size. A single GCM tag covers the whole stream.
//!
//! # Format
//! ```text
//! [16 ASCII decimal digits: plaintext length][12 bytes nonce][16 bytes tag][ciphertext]
//! ```
//! The ciphertext is exactly as long as the plaintext. Because the length and
//! tag are only known once the stream is exhausted, the encryptor writes a
//! placeholder header and backfills it by seeking back.
//!
//! The output is byte-identical to one-shot AES-256-GCM with empty associated
//! data.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::Aes256;
use ghash::universal_hash::UniversalHash;
use ghash::GHash;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroize;

use crate::keys::ContentKey;
use consignvault_common::{Error, Result};

type Aes256Ctr = ctr::Ctr32BE<Aes256>;

/// Default chunk size for streaming encryption (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Width of the ASCII decimal length field.
pub const LENGTH_FIELD_SIZE: usize = 16;

/// GCM nonce size (96 bits).
pub const NONCE_SIZE: usize = 12;

/// GCM tag size (128 bits).
pub const TAG_SIZE: usize = 16;

/// Total header size preceding the ciphertext.
pub const HEADER_SIZE: usize = LENGTH_FIELD_SIZE + NONCE_SIZE + TAG_SIZE;

/// Largest plaintext a single GCM nonce may cover (2^36 - 32 bytes).
pub const MAX_PLAINTEXT_LEN: u64 = (1 << 36) - 32;

const BLOCK_SIZE: usize = 16;

/// Header of an encrypted artifact blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactHeader {
    /// Plaintext length, which is also the ciphertext length.
    pub plaintext_len: u64,
    /// Per-artifact random nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// GCM authentication tag over the whole ciphertext.
    pub tag: [u8; TAG_SIZE],
}

impl ArtifactHeader {
    /// Encode the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let digits = format!("{:0width$}", self.plaintext_len, width = LENGTH_FIELD_SIZE);
        out[..LENGTH_FIELD_SIZE].copy_from_slice(&digits.as_bytes()[..LENGTH_FIELD_SIZE]);
        out[LENGTH_FIELD_SIZE..LENGTH_FIELD_SIZE + NONCE_SIZE].copy_from_slice(&self.nonce);
        out[LENGTH_FIELD_SIZE + NONCE_SIZE..].copy_from_slice(&self.tag);
        out
    }

    /// Decode a header.
    ///
    /// # Errors
    /// - `InvalidInput` if the length field is not 16 ASCII digits
    /// - `InvalidInput` if the declared length exceeds [`MAX_PLAINTEXT_LEN`]
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let digits = &bytes[..LENGTH_FIELD_SIZE];
        if !digits.iter().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidInput(
                "Malformed artifact header: length field is not decimal".to_string(),
            ));
        }
        let plaintext_len: u64 = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::InvalidInput("Malformed artifact header".to_string()))?;
        if plaintext_len > MAX_PLAINTEXT_LEN {
            return Err(Error::InvalidInput(format!(
                "Declared length {} exceeds maximum {}",
                plaintext_len, MAX_PLAINTEXT_LEN
            )));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[LENGTH_FIELD_SIZE..LENGTH_FIELD_SIZE + NONCE_SIZE]);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&bytes[LENGTH_FIELD_SIZE + NONCE_SIZE..]);

        Ok(Self {
            plaintext_len,
            nonce,
            tag,
        })
    }

    /// Read and decode a header from the current reader position.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                Error::InvalidInput("Artifact header truncated".to_string())
            }
            _ => Error::Io(e),
        })?;
        Self::parse(&bytes)
    }

    /// Size of the complete blob this header describes.
    pub fn blob_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.plaintext_len
    }
}

/// Incremental GCM state: CTR keystream plus a running GHASH over the
/// ciphertext.
struct GcmState {
    keystream: Aes256Ctr,
    ghash: GHash,
    tag_mask: [u8; TAG_SIZE],
    pending: [u8; BLOCK_SIZE],
    pending_len: usize,
    processed: u64,
}

impl GcmState {
    fn new(key: &ContentKey, nonce: &[u8; NONCE_SIZE]) -> Self {
        let cipher = Aes256::new(GenericArray::from_slice(key.as_bytes()));

        let mut hash_key = GenericArray::clone_from_slice(&[0u8; BLOCK_SIZE]);
        cipher.encrypt_block(&mut hash_key);

        // J0 = nonce || 0^31 || 1 for 96-bit nonces.
        let mut counter = [0u8; BLOCK_SIZE];
        counter[..NONCE_SIZE].copy_from_slice(nonce);
        counter[BLOCK_SIZE - 1] = 1;

        let mut mask = GenericArray::clone_from_slice(&counter);
        cipher.encrypt_block(&mut mask);
        let mut tag_mask = [0u8; TAG_SIZE];
        tag_mask.copy_from_slice(&mask);

        // Payload keystream starts at inc32(J0).
        counter[BLOCK_SIZE - 1] = 2;
        let keystream = Aes256Ctr::new(
            GenericArray::from_slice(key.as_bytes()),
            GenericArray::from_slice(&counter),
        );

        let ghash = GHash::new(&hash_key);
        hash_key.zeroize();

        Self {
            keystream,
            ghash,
            tag_mask,
            pending: [0u8; BLOCK_SIZE],
            pending_len: 0,
            processed: 0,
        }
    }

    fn apply_keystream(&mut self, buf: &mut [u8]) {
        self.keystream.apply_keystream(buf);
    }

    /// Feed ciphertext of any length into GHASH.
    fn absorb(&mut self, mut data: &[u8]) {
        self.processed += data.len() as u64;

        if self.pending_len > 0 {
            let take = (BLOCK_SIZE - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];
            if self.pending_len < BLOCK_SIZE {
                return;
            }
            self.ghash.update(&[GenericArray::clone_from_slice(&self.pending)]);
            self.pending_len = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_SIZE);
        for block in &mut blocks {
            self.ghash.update(&[GenericArray::clone_from_slice(block)]);
        }
        let rest = blocks.remainder();
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
    }

    fn finish(mut self) -> [u8; TAG_SIZE] {
        if self.pending_len > 0 {
            self.ghash.update_padded(&self.pending[..self.pending_len]);
        }

        // Length block: 64-bit AAD bit length (always zero) || 64-bit ciphertext bit length.
        let mut lengths = [0u8; BLOCK_SIZE];
        lengths[8..].copy_from_slice(&(self.processed * 8).to_be_bytes());
        self.ghash.update(&[GenericArray::clone_from_slice(&lengths)]);

        let digest = self.ghash.finalize();
        let mut tag = [0u8; TAG_SIZE];
        for (out, (d, m)) in tag.iter_mut().zip(digest.iter().zip(self.tag_mask.iter())) {
            *out = d ^ m;
        }
        tag
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Encrypting stream that processes data in chunks.
pub struct EncryptingStream<'a> {
    key: &'a ContentKey,
    chunk_size: usize,
}

impl<'a> EncryptingStream<'a> {
    /// Create a new encrypting stream.
    pub fn new(key: &'a ContentKey) -> Self {
        Self {
            key,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set custom chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Encrypt data from reader and write the complete blob to writer.
    ///
    /// A fresh random nonce is drawn for every call.
    ///
    /// # Postconditions
    /// - The writer holds header || ciphertext starting at its initial position
    /// - The writer is left positioned after the last ciphertext byte
    ///
    /// # Errors
    /// - I/O errors from reader/writer
    /// - `InvalidInput` if the plaintext exceeds [`MAX_PLAINTEXT_LEN`]
    pub fn encrypt_stream<R: Read, W: Write + Seek>(
        &self,
        reader: R,
        writer: W,
    ) -> Result<ArtifactHeader> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        self.seal_stream(nonce, reader, writer)
    }

    fn seal_stream<R: Read, W: Write + Seek>(
        &self,
        nonce: [u8; NONCE_SIZE],
        mut reader: R,
        mut writer: W,
    ) -> Result<ArtifactHeader> {
        let start = writer.stream_position()?;
        let placeholder = ArtifactHeader {
            plaintext_len: 0,
            nonce,
            tag: [0u8; TAG_SIZE],
        };
        writer.write_all(&placeholder.to_bytes())?;

        let mut gcm = GcmState::new(self.key, &nonce);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut total = 0u64;

        loop {
            let n = read_chunk(&mut reader, &mut buffer)?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if total > MAX_PLAINTEXT_LEN {
                buffer.zeroize();
                return Err(Error::InvalidInput(format!(
                    "Plaintext exceeds maximum length {}",
                    MAX_PLAINTEXT_LEN
                )));
            }

            let chunk = &mut buffer[..n];
            gcm.apply_keystream(chunk);
            gcm.absorb(chunk);
            writer.write_all(chunk)?;
        }
        buffer.zeroize();

        let header = ArtifactHeader {
            plaintext_len: total,
            nonce,
            tag: gcm.finish(),
        };

        let end = writer.stream_position()?;
        writer.seek(SeekFrom::Start(start))?;
        writer.write_all(&header.to_bytes())?;
        writer.seek(SeekFrom::Start(end))?;
        writer.flush()?;

        debug!(bytes = total, "Stream encrypted");
        Ok(header)
    }
}

/// Decrypting stream that authenticates before releasing plaintext.
pub struct DecryptingStream<'a> {
    key: &'a ContentKey,
    chunk_size: usize,
}

impl<'a> DecryptingStream<'a> {
    /// Create a new decrypting stream.
    pub fn new(key: &'a ContentKey) -> Self {
        Self {
            key,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set custom chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Authenticate a blob without decrypting it.
    ///
    /// # Errors
    /// - `InvalidInput` for a malformed header, truncated ciphertext or trailing data
    /// - `Integrity` if the tag does not verify
    pub fn verify_stream<R: Read>(&self, mut reader: R) -> Result<ArtifactHeader> {
        let header = ArtifactHeader::read_from(&mut reader)?;
        let mut gcm = GcmState::new(self.key, &header.nonce);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut remaining = header.plaintext_len;

        while remaining > 0 {
            let want = remaining.min(self.chunk_size as u64) as usize;
            let n = read_chunk(&mut reader, &mut buffer[..want])?;
            if n < want {
                return Err(Error::InvalidInput(format!(
                    "Ciphertext truncated: {} bytes missing",
                    remaining - n as u64
                )));
            }
            gcm.absorb(&buffer[..n]);
            remaining -= n as u64;
        }

        let mut probe = [0u8; 1];
        if read_chunk(&mut reader, &mut probe)? != 0 {
            return Err(Error::InvalidInput(
                "Trailing data after declared ciphertext length".to_string(),
            ));
        }

        let tag = gcm.finish();
        if !bool::from(tag.ct_eq(&header.tag)) {
            return Err(Error::Integrity("Authentication tag mismatch".to_string()));
        }
        Ok(header)
    }

    /// Decrypt a blob from reader into writer.
    ///
    /// The declared length is checked against the stream size before any
    /// cryptographic work, and the tag is verified in a first pass. Plaintext
    /// is only written once the whole stream has authenticated.
    ///
    /// # Errors
    /// - `InvalidInput` for a malformed header or a length mismatch
    /// - `Integrity` if authentication fails (tampered data or wrong key)
    /// - I/O errors
    pub fn decrypt_stream<R: Read + Seek, W: Write>(
        &self,
        mut reader: R,
        mut writer: W,
    ) -> Result<u64> {
        let start = reader.stream_position()?;
        let header = ArtifactHeader::read_from(&mut reader)?;
        let body_start = start + HEADER_SIZE as u64;

        let end = reader.seek(SeekFrom::End(0))?;
        let available = end.saturating_sub(body_start);
        if available != header.plaintext_len {
            return Err(Error::InvalidInput(format!(
                "Declared length {} but {} ciphertext bytes present",
                header.plaintext_len, available
            )));
        }

        reader.seek(SeekFrom::Start(start))?;
        self.verify_stream(&mut reader)?;
        reader.seek(SeekFrom::Start(body_start))?;

        let mut gcm = GcmState::new(self.key, &header.nonce);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut remaining = header.plaintext_len;

        while remaining > 0 {
            let want = remaining.min(self.chunk_size as u64) as usize;
            let n = read_chunk(&mut reader, &mut buffer[..want])?;
            if n < want {
                buffer.zeroize();
                return Err(Error::InvalidInput(
                    "Ciphertext shrank during decryption".to_string(),
                ));
            }
            let chunk = &mut buffer[..n];
            gcm.apply_keystream(chunk);
            writer.write_all(chunk)?;
            remaining -= n as u64;
        }
        buffer.zeroize();
        writer.flush()?;

        debug!(bytes = header.plaintext_len, "Stream decrypted");
        Ok(header.plaintext_len)
    }
}

/// Encrypt a complete byte slice into a new blob.
///
/// This is a convenience function for when the complete data is available.
pub fn encrypt_bytes(key: &ContentKey, data: &[u8]) -> Result<(Vec<u8>, ArtifactHeader)> {
    let mut output = std::io::Cursor::new(Vec::with_capacity(HEADER_SIZE + data.len()));
    let header = EncryptingStream::new(key).encrypt_stream(data, &mut output)?;
    Ok((output.into_inner(), header))
}

/// Decrypt a complete blob held in memory.
pub fn decrypt_bytes(key: &ContentKey, blob: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    DecryptingStream::new(key).decrypt_stream(std::io::Cursor::new(blob), &mut output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::aead::AeadInPlace;
    use aes_gcm::Aes256Gcm;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::io::Cursor;

    fn key(byte: u8) -> ContentKey {
        ContentKey::from_bytes([byte; 32])
    }

    fn seal_with(key: &ContentKey, nonce: [u8; NONCE_SIZE], data: &[u8], chunk: usize) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        EncryptingStream::new(key)
            .with_chunk_size(chunk)
            .seal_stream(nonce, data, &mut out)
            .unwrap();
        out.into_inner()
    }

    fn reference(key: &ContentKey, nonce: [u8; NONCE_SIZE], data: &[u8]) -> (Vec<u8>, [u8; TAG_SIZE]) {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        let mut buf = data.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buf)
            .unwrap();
        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(&tag);
        (buf, tag_bytes)
    }

    #[test]
    fn test_stream_encrypt_decrypt_roundtrip() {
        let key = ContentKey::generate();
        let plaintext = b"Bill of lading, container MSCU 123456-7";

        let (blob, header) = encrypt_bytes(&key, plaintext).unwrap();
        assert_eq!(header.plaintext_len, plaintext.len() as u64);
        assert_eq!(decrypt_bytes(&key, &blob).unwrap(), plaintext);
    }

    #[test]
    fn test_stream_multiple_chunks() {
        let key = ContentKey::generate();
        let plaintext: Vec<u8> = (0..DEFAULT_CHUNK_SIZE * 3 + 1000)
            .map(|i| (i % 251) as u8)
            .collect();

        let (blob, _) = encrypt_bytes(&key, &plaintext).unwrap();
        assert_eq!(blob.len(), HEADER_SIZE + plaintext.len());
        assert_eq!(decrypt_bytes(&key, &blob).unwrap(), plaintext);
    }

    #[test]
    fn test_stream_empty_data() {
        let key = ContentKey::generate();
        let (blob, header) = encrypt_bytes(&key, b"").unwrap();
        assert_eq!(blob.len(), HEADER_SIZE);
        assert_eq!(header.plaintext_len, 0);
        assert!(decrypt_bytes(&key, &blob).unwrap().is_empty());
    }

    #[test]
    fn test_header_layout() {
        let key = ContentKey::generate();
        let (blob, header) = encrypt_bytes(&key, &[7u8; 1234]).unwrap();

        assert_eq!(&blob[..LENGTH_FIELD_SIZE], b"0000000000001234");
        assert_eq!(&blob[LENGTH_FIELD_SIZE..LENGTH_FIELD_SIZE + NONCE_SIZE], &header.nonce);
        assert_eq!(&blob[LENGTH_FIELD_SIZE + NONCE_SIZE..HEADER_SIZE], &header.tag);
        assert_ne!(header.tag, [0u8; TAG_SIZE]);
    }

    #[test]
    fn test_known_answer_empty_plaintext() {
        // AES-256-GCM, zero key, zero nonce, empty plaintext.
        let blob = seal_with(&key(0), [0u8; NONCE_SIZE], b"", 64);
        assert_eq!(
            hex::encode(&blob[LENGTH_FIELD_SIZE + NONCE_SIZE..HEADER_SIZE]),
            "530f8afbc74536b9a963b4f1c4cb738b"
        );
    }

    #[test]
    fn test_known_answer_one_block() {
        // AES-256-GCM, zero key, zero nonce, one zero block.
        let blob = seal_with(&key(0), [0u8; NONCE_SIZE], &[0u8; 16], 5);
        assert_eq!(hex::encode(&blob[HEADER_SIZE..]), "cea7403d4d606b6e074ec5d3baf39d18");
        assert_eq!(
            hex::encode(&blob[LENGTH_FIELD_SIZE + NONCE_SIZE..HEADER_SIZE]),
            "d0d1c8a799996bf0265b98b5d48ab919"
        );
    }

    #[test]
    fn test_matches_one_shot_gcm() {
        let key = key(0x5A);
        let nonce = [0x11u8; NONCE_SIZE];
        let data: Vec<u8> = (0..200_003u32).map(|i| (i * 31 % 256) as u8).collect();

        let blob = seal_with(&key, nonce, &data, 4093);
        let (ciphertext, tag) = reference(&key, nonce, &data);

        assert_eq!(&blob[HEADER_SIZE..], &ciphertext[..]);
        assert_eq!(&blob[LENGTH_FIELD_SIZE + NONCE_SIZE..HEADER_SIZE], &tag);
    }

    #[test]
    fn test_backfill_at_nonzero_offset() {
        let key = ContentKey::generate();
        let mut out = Cursor::new(b"PREFIX".to_vec());
        out.seek(SeekFrom::End(0)).unwrap();

        let header = EncryptingStream::new(&key)
            .encrypt_stream(&b"payload"[..], &mut out)
            .unwrap();
        let bytes = out.into_inner();

        assert_eq!(&bytes[..6], b"PREFIX");
        assert_eq!(&bytes[6..6 + HEADER_SIZE], &header.to_bytes());

        let mut reader = Cursor::new(&bytes[..]);
        reader.seek(SeekFrom::Start(6)).unwrap();
        let mut plain = Vec::new();
        DecryptingStream::new(&key).decrypt_stream(reader, &mut plain).unwrap();
        assert_eq!(plain, b"payload");
    }

    #[test]
    fn test_stream_wrong_key_fails() {
        let (blob, _) = encrypt_bytes(&key(1), b"Secret streaming data").unwrap();
        assert!(matches!(decrypt_bytes(&key(2), &blob), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_tampered_ciphertext_writes_nothing() {
        let key = ContentKey::generate();
        let (mut blob, _) = encrypt_bytes(&key, &[0x42u8; 5000]).unwrap();
        blob[HEADER_SIZE + 4000] ^= 0x80;

        let mut plain = Vec::new();
        let result = DecryptingStream::new(&key).decrypt_stream(Cursor::new(&blob[..]), &mut plain);
        assert!(matches!(result, Err(Error::Integrity(_))));
        assert!(plain.is_empty());
    }

    #[test]
    fn test_tampered_tag_and_nonce_fail() {
        let key = ContentKey::generate();
        let (blob, _) = encrypt_bytes(&key, b"approval certificate").unwrap();

        let mut bad_tag = blob.clone();
        bad_tag[HEADER_SIZE - 1] ^= 0x01;
        assert!(matches!(decrypt_bytes(&key, &bad_tag), Err(Error::Integrity(_))));

        let mut bad_nonce = blob;
        bad_nonce[LENGTH_FIELD_SIZE] ^= 0x01;
        assert!(matches!(decrypt_bytes(&key, &bad_nonce), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_length_mismatch_is_input_error() {
        let key = ContentKey::generate();
        let (blob, _) = encrypt_bytes(&key, b"0123456789").unwrap();

        let truncated = &blob[..blob.len() - 1];
        assert!(matches!(decrypt_bytes(&key, truncated), Err(Error::InvalidInput(_))));

        let mut trailing = blob.clone();
        trailing.push(0);
        assert!(matches!(decrypt_bytes(&key, &trailing), Err(Error::InvalidInput(_))));

        let mut relabeled = blob;
        relabeled[LENGTH_FIELD_SIZE - 1] = b'9';
        assert!(matches!(decrypt_bytes(&key, &relabeled), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let key = ContentKey::generate();
        let (mut blob, _) = encrypt_bytes(&key, b"data").unwrap();
        blob[3] = b'x';
        assert!(matches!(decrypt_bytes(&key, &blob), Err(Error::InvalidInput(_))));

        assert!(matches!(decrypt_bytes(&key, b"00000"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_verify_stream_does_not_need_seek() {
        let key = ContentKey::generate();
        let (blob, header) = encrypt_bytes(&key, &[1u8; 70_000]).unwrap();
        let verified = DecryptingStream::new(&key)
            .with_chunk_size(1000)
            .verify_stream(&blob[..])
            .unwrap();
        assert_eq!(verified, header);
    }

    #[test]
    fn test_nonces_unique_across_encryptions() {
        let key = ContentKey::generate();
        let nonces: HashSet<[u8; NONCE_SIZE]> = (0..64)
            .map(|_| encrypt_bytes(&key, b"x").unwrap().1.nonce)
            .collect();
        assert_eq!(nonces.len(), 64);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_chunking_matches_reference(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            chunk in 1usize..300,
            nonce in any::<[u8; NONCE_SIZE]>(),
        ) {
            let key = key(0x33);
            let blob = seal_with(&key, nonce, &data, chunk);
            let (ciphertext, tag) = reference(&key, nonce, &data);
            prop_assert_eq!(&blob[HEADER_SIZE..], &ciphertext[..]);
            prop_assert_eq!(&blob[LENGTH_FIELD_SIZE + NONCE_SIZE..HEADER_SIZE], &tag[..]);

            let mut plain = Vec::new();
            DecryptingStream::new(&key)
                .with_chunk_size(chunk)
                .decrypt_stream(Cursor::new(&blob[..]), &mut plain)
                .unwrap();
            prop_assert_eq!(plain, data);
        }

        #[test]
        fn prop_any_bit_flip_is_rejected(
            data in proptest::collection::vec(any::<u8>(), 1..512),
            position in any::<proptest::sample::Index>(),
            bit in 0u8..8,
        ) {
            let key = ContentKey::generate();
            let (mut blob, _) = encrypt_bytes(&key, &data).unwrap();
            let index = position.index(blob.len());
            blob[index] ^= 1 << bit;
            prop_assert!(decrypt_bytes(&key, &blob).is_err());
        }
    }
}
