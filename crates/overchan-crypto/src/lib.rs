//! # overchan-crypto
//!
//! Hashing and signature primitives for the relay:
//! - SHA-512 content addressing for attachments (base32 filenames)
//! - the line-canonical SHA-512 digest used for signed envelopes
//! - Ed25519 verification over the raw digest
//!
//! The signature scheme signs the 64-byte SHA-512 digest directly as the
//! Ed25519 message (not Ed25519ph). Other relays produce signatures this
//! way; the canonicalization below must stay byte-exact or federated
//! signatures stop verifying.

use data_encoding::BASE32;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha512};
use thiserror::Error;
use tracing::debug;

/// Length of an Ed25519 public key in bytes.
pub const PUBKEY_LEN: usize = 32;

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Crypto errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Public key bytes were not a valid curve point.
    #[error("invalid public key: {0}")]
    InvalidPubkey(String),

    /// Signature did not verify against the digest.
    #[error("signature verification failed")]
    BadSignature,

    /// Hex field had the wrong length or illegal characters.
    #[error("invalid hex field: {0}")]
    InvalidHex(String),

    /// Payload's first line has no newline terminator.
    #[error("unterminated signed payload")]
    UnterminatedPayload,
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// SHA-512 of raw bytes.
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&Sha512::digest(data));
    out
}

/// Content-addressed filename for attachment bytes: `base32(sha512(data)) + ext`.
///
/// `ext` includes its leading dot (`.png`). Equal bytes with equal
/// extension always collide to the same name.
pub fn content_address(data: &[u8], ext: &str) -> String {
    let hash = sha512(data);
    let mut name = BASE32.encode(&hash);
    name.push_str(ext);
    name
}

/// Line-canonical SHA-512 digest of a signed envelope payload.
///
/// Rules, applied to the payload bytes as they arrived:
/// - the first line must be newline-terminated, and is hashed without
///   that newline; a payload whose first line never ends (empty
///   payloads included) is [`CryptoError::UnterminatedPayload`];
/// - every later newline-terminated line is hashed as `\r\n` followed by
///   its content without the trailing newline;
/// - a trailing fragment with no newline after the first line is NOT
///   hashed.
///
/// A lone `\r` before the newline is part of the line content and stays
/// in the digest. Peer relays compute signatures with exactly these
/// rules; any deviation breaks federation-wide verification.
pub fn canonical_digest(payload: &[u8]) -> CryptoResult<[u8; 64]> {
    let mut hasher = Sha512::new();

    // first line, which must be terminated
    let pos = payload
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(CryptoError::UnterminatedPayload)?;
    hasher.update(&payload[..pos]);
    let mut rest = &payload[pos + 1..];

    // remaining lines, only newline-terminated ones count
    while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
        hasher.update(b"\r\n");
        hasher.update(&rest[..pos]);
        rest = &rest[pos + 1..];
    }

    let mut out = [0u8; 64];
    out.copy_from_slice(&hasher.finalize());
    Ok(out)
}

/// Decode a hex-encoded Ed25519 public key header value.
pub fn decode_pubkey(hex_pk: &str) -> CryptoResult<[u8; PUBKEY_LEN]> {
    let bytes = hex::decode(hex_pk).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidHex(format!("pubkey must be {} bytes", PUBKEY_LEN)))
}

/// Decode a hex-encoded Ed25519 signature header value.
pub fn decode_signature(hex_sig: &str) -> CryptoResult<[u8; SIGNATURE_LEN]> {
    let bytes = hex::decode(hex_sig).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidHex(format!("signature must be {} bytes", SIGNATURE_LEN)))
}

/// Verify an Ed25519 signature over a canonical digest.
///
/// The digest is the Ed25519 message itself; nothing is prehashed on the
/// dalek side.
pub fn verify_digest(
    digest: &[u8; 64],
    sig: &[u8; SIGNATURE_LEN],
    pubkey: &[u8; PUBKEY_LEN],
) -> CryptoResult<()> {
    let vk = VerifyingKey::from_bytes(pubkey)
        .map_err(|e| CryptoError::InvalidPubkey(e.to_string()))?;
    let sig = Signature::from_bytes(sig);
    vk.verify(digest, &sig).map_err(|_| {
        debug!("ed25519 verification failed");
        CryptoError::BadSignature
    })
}

/// Sign a canonical digest, producing the signature a peer relay would
/// verify with [`verify_digest`]. Used by local posting tools and tests.
pub fn sign_digest(digest: &[u8; 64], signing_key: &SigningKey) -> [u8; SIGNATURE_LEN] {
    signing_key.sign(digest).to_bytes()
}

/// Convenience: canonicalize, sign, and hex-encode a payload.
pub fn sign_payload(payload: &[u8], signing_key: &SigningKey) -> CryptoResult<(String, String)> {
    let digest = canonical_digest(payload)?;
    let sig = sign_digest(&digest, signing_key);
    let pk = signing_key.verifying_key().to_bytes();
    Ok((hex::encode(pk), hex::encode(sig)))
}

/// Convenience: canonicalize and verify a payload against hex header values.
pub fn verify_payload(payload: &[u8], hex_pk: &str, hex_sig: &str) -> CryptoResult<()> {
    let pk = decode_pubkey(hex_pk)?;
    let sig = decode_signature(hex_sig)?;
    let digest = canonical_digest(payload)?;
    verify_digest(&digest, &sig, &pk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    #[test]
    fn content_address_is_deterministic() {
        let a = content_address(b"hello", ".png");
        let b = content_address(b"hello", ".png");
        assert_eq!(a, b);
        assert!(a.ends_with(".png"));
    }

    #[test]
    fn content_address_differs_by_bytes() {
        assert_ne!(content_address(b"a", ".txt"), content_address(b"b", ".txt"));
    }

    #[test]
    fn canonical_digest_single_line() {
        // the trailing newline is stripped from the hashed content
        assert_eq!(canonical_digest(b"hello\n").unwrap(), sha512(b"hello"));
    }

    #[test]
    fn canonical_digest_rejects_unterminated_first_line() {
        assert!(matches!(
            canonical_digest(b"hello"),
            Err(CryptoError::UnterminatedPayload)
        ));
        assert!(matches!(
            canonical_digest(b""),
            Err(CryptoError::UnterminatedPayload)
        ));
    }

    #[test]
    fn canonical_digest_joins_lines_with_crlf() {
        assert_eq!(canonical_digest(b"a\nb\n").unwrap(), sha512(b"a\r\nb"));
        assert_eq!(
            canonical_digest(b"a\nb\nc\n").unwrap(),
            sha512(b"a\r\nb\r\nc")
        );
    }

    #[test]
    fn canonical_digest_keeps_carriage_returns() {
        // a stray \r before the newline is line content
        assert_eq!(canonical_digest(b"a\r\nb\n").unwrap(), sha512(b"a\r\r\nb"));
    }

    #[test]
    fn canonical_digest_empty_lines() {
        assert_eq!(canonical_digest(b"\n\n").unwrap(), sha512(b"\r\n"));
    }

    #[test]
    fn canonical_digest_drops_unterminated_tail() {
        assert_eq!(canonical_digest(b"a\nb").unwrap(), sha512(b"a"));
    }

    #[test]
    fn sign_verify_roundtrip() {
        let key = test_key();
        let payload = b"post body\nsecond line\n";
        let (pk, sig) = sign_payload(payload, &key).unwrap();
        assert!(verify_payload(payload, &pk, &sig).is_ok());
    }

    #[test]
    fn signing_unterminated_payload_fails() {
        assert!(sign_payload(b"no newline", &test_key()).is_err());
    }

    #[test]
    fn tampered_payload_fails() {
        let key = test_key();
        let payload = b"post body\nsecond line\n".to_vec();
        let (pk, sig) = sign_payload(&payload, &key).unwrap();
        let mut bad = payload.clone();
        bad[0] ^= 1;
        assert!(verify_payload(&bad, &pk, &sig).is_err());
    }

    #[test]
    fn bad_hex_rejected() {
        assert!(decode_pubkey("zz").is_err());
        assert!(decode_pubkey("aabb").is_err());
        assert!(decode_signature(&"00".repeat(63)).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let payload = b"hello\n";
        let (_, sig) = sign_payload(payload, &test_key()).unwrap();
        let other = SigningKey::from_bytes(&[9u8; 32]);
        let pk = hex::encode(other.verifying_key().to_bytes());
        assert!(verify_payload(payload, &pk, &sig).is_err());
    }
}
