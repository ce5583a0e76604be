//! Interchangeable algorithm strategies.
//!
//! Strategies are pure functions of key material and input. They hold no
//! keys; the provider resolves the key and passes the bytes in per call.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use ring::aead::{self, Aad, LessSafeKey, UnboundKey};
use ring::hmac;
use ring::signature::{self, Ed25519KeyPair, KeyPair, UnparsedPublicKey};

use crate::error::{CryptoError, CryptoResult};
use crate::models::{AlgorithmDescriptor, AlgorithmKind};

/// Identifier of the AES-256-GCM strategy.
pub const AES_256_GCM: &str = "AES-256-GCM";
/// Identifier of the ChaCha20-Poly1305 strategy.
pub const CHACHA20_POLY1305: &str = "CHACHA20-POLY1305";
/// Identifier of the HMAC-SHA256 strategy.
pub const HMAC_SHA256: &str = "HMAC-SHA256";
/// Identifier of the Ed25519 strategy.
pub const ED25519: &str = "Ed25519";

const AEAD_KEY_LEN: usize = 32;
const AEAD_NONCE_LEN: usize = 12;
const AEAD_TAG_LEN: usize = 16;

/// Output of an AEAD seal with the tag split from the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedData {
    /// Ciphertext without the tag
    pub ciphertext: Vec<u8>,
    /// Random nonce used for this seal
    pub nonce: Vec<u8>,
    /// Authentication tag
    pub tag: Vec<u8>,
}

/// Authenticated symmetric encryption.
pub trait EncryptionStrategy: Send + Sync {
    /// Static description of the algorithm.
    fn descriptor(&self) -> &AlgorithmDescriptor;

    /// Encrypt under `key` with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on a wrong key length, `Encryption` if the
    /// cipher fails.
    fn encrypt(&self, key: &[u8], plaintext: &[u8], aad: Option<&[u8]>) -> CryptoResult<SealedData>;

    /// Decrypt and authenticate.
    ///
    /// # Errors
    ///
    /// Returns `Decryption` on a bad nonce length or authentication failure.
    fn decrypt(
        &self,
        key: &[u8],
        ciphertext: &[u8],
        nonce: &[u8],
        tag: &[u8],
        aad: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>>;
}

/// Message signing and verification.
pub trait SignatureStrategy: Send + Sync {
    /// Static description of the algorithm.
    fn descriptor(&self) -> &AlgorithmDescriptor;

    /// Sign `data` with `key`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on a wrong key length, `Signing` if the key is
    /// rejected.
    fn sign(&self, key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Check a signature. A mismatch is `Ok(false)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on a wrong key length.
    fn verify(&self, key: &[u8], data: &[u8], signature: &[u8]) -> CryptoResult<bool>;
}

fn check_key_len(descriptor: &AlgorithmDescriptor, key: &[u8]) -> CryptoResult<()> {
    if key.len() == descriptor.key_len {
        Ok(())
    } else {
        Err(CryptoError::invalid_input(format!(
            "{} requires a {}-byte key, got {}",
            descriptor.id,
            descriptor.key_len,
            key.len()
        )))
    }
}

fn aead_descriptor(id: &str) -> AlgorithmDescriptor {
    AlgorithmDescriptor {
        id: id.to_string(),
        kind: AlgorithmKind::Encryption,
        key_len: AEAD_KEY_LEN,
        nonce_len: AEAD_NONCE_LEN,
        tag_len: AEAD_TAG_LEN,
    }
}

fn random_nonce() -> [u8; AEAD_NONCE_LEN] {
    let mut nonce = [0u8; AEAD_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// AES-256-GCM via the `aes-gcm` crate.
#[derive(Debug, Clone)]
pub struct Aes256GcmStrategy {
    descriptor: AlgorithmDescriptor,
}

impl Aes256GcmStrategy {
    /// Create the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: aead_descriptor(AES_256_GCM),
        }
    }
}

impl Default for Aes256GcmStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptionStrategy for Aes256GcmStrategy {
    fn descriptor(&self) -> &AlgorithmDescriptor {
        &self.descriptor
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8], aad: Option<&[u8]>) -> CryptoResult<SealedData> {
        check_key_len(&self.descriptor, key)?;
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::encryption(e.to_string()))?;

        let nonce_bytes = random_nonce();
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: aad.unwrap_or_default(),
                },
            )
            .map_err(|e| CryptoError::encryption(e.to_string()))?;

        // aes-gcm appends the tag to the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len().saturating_sub(AEAD_TAG_LEN));

        Ok(SealedData {
            ciphertext: ciphertext.to_vec(),
            nonce: nonce_bytes.to_vec(),
            tag: tag.to_vec(),
        })
    }

    fn decrypt(
        &self,
        key: &[u8],
        ciphertext: &[u8],
        nonce: &[u8],
        tag: &[u8],
        aad: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>> {
        check_key_len(&self.descriptor, key)?;
        if nonce.len() != AEAD_NONCE_LEN {
            return Err(CryptoError::decryption("Invalid IV length"));
        }
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::decryption(e.to_string()))?;

        let combined = [ciphertext, tag].concat();
        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: &combined,
                    aad: aad.unwrap_or_default(),
                },
            )
            .map_err(|e| CryptoError::decryption(e.to_string()))
    }
}

/// ChaCha20-Poly1305 via `ring::aead`.
#[derive(Debug, Clone)]
pub struct ChaCha20Poly1305Strategy {
    descriptor: AlgorithmDescriptor,
}

impl ChaCha20Poly1305Strategy {
    /// Create the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: aead_descriptor(CHACHA20_POLY1305),
        }
    }

    fn sealing_key(&self, key: &[u8]) -> CryptoResult<LessSafeKey> {
        check_key_len(&self.descriptor, key)?;
        let unbound = UnboundKey::new(&aead::CHACHA20_POLY1305, key)
            .map_err(|_| CryptoError::invalid_input("ChaCha20-Poly1305 key rejected"))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl Default for ChaCha20Poly1305Strategy {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptionStrategy for ChaCha20Poly1305Strategy {
    fn descriptor(&self) -> &AlgorithmDescriptor {
        &self.descriptor
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8], aad: Option<&[u8]>) -> CryptoResult<SealedData> {
        let key = self.sealing_key(key)?;
        let nonce_bytes = random_nonce();

        let mut in_out = plaintext.to_vec();
        let tag = key
            .seal_in_place_separate_tag(
                aead::Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(aad.unwrap_or_default()),
                &mut in_out,
            )
            .map_err(|_| CryptoError::encryption("ChaCha20-Poly1305 seal failed"))?;

        Ok(SealedData {
            ciphertext: in_out,
            nonce: nonce_bytes.to_vec(),
            tag: tag.as_ref().to_vec(),
        })
    }

    fn decrypt(
        &self,
        key: &[u8],
        ciphertext: &[u8],
        nonce: &[u8],
        tag: &[u8],
        aad: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>> {
        let key = self.sealing_key(key)?;
        let nonce = aead::Nonce::try_assume_unique_for_key(nonce)
            .map_err(|_| CryptoError::decryption("Invalid IV length"))?;

        let mut in_out = [ciphertext, tag].concat();
        let plaintext = key
            .open_in_place(nonce, Aad::from(aad.unwrap_or_default()), &mut in_out)
            .map_err(|_| CryptoError::decryption("authentication failed"))?;
        Ok(plaintext.to_vec())
    }
}

/// HMAC-SHA256 via `ring::hmac`.
#[derive(Debug, Clone)]
pub struct HmacSha256Strategy {
    descriptor: AlgorithmDescriptor,
}

impl HmacSha256Strategy {
    /// Create the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: AlgorithmDescriptor {
                id: HMAC_SHA256.to_string(),
                kind: AlgorithmKind::Signature,
                key_len: 32,
                nonce_len: 0,
                tag_len: 32,
            },
        }
    }
}

impl Default for HmacSha256Strategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureStrategy for HmacSha256Strategy {
    fn descriptor(&self) -> &AlgorithmDescriptor {
        &self.descriptor
    }

    fn sign(&self, key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
        check_key_len(&self.descriptor, key)?;
        let key = hmac::Key::new(hmac::HMAC_SHA256, key);
        Ok(hmac::sign(&key, data).as_ref().to_vec())
    }

    fn verify(&self, key: &[u8], data: &[u8], signature: &[u8]) -> CryptoResult<bool> {
        check_key_len(&self.descriptor, key)?;
        let key = hmac::Key::new(hmac::HMAC_SHA256, key);
        Ok(hmac::verify(&key, data, signature).is_ok())
    }
}

/// Ed25519 via `ring::signature`. The key material is the 32-byte seed.
#[derive(Debug, Clone)]
pub struct Ed25519Strategy {
    descriptor: AlgorithmDescriptor,
}

impl Ed25519Strategy {
    /// Create the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: AlgorithmDescriptor {
                id: ED25519.to_string(),
                kind: AlgorithmKind::Signature,
                key_len: 32,
                nonce_len: 0,
                tag_len: 64,
            },
        }
    }

    fn key_pair(&self, seed: &[u8]) -> CryptoResult<Ed25519KeyPair> {
        check_key_len(&self.descriptor, seed)?;
        Ed25519KeyPair::from_seed_unchecked(seed)
            .map_err(|e| CryptoError::signing(format!("Ed25519 seed rejected: {e}")))
    }

    /// Derive the public key for a seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed has the wrong length.
    pub fn public_key(&self, seed: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(self.key_pair(seed)?.public_key().as_ref().to_vec())
    }
}

impl Default for Ed25519Strategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureStrategy for Ed25519Strategy {
    fn descriptor(&self) -> &AlgorithmDescriptor {
        &self.descriptor
    }

    fn sign(&self, key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(self.key_pair(key)?.sign(data).as_ref().to_vec())
    }

    fn verify(&self, key: &[u8], data: &[u8], signature: &[u8]) -> CryptoResult<bool> {
        let public_key = self.public_key(key)?;
        Ok(UnparsedPublicKey::new(&signature::ED25519, public_key)
            .verify(data, signature)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    fn aead_strategies() -> Vec<Box<dyn EncryptionStrategy>> {
        vec![
            Box::new(Aes256GcmStrategy::new()),
            Box::new(ChaCha20Poly1305Strategy::new()),
        ]
    }

    #[test]
    fn test_aead_round_trip_with_aad() {
        for strategy in aead_strategies() {
            let sealed = strategy.encrypt(&KEY, b"hello", Some(b"ctx")).unwrap();
            assert_eq!(sealed.nonce.len(), 12);
            assert_eq!(sealed.tag.len(), 16);
            assert_eq!(sealed.ciphertext.len(), 5);

            let plain = strategy
                .decrypt(&KEY, &sealed.ciphertext, &sealed.nonce, &sealed.tag, Some(b"ctx"))
                .unwrap();
            assert_eq!(plain, b"hello");
        }
    }

    #[test]
    fn test_aead_rejects_wrong_aad_and_tampering() {
        for strategy in aead_strategies() {
            let sealed = strategy.encrypt(&KEY, b"hello", Some(b"ctx")).unwrap();

            let err = strategy
                .decrypt(&KEY, &sealed.ciphertext, &sealed.nonce, &sealed.tag, Some(b"other"))
                .unwrap_err();
            assert!(matches!(err, CryptoError::Decryption(_)));

            let mut tampered = sealed.ciphertext.clone();
            tampered[0] ^= 0xff;
            assert!(strategy
                .decrypt(&KEY, &tampered, &sealed.nonce, &sealed.tag, Some(b"ctx"))
                .is_err());
        }
    }

    #[test]
    fn test_aead_rejects_short_key_and_bad_nonce() {
        for strategy in aead_strategies() {
            let err = strategy.encrypt(&[1u8; 16], b"x", None).unwrap_err();
            assert!(matches!(err, CryptoError::InvalidInput(_)));

            let sealed = strategy.encrypt(&KEY, b"x", None).unwrap();
            let err = strategy
                .decrypt(&KEY, &sealed.ciphertext, &[0u8; 8], &sealed.tag, None)
                .unwrap_err();
            assert!(matches!(err, CryptoError::Decryption(_)));
        }
    }

    #[test]
    fn test_nonces_are_fresh() {
        let strategy = Aes256GcmStrategy::new();
        let a = strategy.encrypt(&KEY, b"same", None).unwrap();
        let b = strategy.encrypt(&KEY, b"same", None).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_hmac_sign_verify() {
        let strategy = HmacSha256Strategy::new();
        let sig = strategy.sign(&KEY, b"message").unwrap();
        assert_eq!(sig.len(), 32);
        assert!(strategy.verify(&KEY, b"message", &sig).unwrap());
        assert!(!strategy.verify(&KEY, b"tampered", &sig).unwrap());
        assert!(!strategy.verify(&[8u8; 32], b"message", &sig).unwrap());
    }

    #[test]
    fn test_ed25519_sign_verify() {
        let strategy = Ed25519Strategy::new();
        let sig = strategy.sign(&KEY, b"message").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(strategy.verify(&KEY, b"message", &sig).unwrap());
        assert!(!strategy.verify(&KEY, b"tampered", &sig).unwrap());
        assert_eq!(strategy.public_key(&KEY).unwrap().len(), 32);
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(Aes256GcmStrategy::new().descriptor().id, AES_256_GCM);
        assert_eq!(
            Ed25519Strategy::new().descriptor().kind,
            AlgorithmKind::Signature
        );
    }
}
