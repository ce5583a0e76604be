//! Algorithm registry mapping identifiers to strategies.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::algorithms::{
    Aes256GcmStrategy, ChaCha20Poly1305Strategy, Ed25519Strategy, EncryptionStrategy,
    HmacSha256Strategy, SignatureStrategy,
};
use crate::error::{CryptoError, CryptoResult};
use crate::models::{AlgorithmDescriptor, AlgorithmKind};

/// A registered strategy of either family.
#[derive(Clone)]
pub enum Strategy {
    /// Encryption strategy
    Encryption(Arc<dyn EncryptionStrategy>),
    /// Signature strategy
    Signature(Arc<dyn SignatureStrategy>),
}

impl Strategy {
    /// Descriptor of the wrapped strategy.
    #[must_use]
    pub fn descriptor(&self) -> &AlgorithmDescriptor {
        match self {
            Self::Encryption(s) => s.descriptor(),
            Self::Signature(s) => s.descriptor(),
        }
    }

    /// Family of the wrapped strategy.
    #[must_use]
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::Encryption(_) => AlgorithmKind::Encryption,
            Self::Signature(_) => AlgorithmKind::Signature,
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("id", &self.descriptor().id)
            .field("kind", &self.kind())
            .finish()
    }
}

/// Lookup table from algorithm identifier to strategy.
///
/// Registering under an identifier already in use replaces the previous
/// strategy. The registry performs no other validation.
#[derive(Debug, Clone, Default)]
pub struct AlgorithmRegistry {
    strategies: HashMap<String, Strategy>,
}

impl AlgorithmRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding AES-256-GCM, ChaCha20-Poly1305,
    /// HMAC-SHA256 and Ed25519.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Strategy::Encryption(Arc::new(Aes256GcmStrategy::new())));
        registry.register(Strategy::Encryption(Arc::new(ChaCha20Poly1305Strategy::new())));
        registry.register(Strategy::Signature(Arc::new(HmacSha256Strategy::new())));
        registry.register(Strategy::Signature(Arc::new(Ed25519Strategy::new())));
        registry
    }

    /// Register a strategy under its descriptor id, returning any strategy
    /// it replaced.
    pub fn register(&mut self, strategy: Strategy) -> Option<Strategy> {
        let id = strategy.descriptor().id.clone();
        self.strategies.insert(id, strategy)
    }

    /// Look up a strategy of the given kind.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` naming the identifier and kind when
    /// nothing of that kind is registered under `id`.
    pub fn get(&self, id: &str, kind: AlgorithmKind) -> CryptoResult<Strategy> {
        self.strategies
            .get(id)
            .filter(|s| s.kind() == kind)
            .cloned()
            .ok_or_else(|| CryptoError::unsupported_algorithm(id, kind))
    }

    /// Look up an encryption strategy.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` if none is registered under `id`.
    pub fn encryption(&self, id: &str) -> CryptoResult<Arc<dyn EncryptionStrategy>> {
        match self.get(id, AlgorithmKind::Encryption)? {
            Strategy::Encryption(s) => Ok(s),
            Strategy::Signature(_) => Err(CryptoError::unsupported_algorithm(
                id,
                AlgorithmKind::Encryption,
            )),
        }
    }

    /// Look up a signature strategy.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` if none is registered under `id`.
    pub fn signature(&self, id: &str) -> CryptoResult<Arc<dyn SignatureStrategy>> {
        match self.get(id, AlgorithmKind::Signature)? {
            Strategy::Signature(s) => Ok(s),
            Strategy::Encryption(_) => Err(CryptoError::unsupported_algorithm(
                id,
                AlgorithmKind::Signature,
            )),
        }
    }

    /// Whether any strategy is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.strategies.contains_key(id)
    }

    /// Descriptors of every registered strategy, sorted by id.
    #[must_use]
    pub fn descriptors(&self) -> Vec<AlgorithmDescriptor> {
        let mut descriptors: Vec<_> = self
            .strategies
            .values()
            .map(|s| s.descriptor().clone())
            .collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    /// Number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
