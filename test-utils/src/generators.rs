//! Shared proptest generators for pipeline inputs.

use crypto_pipeline::algorithms::{AES_256_GCM, CHACHA20_POLY1305, ED25519, HMAC_SHA256};
use proptest::prelude::*;
use std::time::Duration;

/// Generate registered encryption algorithm identifiers.
pub fn encryption_algorithm_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(AES_256_GCM.to_string()),
        Just(CHACHA20_POLY1305.to_string()),
    ]
}

/// Generate registered signature algorithm identifiers.
pub fn signature_algorithm_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just(HMAC_SHA256.to_string()), Just(ED25519.to_string())]
}

/// Generate key identifiers.
pub fn key_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,23}"
}

/// Generate plaintexts, empty included.
pub fn plaintext_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// Generate optional additional authenticated data.
pub fn aad_strategy() -> impl Strategy<Value = Option<Vec<u8>>> {
    prop::option::of(prop::collection::vec(any::<u8>(), 1..64))
}

/// Generate short time-to-live durations.
pub fn ttl_strategy() -> impl Strategy<Value = Duration> {
    (1u64..3600).prop_map(Duration::from_secs)
}

/// Generate cache capacities.
pub fn cache_size_strategy() -> impl Strategy<Value = usize> {
    1usize..256
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn key_ids_are_non_empty(key_id in key_id_strategy()) {
            prop_assert!(!key_id.is_empty());
            prop_assert!(key_id.len() <= 24);
        }

        #[test]
        fn aad_is_never_empty_when_present(aad in aad_strategy()) {
            if let Some(aad) = aad {
                prop_assert!(!aad.is_empty());
            }
        }
    }
}
