//! Key normalization.

use std::borrow::Cow;
use tracing::warn;

/// Default cap on key length, in characters.
pub const DEFAULT_MAX_KEY_LENGTH: usize = 255;

/// Caps caller-supplied keys before they reach a store.
///
/// Keys longer than `max_key_length` characters keep their leftmost
/// `max_key_length` characters. Normalization never fails.
#[derive(Debug, Clone, Copy)]
pub struct KeyNormalizer {
    max_key_length: usize,
}

impl KeyNormalizer {
    pub fn new(max_key_length: usize) -> Self {
        Self { max_key_length }
    }

    pub fn max_key_length(&self) -> usize {
        self.max_key_length
    }

    /// Normalize `key`, falling back to `identity` when `key` is empty.
    pub fn normalize<'a>(&self, key: &'a str, identity: &'a str) -> Cow<'a, str> {
        let candidate = if key.is_empty() { identity } else { key };

        match candidate.char_indices().nth(self.max_key_length) {
            Some((cut, _)) => {
                warn!(
                    length = candidate.chars().count(),
                    max = self.max_key_length,
                    "Rate limit key exceeds maximum length, truncating"
                );
                Cow::Owned(candidate[..cut].to_string())
            }
            None => Cow::Borrowed(candidate),
        }
    }
}

impl Default for KeyNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEY_LENGTH)
    }
}
