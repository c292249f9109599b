//! Key validation and namespacing.

use crate::error::KeyError;

/// Longest key memcached accepts.
pub const MAX_KEY_LENGTH: usize = 250;

const DIGEST_MARKER: &str = ":b3:";
const DIGEST_HEX_LEN: usize = 32;

/// Validates raw keys and maps them to and from their namespaced form.
pub trait KeyManager: Send + Sync {
    /// Validates `raw` and returns the key as stored on the server.
    fn validate_key(&self, raw: &str) -> Result<String, KeyError>;

    /// Strips the namespace from a key returned by a server.
    fn key_without_namespace<'a>(&self, key: &'a str) -> &'a str;
}

/// Default key manager: an optional `namespace:` prefix and memcached's
/// key rules.
///
/// Keys that would exceed [`MAX_KEY_LENGTH`] once namespaced are shortened
/// to a prefix followed by a BLAKE3 digest of the full key, so distinct long
/// keys stay distinct.
#[derive(Debug, Clone, Default)]
pub struct NamespacedKeys {
    prefix: Option<String>,
}

impl NamespacedKeys {
    pub fn new(namespace: Option<&str>) -> Self {
        Self {
            prefix: namespace
                .filter(|ns| !ns.is_empty())
                .map(|ns| format!("{}:", ns)),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.prefix.as_deref().map(|p| &p[..p.len() - 1])
    }

    fn shorten(key: String) -> String {
        let hash = blake3::hash(key.as_bytes()).to_hex();
        let digest = hash.as_str();
        let mut end = MAX_KEY_LENGTH - DIGEST_MARKER.len() - DIGEST_HEX_LEN;
        while !key.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}{}{}", &key[..end], DIGEST_MARKER, &digest[..DIGEST_HEX_LEN])
    }
}

impl KeyManager for NamespacedKeys {
    fn validate_key(&self, raw: &str) -> Result<String, KeyError> {
        if raw.is_empty() {
            return Err(KeyError::Empty);
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(KeyError::Invalid {
                key: raw.to_string(),
                reason: "whitespace or control character",
            });
        }

        let key = match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, raw),
            None => raw.to_string(),
        };

        if key.len() > MAX_KEY_LENGTH {
            Ok(Self::shorten(key))
        } else {
            Ok(key)
        }
    }

    fn key_without_namespace<'a>(&self, key: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str()).unwrap_or(key),
            None => key,
        }
    }
}
