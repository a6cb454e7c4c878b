//! Namespace prefixing of logical keys.

use crate::error::{CoreError, CoreResult};

/// Separator between the normalized namespace and the logical key.
const SEPARATOR: char = ':';

/// Maps logical keys to backend keys for one namespace, and back.
///
/// The namespace is normalized by percent-escaping `%` and `:`, so the first
/// `:` of a backend key always ends the namespace and two different
/// namespaces never produce overlapping prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceCodec {
    namespace: String,
    prefix: String,
}

impl NamespaceCodec {
    /// Creates a codec for `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let mut prefix = String::with_capacity(namespace.len() + 1);
        for c in namespace.chars() {
            match c {
                '%' => prefix.push_str("%25"),
                ':' => prefix.push_str("%3A"),
                other => prefix.push(other),
            }
        }
        prefix.push(SEPARATOR);
        Self { namespace, prefix }
    }

    /// Returns the namespace as given.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the backend key prefix, separator included.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefixes a logical key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an empty key.
    pub fn encode(&self, key: &str) -> CoreResult<String> {
        if key.is_empty() {
            return Err(CoreError::invalid_argument("keys must be non-empty"));
        }
        Ok(format!("{}{key}", self.prefix))
    }

    /// Strips the namespace prefix from a backend key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptData`] if the key belongs to another
    /// namespace or carries no logical part.
    pub fn decode<'k>(&self, ns_key: &'k str) -> CoreResult<&'k str> {
        match ns_key.strip_prefix(self.prefix.as_str()) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(CoreError::corrupt_data(format!(
                "key '{ns_key}' is not in namespace '{}'",
                self.namespace
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode() {
        let codec = NamespaceCodec::new("default");
        let ns_key = codec.encode("sensor.1").unwrap();
        assert_eq!(ns_key, "default:sensor.1");
        assert_eq!(codec.decode(&ns_key).unwrap(), "sensor.1");
    }

    #[test]
    fn keys_may_contain_separator() {
        let codec = NamespaceCodec::new("ns");
        let ns_key = codec.encode("a:b:c").unwrap();
        assert_eq!(codec.decode(&ns_key).unwrap(), "a:b:c");
    }

    #[test]
    fn namespaces_with_separator_do_not_collide() {
        let a = NamespaceCodec::new("a:b");
        let b = NamespaceCodec::new("a");
        let ns_key = a.encode("c").unwrap();
        assert_eq!(ns_key, "a%3Ab:c");
        assert!(b.decode(&ns_key).is_err());
        assert_ne!(b.encode("b:c").unwrap(), ns_key);

        let pct = NamespaceCodec::new("a%3Ab");
        assert_eq!(pct.prefix(), "a%253Ab:");
        assert!(pct.decode(&ns_key).is_err());
    }

    #[test]
    fn foreign_prefix_is_corrupt_data() {
        let codec = NamespaceCodec::new("default");
        assert!(matches!(
            codec.decode("other:key"),
            Err(CoreError::CorruptData { .. })
        ));
        assert!(matches!(
            codec.decode("default:"),
            Err(CoreError::CorruptData { .. })
        ));
    }

    #[test]
    fn empty_key_rejected() {
        assert!(matches!(
            NamespaceCodec::new("default").encode(""),
            Err(CoreError::InvalidArgument { .. })
        ));
    }
}
