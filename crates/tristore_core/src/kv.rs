//! Key/value facet.

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use regex::Regex;
use std::collections::BTreeSet;
use tristore_codec::Value;

/// Key/value entries of a store.
///
/// Obtained from [`Store::kv`].
#[derive(Debug, Clone, Copy)]
pub struct KeyValue<'s> {
    store: &'s Store,
}

impl<'s> KeyValue<'s> {
    pub(crate) fn new(store: &'s Store) -> Self {
        Self { store }
    }

    /// Returns the value of `key`, or `None` if it is not set.
    pub fn get(&self, key: &str) -> CoreResult<Option<Value>> {
        let ns_key = self.store.codec().encode(key)?;
        self.store
            .adapter()
            .kv_get(&ns_key)?
            .map(|bytes| self.store.from_store(&bytes))
            .transpose()
    }

    /// Returns the value of `key`, or `default` if it is not set.
    pub fn get_or(&self, key: &str, default: Value) -> CoreResult<Value> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Returns the value of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyNotFound`] if the key is not set.
    pub fn require(&self, key: &str) -> CoreResult<Value> {
        self.get(key)?.ok_or_else(|| CoreError::key_not_found(key))
    }

    /// Stores a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FrozenStore`] on a read-only store.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> CoreResult<()> {
        self.store.ensure_writable()?;
        let ns_key = self.store.codec().encode(key)?;
        let bytes = self.store.to_store(&value.into())?;
        self.store.adapter().kv_set(&ns_key, &bytes)?;
        Ok(())
    }

    /// Deletes entries. Keys that are not set are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FrozenStore`] on a read-only store.
    pub fn delete<K: AsRef<str>>(&self, keys: impl IntoIterator<Item = K>) -> CoreResult<()> {
        self.store.ensure_writable()?;
        let ns_keys = keys
            .into_iter()
            .map(|key| self.store.codec().encode(key.as_ref()))
            .collect::<CoreResult<Vec<_>>>()?;
        if !ns_keys.is_empty() {
            self.store.adapter().kv_delete(&ns_keys)?;
        }
        Ok(())
    }

    /// Returns every key that is set.
    pub fn keys(&self) -> CoreResult<BTreeSet<String>> {
        self.store.decode_keys(self.store.adapter().kv_keys()?)
    }

    /// Returns `true` if `key` is set.
    pub fn has(&self, key: &str) -> CoreResult<bool> {
        let ns_key = self.store.codec().encode(key)?;
        Ok(self.store.adapter().kv_get(&ns_key)?.is_some())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.store.adapter().kv_keys()?.len())
    }

    /// Returns `true` if no entry is set.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns the entries whose key matches a glob pattern, ordered by key.
    ///
    /// `*` matches any run of characters and `?` exactly one; every other
    /// character matches itself. The pattern must match the whole key.
    /// `None` returns every entry.
    ///
    /// Keys are listed first and values fetched one by one; an entry
    /// deleted in between is left out.
    pub fn find(&self, pattern: Option<&str>) -> CoreResult<Vec<(String, Value)>> {
        let matcher = pattern.map(glob_to_regex).transpose()?;
        let mut found = Vec::new();
        for key in self.keys()? {
            if matcher.as_ref().is_some_and(|re| !re.is_match(&key)) {
                continue;
            }
            if let Some(value) = self.get(&key)? {
                found.push((key, value));
            }
        }
        Ok(found)
    }
}

fn glob_to_regex(pattern: &str) -> CoreResult<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("^(?s:");
    let mut literal = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    source.push_str(")$");
    Regex::new(&source).map_err(|e| CoreError::invalid_argument(format!("invalid pattern '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreConfig;

    fn store() -> Store {
        Store::open("memory://kv", StoreConfig::new().frozen(false)).unwrap()
    }

    #[test]
    fn glob_translation() {
        let re = glob_to_regex("test.*").unwrap();
        assert!(re.is_match("test.key1"));
        assert!(!re.is_match("testxkey1"));
        assert!(!re.is_match("key3.test.abcd"));

        let re = glob_to_regex("a?c").unwrap();
        assert!(re.is_match("abc"));
        assert!(!re.is_match("abbc"));

        assert!(glob_to_regex("(x)+[").unwrap().is_match("(x)+["));
    }

    #[test]
    fn get_set_delete() {
        let store = store();
        let kv = store.kv();
        assert_eq!(kv.get("missing").unwrap(), None);
        assert_eq!(kv.get_or("missing", Value::from(7)).unwrap(), Value::from(7));
        assert!(matches!(kv.require("missing"), Err(CoreError::KeyNotFound { .. })));

        kv.set("a", "x").unwrap();
        kv.set("a", "y").unwrap();
        assert_eq!(kv.require("a").unwrap(), Value::from("y"));
        assert!(kv.has("a").unwrap());
        assert_eq!(kv.len().unwrap(), 1);

        kv.delete(["a", "never-set"]).unwrap();
        assert!(!kv.has("a").unwrap());
        assert!(kv.is_empty().unwrap());
    }

    #[test]
    fn find_by_pattern() {
        let store = store();
        let kv = store.kv();
        kv.set("test.key1", 1).unwrap();
        kv.set("test.key2", 2).unwrap();
        kv.set("key3.test.abcd", 3).unwrap();

        assert_eq!(kv.find(None).unwrap().len(), 3);
        assert_eq!(
            kv.find(Some("test.*")).unwrap(),
            vec![
                ("test.key1".to_string(), Value::from(1)),
                ("test.key2".to_string(), Value::from(2)),
            ]
        );
        assert!(kv.find(Some("test.abc*")).unwrap().is_empty());
        assert_eq!(kv.find(Some("*.test.????")).unwrap().len(), 1);
    }

    #[test]
    fn has_checks_one_key() {
        let store = store();
        let kv = store.kv();
        kv.set("null", Value::Null).unwrap();
        kv.set("other", 1).unwrap();
        assert!(kv.has("null").unwrap());
        assert!(!kv.has("nul").unwrap());
        assert!(!kv.has("null.more").unwrap());
    }

    #[test]
    fn empty_key_rejected() {
        let store = store();
        assert!(matches!(
            store.kv().set("", 1),
            Err(CoreError::InvalidArgument { .. })
        ));
    }
}
