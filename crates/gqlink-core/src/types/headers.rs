//! Header set type.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The header carrying the bearer credential.
pub const AUTHORIZATION: &str = "authorization";

/// The header carrying the anonymous role.
pub const ROLE: &str = "role";

/// A mapping of header name to value for one outbound operation.
///
/// Header sets are built fresh for every operation and must not be cached:
/// the credential they carry can change between calls.
///
/// Values of the `authorization` header are redacted in Debug output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderSet(BTreeMap<String, String>);

impl HeaderSet {
    /// Create an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any previous value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns a header value by exact name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns true if a header with this name exists, ignoring ASCII case.
    pub fn contains(&self, name: &str) -> bool {
        self.0.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for HeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| {
                if k.eq_ignore_ascii_case(AUTHORIZATION) {
                    (k.as_str(), "[REDACTED]")
                } else {
                    (k.as_str(), v.as_str())
                }
            }))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_ignores_case() {
        let headers: HeaderSet = [("Authorization", "Bearer x")].into_iter().collect();
        assert!(headers.contains(AUTHORIZATION));
        assert!(!headers.contains(ROLE));
    }

    #[test]
    fn debug_redacts_authorization() {
        let mut headers = HeaderSet::new();
        headers.insert(AUTHORIZATION, "Bearer secret-token");
        headers.insert("x-app", "1");

        let debug = format!("{:?}", headers);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("x-app"));
    }

    #[test]
    fn serializes_as_plain_object() {
        let headers: HeaderSet = [("x-app", "1")].into_iter().collect();
        assert_eq!(
            serde_json::to_value(&headers).unwrap(),
            serde_json::json!({"x-app": "1"})
        );
    }
}
