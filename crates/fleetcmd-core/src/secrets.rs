//! Per-host privilege elevation secrets

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An elevation secret. `Debug` and `Display` never reveal it; memory is wiped on drop.
#[derive(Clone, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The secret text, for substitution into a command
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Source of elevation secrets, keyed by inventory host
pub trait SecretProvider: Send + Sync {
    /// Secret for `host`, or `None` if none is on record (an empty secret counts as none)
    fn secret_for(&self, host: &str) -> Option<Secret>;
}

/// In-memory host → secret map
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct StaticSecrets {
    secrets: HashMap<String, Secret>,
}

impl StaticSecrets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the secret for a host
    #[must_use]
    pub fn with(mut self, host: impl Into<String>, secret: impl Into<String>) -> Self {
        self.insert(host, secret);
        self
    }

    pub fn insert(&mut self, host: impl Into<String>, secret: impl Into<String>) {
        self.secrets.insert(host.into(), Secret::new(secret));
    }

    /// Merge `other` into `self`; entries in `other` win
    pub fn extend(&mut self, other: StaticSecrets) {
        self.secrets.extend(other.secrets);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl SecretProvider for StaticSecrets {
    fn secret_for(&self, host: &str) -> Option<Secret> {
        self.secrets
            .get(host)
            .filter(|secret| !secret.expose().is_empty())
            .cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticSecrets {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut secrets = Self::new();
        for (host, secret) in iter {
            secrets.insert(host, secret);
        }
        secrets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let secrets = StaticSecrets::new().with("web1", "hunter2");

        assert_eq!(
            secrets.secret_for("web1").map(|s| s.expose().to_string()),
            Some("hunter2".to_string())
        );
        assert!(secrets.secret_for("web2").is_none());
    }

    #[test]
    fn test_secret_never_printed() {
        let secret = Secret::new("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
        assert!(!secret.to_string().contains("hunter2"));

        let secrets: StaticSecrets = [("web1", "hunter2")].into_iter().collect();
        assert!(!format!("{secrets:?}").contains("hunter2"));
    }

    #[test]
    fn test_empty_secret_is_absent() {
        let secrets = StaticSecrets::new().with("web1", "").with("web2", "pw");

        assert!(secrets.secret_for("web1").is_none());
        assert!(secrets.secret_for("web2").is_some());
    }

    #[test]
    fn test_secret_zeroized() {
        fn wiped_on_drop<T: ZeroizeOnDrop>(_: &T) {}

        let mut secret = Secret::new("hunter2");
        wiped_on_drop(&secret);

        secret.zeroize();
        assert!(secret.expose().is_empty());
    }

    #[test]
    fn test_extend_overrides() {
        let mut base = StaticSecrets::new().with("web1", "old").with("web2", "keep");
        base.extend(StaticSecrets::new().with("web1", "new"));

        assert_eq!(base.len(), 2);
        assert_eq!(base.secret_for("web1").unwrap().expose(), "new");
        assert_eq!(base.secret_for("web2").unwrap().expose(), "keep");
    }
}
