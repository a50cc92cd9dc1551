//! Signing credentials.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::SigningSection;
use crate::pipeline::error::{Error, Result};

/// Keystore path fallback.
pub const KEYSTORE_PATH_ENV: &str = "ANDROID_KEYSTORE_PATH";
/// Key alias fallback.
pub const KEY_ALIAS_ENV: &str = "ANDROID_KEY_ALIAS";
/// Keystore password fallback.
pub const STORE_PASSWORD_ENV: &str = "ANDROID_STORE_PASSWORD";
/// Key password fallback.
pub const KEY_PASSWORD_ENV: &str = "ANDROID_KEY_PASSWORD";

/// Variable carrying the keystore password into the signing tool.
pub(crate) const CHILD_STORE_PASSWORD_VAR: &str = "MOBILE_RELEASE_STORE_PASS";
/// Variable carrying the key password into the signing tool.
pub(crate) const CHILD_KEY_PASSWORD_VAR: &str = "MOBILE_RELEASE_KEY_PASS";

/// Fully resolved signing inputs.
///
/// Passwords are write-only: they reach the signing tool through its
/// environment and are never rendered by `Debug`.
#[derive(Clone)]
pub struct SigningConfig {
    /// Absolute keystore path
    pub keystore_path: PathBuf,
    /// Key alias inside the keystore
    pub key_alias: String,
    store_password: String,
    key_password: String,
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("keystore_path", &self.keystore_path)
            .field("key_alias", &self.key_alias)
            .field("store_password", &"<redacted>")
            .field("key_password", &"<redacted>")
            .finish()
    }
}

impl SigningConfig {
    /// Resolves credentials from `section`, falling back to `env`.
    ///
    /// A relative keystore path is resolved against `root` and must exist. The
    /// key password defaults to the keystore password, which is how most
    /// upload keys are generated.
    pub fn resolve(section: &SigningSection, root: &Path, env: &HashMap<String, String>) -> Result<Self> {
        let from_env = |var: &str| env.get(var).filter(|v| !v.is_empty()).cloned();
        let missing = |field: &str| Error::MissingConfig {
            destination: "signing".to_string(),
            field: field.to_string(),
        };

        let keystore_path = section
            .keystore_path
            .clone()
            .or_else(|| from_env(KEYSTORE_PATH_ENV).map(PathBuf::from))
            .ok_or_else(|| missing("keystore_path"))?;
        let keystore_path = if keystore_path.is_relative() {
            root.join(keystore_path)
        } else {
            keystore_path
        };
        if !keystore_path.is_file() {
            return Err(Error::GenericError(format!(
                "keystore not found: {}",
                keystore_path.display()
            )));
        }

        let key_alias = section
            .key_alias
            .clone()
            .or_else(|| from_env(KEY_ALIAS_ENV))
            .ok_or_else(|| missing("key_alias"))?;
        let store_password = section
            .store_password
            .clone()
            .or_else(|| from_env(STORE_PASSWORD_ENV))
            .ok_or_else(|| missing("store_password"))?;
        let key_password = section
            .key_password
            .clone()
            .or_else(|| from_env(KEY_PASSWORD_ENV))
            .unwrap_or_else(|| store_password.clone());

        Ok(Self {
            keystore_path,
            key_alias,
            store_password,
            key_password,
        })
    }

    /// Environment for a signing tool child process.
    pub(crate) fn child_env(&self) -> [(&'static str, &str); 2] {
        [
            (CHILD_STORE_PASSWORD_VAR, self.store_password.as_str()),
            (CHILD_KEY_PASSWORD_VAR, self.key_password.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keystore(dir: &Path) -> PathBuf {
        let path = dir.join("release.jks");
        std::fs::write(&path, b"ks").unwrap();
        path
    }

    #[test]
    fn env_fills_missing_fields_and_key_password_defaults() {
        let dir = tempfile::tempdir().unwrap();
        keystore(dir.path());
        let section = SigningSection {
            keystore_path: Some(PathBuf::from("release.jks")),
            ..Default::default()
        };
        let env = HashMap::from([
            (KEY_ALIAS_ENV.to_string(), "upload".to_string()),
            (STORE_PASSWORD_ENV.to_string(), "s3cret".to_string()),
        ]);

        let config = SigningConfig::resolve(&section, dir.path(), &env).unwrap();
        assert_eq!(config.keystore_path, dir.path().join("release.jks"));
        assert_eq!(config.key_alias, "upload");
        assert_eq!(config.child_env()[1].1, "s3cret");
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn config_wins_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let ks = keystore(dir.path());
        let section = SigningSection {
            keystore_path: Some(ks),
            key_alias: Some("from-config".into()),
            store_password: Some("a".into()),
            key_password: Some("b".into()),
        };
        let env = HashMap::from([(KEY_ALIAS_ENV.to_string(), "from-env".to_string())]);
        let config = SigningConfig::resolve(&section, dir.path(), &env).unwrap();
        assert_eq!(config.key_alias, "from-config");
        assert_eq!(config.child_env()[1].1, "b");
    }

    #[test]
    fn missing_keystore_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SigningConfig::resolve(&SigningSection::default(), dir.path(), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::MissingConfig { ref field, .. } if field == "keystore_path"));

        let section = SigningSection {
            keystore_path: Some(PathBuf::from("nope.jks")),
            key_alias: Some("a".into()),
            store_password: Some("p".into()),
            key_password: None,
        };
        let err = SigningConfig::resolve(&section, dir.path(), &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("keystore not found"));
    }
}
