//! Process environment for the duration of a run

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;

use regex::Regex;
use tracing::debug;

use crate::error::RunError;

const KEY_PATTERN: &str = r"^[A-Za-z0-9_]+$";

/// Applies the configured environment and restores the previous values when
/// dropped. Variables that were unset before are removed again.
#[derive(Debug)]
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
}

impl EnvGuard {
    /// Validate every key, then set them all. Nothing is set when any key is
    /// invalid.
    pub fn apply(environment: &BTreeMap<String, String>) -> Result<Self, RunError> {
        let valid = Regex::new(KEY_PATTERN).map_err(|e| RunError::InvalidEnvKey {
            key: e.to_string(),
        })?;
        if let Some(key) = environment.keys().find(|key| !valid.is_match(key)) {
            return Err(RunError::InvalidEnvKey { key: key.clone() });
        }

        let mut previous = Vec::with_capacity(environment.len());
        for (key, value) in environment {
            previous.push((key.clone(), env::var_os(key)));
            debug!("Setting {} for this run", key);
            env::set_var(key, value);
        }
        Ok(Self { previous })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.previous.iter().map(|(key, _)| key.as_str())
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..).rev() {
            match value {
                Some(value) => env::set_var(&key, value),
                None => env::remove_var(&key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_sets_and_restores() {
        env::set_var("BDUI_ENV_TEST_EXISTING", "before");
        env::remove_var("BDUI_ENV_TEST_NEW");

        {
            let guard = EnvGuard::apply(&environment(&[
                ("BDUI_ENV_TEST_EXISTING", "during"),
                ("BDUI_ENV_TEST_NEW", "added"),
            ]))
            .unwrap();
            assert_eq!(guard.keys().count(), 2);
            assert_eq!(env::var("BDUI_ENV_TEST_EXISTING").unwrap(), "during");
            assert_eq!(env::var("BDUI_ENV_TEST_NEW").unwrap(), "added");
        }

        assert_eq!(env::var("BDUI_ENV_TEST_EXISTING").unwrap(), "before");
        assert!(env::var_os("BDUI_ENV_TEST_NEW").is_none());
        env::remove_var("BDUI_ENV_TEST_EXISTING");
    }

    #[test]
    fn test_invalid_key_sets_nothing() {
        env::remove_var("BDUI_ENV_TEST_VALID");
        let err = EnvGuard::apply(&environment(&[
            ("BDUI_ENV_TEST_VALID", "x"),
            ("BAD-KEY", "y"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RunError::InvalidEnvKey { key } if key == "BAD-KEY"));
        assert!(env::var_os("BDUI_ENV_TEST_VALID").is_none());
    }
}
