//! API key resolution for upstream providers
//!
//! Each provider endpoint names the environment variable holding its key
//! (`api_key_env` in config). Keys are never read from the config file.

use glyph_core::{GlyphError, Result};
use std::env;

/// Read the API key from the variable named `env_name`
pub fn resolve_api_key(env_name: &str) -> Result<String> {
    match env::var(env_name) {
        Ok(key) if !key.trim().is_empty() => {
            tracing::debug!("Using API key from {}", env_name);
            Ok(key.trim().to_string())
        }
        _ => Err(GlyphError::Configuration(format!(
            "No API key found. Set {}=<key> for this provider",
            env_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to prevent concurrent env var modifications
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_LOCK.lock().unwrap();

        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let result = f();

        for (key, original) in originals {
            match original {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        result
    }

    #[test]
    fn test_key_is_trimmed() {
        with_env_vars(&[("GLYPH_TEST_KEY_A", Some("  sk-test \n"))], || {
            assert_eq!(resolve_api_key("GLYPH_TEST_KEY_A").unwrap(), "sk-test");
        });
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        with_env_vars(&[("GLYPH_TEST_KEY_B", None)], || {
            let err = resolve_api_key("GLYPH_TEST_KEY_B").unwrap_err();
            assert!(matches!(err, GlyphError::Configuration(_)));
        });
    }

    #[test]
    fn test_blank_key_is_rejected() {
        with_env_vars(&[("GLYPH_TEST_KEY_C", Some("   "))], || {
            assert!(resolve_api_key("GLYPH_TEST_KEY_C").is_err());
        });
    }
}
