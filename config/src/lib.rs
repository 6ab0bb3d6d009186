//! Environment loading for Tandem, in one place.
//!
//! Keys are applied to the process environment with priority:
//! **existing env > project `.env` > `$XDG_CONFIG_HOME/<app>/config.toml`**.
//! The server reads plain `std::env::var` afterwards; nothing else in the
//! workspace touches configuration files.
//!
//! Keys the server cares about: `TANDEM_LOCAL_BASE_URL` (default
//! `http://localhost:1234`), `TANDEM_RAG_BASE_URL` (default
//! `http://localhost:3002`), `TANDEM_DATA_DIR`, and the hosted-provider
//! credentials (`OPENAI_API_KEY`, `AZURE_OPENAI_API_KEY`).

mod dotenv;
mod xdg_toml;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads both sources and sets every key that is not already present in the
/// process environment. `override_dir` points the `.env` lookup somewhere
/// other than the current directory (used by tests and `--workdir`).
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg = xdg_toml::load_env_map(app_name)?;
    let dotenv = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::BTreeSet<&String> = dotenv.keys().collect();
    keys.extend(xdg.keys());

    for key in keys {
        if std::env::var(key).is_ok() {
            continue;
        }
        if let Some(value) = dotenv.get(key).or_else(|| xdg.get(key)) {
            std::env::set_var(key, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn with_xdg_home<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
        let previous = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", dir);
        let out = f();
        match previous {
            Some(v) => env::set_var("XDG_CONFIG_HOME", v),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
        out
    }

    #[test]
    fn existing_env_always_wins() {
        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(dotenv_dir.path().join(".env"), "TANDEM_TEST_WINNER=dotenv\n").unwrap();
        env::set_var("TANDEM_TEST_WINNER", "env");

        load_and_apply("tandem-test", Some(dotenv_dir.path())).unwrap();
        assert_eq!(env::var("TANDEM_TEST_WINNER").as_deref(), Ok("env"));
        env::remove_var("TANDEM_TEST_WINNER");
    }

    #[test]
    fn dotenv_beats_xdg() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("tandem-test");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "[env]\nTANDEM_TEST_PRIO = \"xdg\"\n",
        )
        .unwrap();
        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(dotenv_dir.path().join(".env"), "TANDEM_TEST_PRIO=dotenv\n").unwrap();

        env::remove_var("TANDEM_TEST_PRIO");
        with_xdg_home(xdg_dir.path(), || {
            load_and_apply("tandem-test", Some(dotenv_dir.path())).unwrap();
        });
        assert_eq!(env::var("TANDEM_TEST_PRIO").as_deref(), Ok("dotenv"));
        env::remove_var("TANDEM_TEST_PRIO");
    }

    #[test]
    fn xdg_applies_when_no_dotenv() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("tandem-test");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "[env]\nTANDEM_TEST_XDG = \"from_xdg\"\n",
        )
        .unwrap();
        let empty = tempfile::tempdir().unwrap();

        env::remove_var("TANDEM_TEST_XDG");
        with_xdg_home(xdg_dir.path(), || {
            load_and_apply("tandem-test", Some(empty.path())).unwrap();
        });
        assert_eq!(env::var("TANDEM_TEST_XDG").as_deref(), Ok("from_xdg"));
        env::remove_var("TANDEM_TEST_XDG");
    }

    #[test]
    fn nothing_configured_is_fine() {
        let empty = tempfile::tempdir().unwrap();
        assert!(load_and_apply("tandem-app-that-does-not-exist", Some(empty.path())).is_ok());
    }

    #[test]
    fn broken_xdg_toml_surfaces_a_parse_error() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("tandem-test");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), "this is not [[ toml\n").unwrap();

        let result = with_xdg_home(xdg_dir.path(), || load_and_apply("tandem-test", None));
        assert!(matches!(result, Err(LoadError::XdgParse(_))));
    }
}
