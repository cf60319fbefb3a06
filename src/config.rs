use std::fs::{File, create_dir_all};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

const DATABASE_DIR: &str = "database";
const BIND_ADDR: &str = "127.0.0.1:8051";
const APPLETS_FILE: &str = "applet_state.json";
const USERS_FILE: &str = "users.json";

/// Runtime settings, read from `ZENDO_*` environment variables
///
/// The server identifies users by the `x-zendo-user` request header and does
/// not check it. Bind to an address only an authenticating proxy can reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding `users.json` and `applet_state.json`
    pub database_dir: PathBuf,

    /// Address the HTTP server listens on
    pub bind_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_dir: PathBuf::from(DATABASE_DIR),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8051)),
        }
    }
}

impl Config {
    /// Build the configuration from the process environment
    ///
    /// * `ZENDO_DATABASE_DIR` - defaults to `database`
    /// * `ZENDO_BIND_ADDR` - defaults to `127.0.0.1:8051`
    ///
    /// # Errors
    /// * [`ConfigError::InvalidValue`] if `ZENDO_BIND_ADDR` is not a socket address
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_dir = lookup("ZENDO_DATABASE_DIR")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DATABASE_DIR.to_string());

        let bind_addr = lookup("ZENDO_BIND_ADDR").unwrap_or_else(|| BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "ZENDO_BIND_ADDR",
                message: e.to_string(),
            })?;

        Ok(Config {
            database_dir: PathBuf::from(database_dir),
            bind_addr,
        })
    }

    /// Path of the applet records file inside the database directory
    pub fn applets_path(&self) -> PathBuf {
        self.database_dir.join(APPLETS_FILE)
    }

    /// Path of the user directory file inside the database directory
    pub fn users_path(&self) -> PathBuf {
        self.database_dir.join(USERS_FILE)
    }

    /// Create the database directory and empty data files if they don't exist
    ///
    /// Existing files are left untouched.
    ///
    /// # Returns
    /// * `std::io::Result<()>` - Success or an IO error
    pub fn init_database(&self) -> std::io::Result<()> {
        create_dir_all(&self.database_dir)?;

        for path in [self.users_path(), self.applets_path()] {
            create_if_missing(&path)?;
        }

        Ok(())
    }
}

fn create_if_missing(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        let mut file = File::create(path)?;
        file.write_all(b"[]")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.applets_path(), PathBuf::from("database/applet_state.json"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("ZENDO_DATABASE_DIR", "/tmp/zendo"),
            ("ZENDO_BIND_ADDR", "0.0.0.0:9000"),
        ]))
        .unwrap();
        assert_eq!(config.users_path(), PathBuf::from("/tmp/zendo/users.json"));
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_bad_bind_addr() {
        let err = Config::from_lookup(lookup_from(&[("ZENDO_BIND_ADDR", "localhost")]))
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid value for ZENDO_BIND_ADDR"));
    }

    #[test]
    fn test_init_database_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_dir: dir.path().join("db"),
            ..Config::default()
        };
        config.init_database().unwrap();

        assert_eq!(std::fs::read_to_string(config.users_path()).unwrap(), "[]");
        assert!(config.applets_path().exists());
    }
}
