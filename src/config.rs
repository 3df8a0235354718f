use std::env;
use std::path::PathBuf;

use crate::signaling::DEFAULT_SIGNALING_PORT;
use crate::static_server::DEFAULT_STATIC_PORT;

/// Process configuration, resolved from the environment with loopback-only
/// defaults matching the reference deployment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the signaling relay listener
    pub signaling_addr: String,
    /// Bind address for the static page listener
    pub static_addr: String,
    /// PEM certificate chain, shared by both listeners
    pub cert_path: PathBuf,
    /// PEM private key
    pub key_path: PathBuf,
    /// HTML page served at `/`
    pub page_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signaling_addr: format!("127.0.0.1:{}", DEFAULT_SIGNALING_PORT),
            static_addr: format!("127.0.0.1:{}", DEFAULT_STATIC_PORT),
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("key.pem"),
            page_path: PathBuf::from("index.html"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            signaling_addr: var_or("ECHOWIRE_SIGNALING_ADDR", defaults.signaling_addr),
            static_addr: var_or("ECHOWIRE_STATIC_ADDR", defaults.static_addr),
            cert_path: var_or("ECHOWIRE_CERT", defaults.cert_path),
            key_path: var_or("ECHOWIRE_KEY", defaults.key_path),
            page_path: var_or("ECHOWIRE_PAGE", defaults.page_path),
        }
    }
}

fn var_or<T: From<String>>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(value) if !value.is_empty() => T::from(value),
        _ => default,
    }
}
