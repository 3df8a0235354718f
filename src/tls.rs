use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::{self, ServerConfig};
use tracing::info;

/// Failures while building the TLS acceptor. All of them are fatal: the
/// process must not start serving without valid credentials.
#[derive(Debug, Error)]
pub enum TlsConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("invalid certificate/key pair: {0}")]
    Config(#[from] rustls::Error),
}

/// Load a PEM certificate chain and private key and build an acceptor.
/// Both listeners (relay and static page) share the resulting acceptor.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsConfigError> {
    let read_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| TlsConfigError::Read { path, source }
    };

    let mut cert_reader = BufReader::new(File::open(cert_path).map_err(read_err(cert_path))?);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err(cert_path))?;
    if certs.is_empty() {
        return Err(TlsConfigError::NoCertificates(cert_path.to_path_buf()));
    }

    let mut key_reader = BufReader::new(File::open(key_path).map_err(read_err(key_path))?);
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(read_err(key_path))?
        .ok_or_else(|| TlsConfigError::NoPrivateKey(key_path.to_path_buf()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    info!(
        "Loaded TLS credentials from {} / {}",
        cert_path.display(),
        key_path.display()
    );
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("echowire-tls-test-{}", name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_cert_file_is_a_read_error() {
        let missing = Path::new("/definitely/not/here/cert.pem");
        let err = load_acceptor(missing, missing).err().unwrap();
        assert!(matches!(err, TlsConfigError::Read { .. }));
    }

    #[test]
    fn empty_cert_file_yields_no_certificates() {
        let cert = scratch_file("empty-cert.pem", "");
        let key = scratch_file("empty-key.pem", "");
        let err = load_acceptor(&cert, &key).err().unwrap();
        assert!(matches!(err, TlsConfigError::NoCertificates(_)));
    }

    #[test]
    fn key_file_without_key_is_rejected() {
        // a certificate block is not a private key
        let cert_pem = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        let cert = scratch_file("cert-only.pem", cert_pem);
        let key = scratch_file("key-but-cert.pem", cert_pem);
        let err = load_acceptor(&cert, &key).err().unwrap();
        assert!(matches!(err, TlsConfigError::NoPrivateKey(_)));
    }
}
