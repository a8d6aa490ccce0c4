use crate::errors::ConfigError;
use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Server acceptor and client connector built from one certificate/key pair.
///
/// The client trusts the configured certificate, so peers sharing the same
/// (possibly self-signed) certificate can talk to each other.
#[derive(Clone)]
pub(crate) struct TlsSettings {
    pub(crate) acceptor: TlsAcceptor,
    pub(crate) connector: TlsConnector,
}

impl std::fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TlsSettings")
    }
}

impl TlsSettings {
    pub(crate) fn load(cert_file: &Path, cert_key_file: &Path) -> Result<TlsSettings, ConfigError> {
        let certs = load_certs(cert_file)?;
        let key = load_key(cert_key_file)?;

        let mut roots = RootCertStore::empty();
        for cert in &certs {
            roots.add(cert.clone())?;
        }

        let server_config =
            ServerConfig::builder_with_provider(Arc::new(default_provider()))
                .with_safe_default_protocol_versions()?
                .with_no_client_auth()
                .with_single_cert(certs, key)?;
        let client_config =
            ClientConfig::builder_with_provider(Arc::new(default_provider()))
                .with_safe_default_protocol_versions()?
                .with_root_certificates(roots)
                .with_no_client_auth();

        Ok(TlsSettings {
            acceptor: TlsAcceptor::from(Arc::new(server_config)),
            connector: TlsConnector::from(Arc::new(client_config)),
        })
    }
}

fn open(path: &Path) -> Result<BufReader<File>, ConfigError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|err| ConfigError::Tls(format!("{}: {}", path.display(), err)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ConfigError::Tls(format!("{}: {}", path.display(), err)))?;
    if certs.is_empty() {
        return Err(ConfigError::Tls(format!(
            "{}: no certificate found",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|err| ConfigError::Tls(format!("{}: {}", path.display(), err)))?
        .ok_or_else(|| ConfigError::Tls(format!("{}: no private key found", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_certificate_file_is_a_config_error() {
        let missing = PathBuf::from("/nonexistent/usrv/cert.pem");
        let err = TlsSettings::load(&missing, &missing).unwrap_err();
        assert!(matches!(err, ConfigError::Tls(_)));
    }
}
