use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::sync::Arc;

use pgwire::tokio::tokio_rustls::rustls::ServerConfig;
use pgwire::tokio::TlsAcceptor;

use crate::config::Config;

/// TLS acceptor from the configured PEM certificate chain and key, or
/// `None` when TLS is not configured.
pub fn acceptor_from_config(config: &Config) -> io::Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (config.tls_cert.as_deref(), config.tls_key.as_deref()) {
        (None, None) => return Ok(None),
        (Some(c), Some(k)) => (c, k),
        _ => {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "both SPACEBOOK_TLS_CERT and SPACEBOOK_TLS_KEY must be set, or neither",
            ));
        }
    };

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<Result<_, _>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("no certificates found in {cert_path}"),
        ));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "no private key found in key file"))?;

    let mut server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    server_config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cert: Option<&str>, key: Option<&str>) -> Config {
        let mut cfg = Config::from_lookup(|_| None).unwrap();
        cfg.tls_cert = cert.map(String::from);
        cfg.tls_key = key.map(String::from);
        cfg
    }

    #[test]
    fn disabled_without_paths() {
        assert!(acceptor_from_config(&config(None, None)).unwrap().is_none());
    }

    #[test]
    fn half_configured_is_an_error() {
        let err = acceptor_from_config(&config(Some("cert.pem"), None))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn empty_cert_file_is_rejected() {
        let dir = std::env::temp_dir().join("spacebook_test_tls");
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("empty.pem");
        let key = dir.join("empty.key");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();
        let err = acceptor_from_config(&config(cert.to_str(), key.to_str()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("no certificates"));
    }
}
