//! TCP dialing and the optional TLS upgrade.
//!
//! The RPC layer only needs a duplex stream; these helpers produce one for
//! the common case of a TCP socket, optionally wrapped in rustls.

use crate::connection::{ConnectionConfig, TlsClientConfig};
use crate::error::ClientError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Opens the TCP socket, bounded by the connect timeout.
pub async fn connect_tcp(config: &ConnectionConfig) -> Result<TcpStream, ClientError> {
    let tcp = tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.addr))
        .await
        .map_err(|_| {
            tracing::debug!("Connection to {} timed out", config.addr);
            ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to {} timed out", config.addr),
            ))
        })?
        .map_err(|e| {
            tracing::debug!("Connection to {} failed: {}", config.addr, e);
            ClientError::Io(e)
        })?;

    // Requests are small and latency bound.
    tcp.set_nodelay(true).ok();
    tracing::debug!("TCP connected to {}", config.addr);
    Ok(tcp)
}

/// Performs the TLS handshake over an open socket.
pub async fn upgrade_tls(
    tls: &TlsClientConfig,
    addr: &SocketAddr,
    tcp: TcpStream,
) -> Result<TlsStream<TcpStream>, ClientError> {
    if tls.insecure {
        tracing::warn!("Using insecure TLS (certificate verification disabled)");
    }
    let connector = tls_connector(tls)?;
    let server_name = server_name(tls, addr)?;

    tracing::debug!("Performing TLS handshake...");
    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| ClientError::TlsHandshake(e.to_string()))?;
    tracing::debug!("TLS handshake complete");

    Ok(stream)
}

/// Builds the rustls connector described by the configuration.
pub fn tls_connector(tls: &TlsClientConfig) -> Result<TlsConnector, ClientError> {
    let builder = if tls.insecure {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification))
    } else {
        rustls::ClientConfig::builder().with_root_certificates(root_store(tls)?)
    };

    let client_config = match (&tls.client_cert_path, &tls.client_key_path) {
        (Some(cert_path), Some(key_path)) => builder
            .with_client_auth_cert(load_certs(cert_path)?, load_private_key(key_path)?)
            .map_err(|e| ClientError::TlsConfig(format!("invalid client cert/key: {}", e)))?,
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(ClientError::TlsConfig(
                "client certificate and key must be given together".to_string(),
            ))
        }
    };

    Ok(TlsConnector::from(Arc::new(client_config)))
}

fn root_store(tls: &TlsClientConfig) -> Result<RootCertStore, ClientError> {
    let mut store = RootCertStore::empty();
    match tls.ca_cert_path {
        Some(ref ca_path) => {
            for cert in load_certs(ca_path)? {
                store
                    .add(cert)
                    .map_err(|e| ClientError::TlsConfig(format!("invalid CA cert: {}", e)))?;
            }
        }
        None => store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(store)
}

fn server_name(tls: &TlsClientConfig, addr: &SocketAddr) -> Result<ServerName<'static>, ClientError> {
    let name = tls
        .server_name
        .clone()
        .unwrap_or_else(|| addr.ip().to_string());
    ServerName::try_from(name.clone())
        .map_err(|_| ClientError::TlsConfig(format!("invalid server name: {}", name)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ClientError> {
    let file = File::open(path)
        .map_err(|e| ClientError::TlsConfig(format!("cannot open cert file {:?}: {}", path, e)))?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ClientError::TlsConfig(format!("invalid cert file {:?}: {}", path, e)))?;

    if certs.is_empty() {
        return Err(ClientError::TlsConfig(format!(
            "no certificates found in {:?}",
            path
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ClientError> {
    let file = File::open(path)
        .map_err(|e| ClientError::TlsConfig(format!("cannot open key file {:?}: {}", path, e)))?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| ClientError::TlsConfig(format!("invalid key file {:?}: {}", path, e)))?
        .ok_or_else(|| ClientError::TlsConfig(format!("no private key found in {:?}", path)))
}

/// Accepts any server certificate. Development only.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _: &CertificateDer<'_>,
        _: &[CertificateDer<'_>],
        _: &ServerName<'_>,
        _: &[u8],
        _: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
