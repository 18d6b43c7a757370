use std::{fs::File, io::BufReader, net::SocketAddr, path::Path, sync::Arc};

use anyhow::{Context as _, Result};
use hyper_util::{
    rt::{TokioExecutor, TokioIo as HyperSocket},
    server::conn::auto::Builder,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{ServerConfig, crypto::aws_lc_rs},
};
use tracing::{debug, error, info};

use crate::{config::Tls, service::RelayService};

/// HTTP server that accepts connections and hands them to the relay service.
pub struct Server {
    /// The TCP listener for accepting incoming connections
    connection: TcpListener,
    service: RelayService,
    tls_acceptor: Option<TlsAcceptor>,
    _accept: fn(&Server, RelayService, TcpStream),
}

impl Server {
    /// Creates a new server instance bound to the specified address.
    ///
    /// Connections are served over TLS when `tls_acceptor` is set and over
    /// plain TCP otherwise.
    ///
    /// # Arguments
    ///
    /// * `addr` - The network address to bind to
    /// * `service` - The relay service cloned into every connection
    /// * `tls_acceptor` - Optional TLS acceptor for secure connections
    ///
    /// # Returns
    ///
    /// Returns the bound server, or an error if the address cannot be bound.
    pub async fn new(
        addr: SocketAddr,
        service: RelayService,
        tls_acceptor: Option<TlsAcceptor>,
    ) -> Result<Self> {
        let connection = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        Ok(Self {
            _accept: if tls_acceptor.is_some() {
                debug!("Setting up tls acceptor");
                Self::_tls_acceptor
            } else {
                debug!("Setting up non-tls acceptor");
                Self::_non_tls_acceptor
            },
            connection,
            tls_acceptor,
            service,
        })
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.connection.local_addr()?)
    }

    fn _non_tls_acceptor(_: &Self, service: RelayService, conn: TcpStream) {
        let io = HyperSocket::new(conn);

        tokio::spawn(async move {
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                error!("Error serving non tls connection: {:?}", e);
            }
        });
    }

    fn _tls_acceptor(server: &Self, service: RelayService, conn: TcpStream) {
        let Some(acceptor) = server.tls_acceptor.clone() else {
            error!("tls acceptor selected without tls configuration");
            return;
        };

        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(conn).await {
                Ok(tls_stream) => tls_stream,
                Err(err) => {
                    error!("failed to perform tls handshake: {err:#}");
                    return;
                }
            };
            let io = HyperSocket::new(tls_stream);
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                error!("Error serving tls connection: {:?}", e);
            }
        });
    }

    /// Accepts a new connection and spawns a task to handle it.
    ///
    /// The task serves every request on the connection with a copy of the
    /// relay service bound to the peer address.
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` once the connection is handed to its task, or an error
    /// if accepting from the listener fails.
    pub async fn accept(&self) -> Result<()> {
        let (conn, address) = self.connection.accept().await?;
        debug!("Accepted connection from {}", address);

        (self._accept)(self, self.service.for_peer(address), conn);
        Ok(())
    }

    /// Accepts connections until the task is dropped. Accept errors are logged
    /// and do not stop the loop.
    pub async fn run(self) {
        match self.local_addr() {
            Ok(addr) => info!("Accepting connections on {}", addr),
            Err(e) => error!("Listener has no local address: {}", e),
        }
        loop {
            if let Err(e) = self.accept().await {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Builds a TLS acceptor from the PEM files named in `tls`.
pub fn tls_acceptor(tls: &Tls) -> Result<TlsAcceptor> {
    let certs = load_certs(&tls.certificate)?;
    let key = load_private_key(&tls.private_key)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("building tls server config")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(
    path: &Path,
) -> Result<Vec<tokio_rustls::rustls::pki_types::CertificateDer<'static>>> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("opening certificate {}", path.display()))?,
    );
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading certificate {}", path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("no certificate found in {}", path.display());
    }
    Ok(certs)
}

fn load_private_key(
    path: &Path,
) -> Result<tokio_rustls::rustls::pki_types::PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("opening private key {}", path.display()))?,
    );
    rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("reading private key {}", path.display()))?
        .with_context(|| format!("no private key found in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("mbta-relay-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_certificate_file_is_an_error() {
        let tls = Tls {
            certificate: PathBuf::from("/nonexistent/mbta-relay/cert.pem"),
            private_key: PathBuf::from("/nonexistent/mbta-relay/key.pem"),
        };
        let Err(err) = tls_acceptor(&tls) else {
            panic!("tls acceptor built without a certificate");
        };
        assert!(format!("{err:#}").contains("opening certificate"));
    }

    #[test]
    fn pem_without_certificates_is_an_error() {
        let cert = temp_file("empty-cert.pem", "not a pem file\n");
        let err = load_certs(&cert).unwrap_err();
        std::fs::remove_file(&cert).ok();
        assert!(err.to_string().contains("no certificate found"));
    }

    #[test]
    fn pem_without_key_is_an_error() {
        let key = temp_file("empty-key.pem", "");
        let err = load_private_key(&key).unwrap_err();
        std::fs::remove_file(&key).ok();
        assert!(err.to_string().contains("no private key found"));
    }

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let upstream = crate::upstream::Upstream::new(&crate::config::Config::default()).unwrap();
        let service = RelayService::new(Arc::new(upstream));
        let server = Server::new("127.0.0.1:0".parse().unwrap(), service, None)
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }
}
