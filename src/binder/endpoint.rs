use super::hyper::run_server;
use crate::app::{App, AppInner};
use crate::Error;
use log::debug;
use std::net::{SocketAddr, TcpListener};
use tokio::task::JoinHandle;
use url::Url;

/// A reachable address for the application under test.
///
/// An `Endpoint` is either borrowed (the application was already listening: `release` is a
/// no-op) or owned for the duration of a single request (we started an ephemeral server
/// and `release` shuts it down).
pub(crate) struct Endpoint {
    url: Url,
    server: Option<EphemeralServer>,
}

/// The ephemeral server we started for an unbound application.
struct EphemeralServer {
    address: SocketAddr,
    // When `shutdown_trigger` gets dropped the listening server stops accepting connections.
    shutdown_trigger: tokio::sync::oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Resolve the application to an address, binding it to a random local port if needed.
///
/// Must be called from within a tokio runtime.
pub(crate) fn bind(app: &App) -> Result<Endpoint, Error> {
    match &app.0 {
        AppInner::Listening(url) => {
            debug!("Application already listening on {}", url);
            Ok(Endpoint {
                url: url.clone(),
                server: None,
            })
        }
        AppInner::Invalid(reason) => Err(Error::bind(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            reason.clone(),
        ))),
        AppInner::Unbound(handler) => {
            let listener = TcpListener::bind("127.0.0.1:0").map_err(Error::bind)?;
            let address = listener.local_addr().map_err(Error::bind)?;
            listener.set_nonblocking(true).map_err(Error::bind)?;
            let listener = tokio::net::TcpListener::from_std(listener).map_err(Error::bind)?;
            let url = format!("http://{}", address)
                .parse()
                .map_err(|e| Error::bind(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

            let (shutdown_trigger, shutdown_receiver) = tokio::sync::oneshot::channel();
            let handle = tokio::spawn(run_server(listener, handler.clone(), shutdown_receiver));
            debug!("Bound application to ephemeral address {}", address);

            Ok(Endpoint {
                url,
                server: Some(EphemeralServer {
                    address,
                    shutdown_trigger,
                    handle,
                }),
            })
        }
    }
}

impl Endpoint {
    /// The base url requests should be sent to, e.g. `http://127.0.0.1:4372`.
    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    /// `true` if we started the server behind this endpoint and are responsible for stopping it.
    #[cfg(test)]
    pub(crate) fn is_owned(&self) -> bool {
        self.server.is_some()
    }

    /// Stop the ephemeral server, if we own one, and wait until its port is closed.
    pub(crate) async fn release(mut self) {
        if let Some(server) = self.server.take() {
            let EphemeralServer {
                address,
                shutdown_trigger,
                handle,
            } = server;
            // The server might be gone already (e.g. it panicked): nothing left to stop then.
            let _ = shutdown_trigger.send(());
            let _ = handle.await;
            debug!("Released ephemeral address {}", address);
        }
    }
}

impl Drop for Endpoint {
    // Covers the exit paths that never reach `release` (e.g. the exchange got cancelled).
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.handle.abort();
            debug!("Dropped ephemeral address {}", server.address);
            // `shutdown_trigger` gets dropped here as well.
        }
    }
}
