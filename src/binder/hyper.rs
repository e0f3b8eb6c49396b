use crate::app::Respond;
use crate::{Reply, Request};
use hyper_util::rt::TokioIo;
use log::{debug, warn};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

/// The actual HTTP server wrapping the application under test.
///
/// It accepts connections until `shutdown_signal` resolves: that happens when the owning
/// `Endpoint` sends the signal or is dropped.
/// All in-flight connections are aborted when we stop accepting, which closes the port for good.
pub(super) async fn run_server(
    listener: TcpListener,
    handler: Arc<dyn Respond>,
    mut shutdown_signal: tokio::sync::oneshot::Receiver<()>,
) {
    let mut connections = JoinSet::new();
    loop {
        let stream = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!("Failed to accept a connection: {}", e);
                    continue;
                }
            },
            // Either a poison pill or the sender half being dropped.
            _ = &mut shutdown_signal => break,
        };

        let handler = handler.clone();
        connections.spawn(async move {
            let service = hyper::service::service_fn(move |request| {
                let handler = handler.clone();
                async move {
                    let (response, delay) = match Request::from_hyper(request).await {
                        Ok(request) => {
                            debug!("Received request:\n{}", request);
                            handler.respond(&request).into_hyper()
                        }
                        Err(e) => {
                            warn!("Failed to read an incoming request: {}", e);
                            Reply::new(400).into_hyper()
                        }
                    };
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    Ok::<_, Infallible>(response)
                }
            });

            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Connection closed with an error: {}", e);
            }
        });
    }
    // Dropping the `JoinSet` aborts every connection still being served.
    drop(connections);
    debug!("Ephemeral server stopped accepting connections");
}
