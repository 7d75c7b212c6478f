use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{error::ProxyError, framing::MessageFrame, upstream::Upstream};

/// Accepts raw HTTP-framed JSON-RPC messages, one per connection, and relays
/// their bodies to the upstream node.
pub struct TcpProxy {
    pub addr: SocketAddr,
    pub upstream: Arc<Upstream>,
    pub client_timeout: Duration,
}

impl TcpProxy {
    pub fn new(addr: SocketAddr, upstream: Arc<Upstream>, client_timeout: Duration) -> Self {
        Self {
            addr,
            upstream,
            client_timeout,
        }
    }

    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) -> Result<(), ProxyError> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("TCP proxy listening on {}", listener.local_addr()?);
        Self::serve(listener, self.upstream, self.client_timeout, shutdown).await;
        Ok(())
    }

    pub async fn serve(
        listener: TcpListener,
        upstream: Arc<Upstream>,
        client_timeout: Duration,
        shutdown: impl Future<Output = ()> + Send,
    ) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        let upstream = upstream.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, &upstream, client_timeout).await {
                                warn!(%peer, error = %e, "TCP connection aborted");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept TCP connection"),
                },
                _ = &mut shutdown => {
                    info!("TCP proxy stopped");
                    return;
                }
            }
        }
    }
}

/// Serves one request. On error the socket is dropped without a reply.
async fn handle_connection(
    mut socket: TcpStream,
    upstream: &Upstream,
    client_timeout: Duration,
) -> Result<(), ProxyError> {
    let body = read_message(&mut socket, client_timeout).await?;
    debug!(bytes = body.len(), "Relaying TCP message");

    let response = upstream.post_rpc(body).await?;
    socket.write_all(&response).await?;
    socket.shutdown().await?;
    Ok(())
}

async fn read_message(socket: &mut TcpStream, client_timeout: Duration) -> Result<Vec<u8>, ProxyError> {
    let mut frame = MessageFrame::new();
    let mut chunk = vec![0u8; 16 * 1024];
    loop {
        let n = timeout(client_timeout, socket.read(&mut chunk))
            .await
            .map_err(|_| ProxyError::ClientTimeout(client_timeout))??;
        if n == 0 {
            return Err(ProxyError::ClientClosed);
        }
        if let Some(body) = frame.push(&chunk[..n])? {
            return Ok(body);
        }
    }
}
