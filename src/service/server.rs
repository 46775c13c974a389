//! Line-delimited JSON transport for the session protocol.
//!
//! Each request is one JSON object on its own line and is answered by exactly
//! one JSON line. Sessions belong to the connection that started them and are
//! ended when that connection closes.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use ahash::AHashSet;
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::host::SessionHost;
use super::protocol::{Reply, Request};
use crate::error::GymError;
use crate::session::SessionId;

/// Serve on `listen` until Ctrl-C, then shut the host down.
pub async fn serve(host: Arc<SessionHost>, listen: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!(addr = %listener.local_addr()?, "llgym service listening");

    serve_until(host, listener, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl-C");
    })
    .await
}

/// Accept connections on `listener` until `shutdown` resolves, then end every
/// session on `host`.
pub async fn serve_until<F>(host: Arc<SessionHost>, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "failed to accept connection");
                        continue;
                    }
                };
                let host = Arc::clone(&host);
                connections.spawn(async move {
                    if let Err(err) = handle_connection(host, stream, peer).await {
                        warn!(%peer, error = %err, "connection closed with error");
                    }
                });
            }
        }
    }

    connections.shutdown().await;
    tokio::task::spawn_blocking(move || host.shutdown())
        .await
        .context("host shutdown panicked")?;
    info!("llgym service stopped");
    Ok(())
}

async fn handle_connection(host: Arc<SessionHost>, stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
    debug!(%peer, "accepted connection");
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut owned = AHashSet::new();

    let served = async {
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let reply = match serde_json::from_str::<Request>(&line) {
                Ok(request) => dispatch(&host, request, &mut owned).await?,
                Err(err) => Reply::invalid_request(format!("malformed request: {err}")),
            };

            let mut payload = serde_json::to_vec(&reply)?;
            payload.push(b'\n');
            writer.write_all(&payload).await?;
        }
        anyhow::Ok(())
    }
    .await;

    if !owned.is_empty() {
        debug!(%peer, sessions = owned.len(), "ending sessions of closed connection");
        let host = Arc::clone(&host);
        tokio::task::spawn_blocking(move || {
            for id in owned {
                if let Err(err) = host.end_session(id) {
                    warn!(session = %id, error = %err, "failed to end session");
                }
            }
        })
        .await?;
    }
    debug!(%peer, "connection closed");
    served
}

/// Route one request to the host. A connection may only address sessions it
/// started itself; anyone else's id is reported as unknown.
async fn dispatch(
    host: &Arc<SessionHost>,
    request: Request,
    owned: &mut AHashSet<SessionId>,
) -> anyhow::Result<Reply> {
    if let Some(id) = request.session_id() {
        if !owned.contains(&id) {
            return Ok(Reply::from(GymError::SessionNotFound(id)));
        }
    }

    let host = Arc::clone(host);
    let reply = tokio::task::spawn_blocking(move || host.handle(request))
        .await
        .context("request handler panicked")?;

    // Ended sessions stay owned so later requests report them as terminated.
    if let Reply::SessionStarted { session_id } = &reply {
        owned.insert(*session_id);
    }
    Ok(reply)
}
