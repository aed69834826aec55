//! The accept loop for the tracker RPC surface.
//!
//! Bound before cluster bootstrap begins, because the master must already
//! be reachable when the slaves start registering. Each accepted
//! connection is serviced by its own task until the remote hangs up, a
//! frame fails to decode, or the server halts.
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handlers::{self, AppContext};
use crate::servers::signals::{shutdown_signal, Halted};
use crate::shared::rpc::messages::TrackerRequest;
use crate::shared::rpc::Connection;

/// Spawns the accept loop. It runs until a halt message arrives.
#[must_use]
pub fn start(listener: TcpListener, ctx: AppContext, rx_halt: mpsc::Receiver<Halted>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let binding = listener.local_addr().expect("listener has a local address");
        info!(%binding, "tracker RPC surface listening");

        let halt = shutdown_signal(rx_halt);
        tokio::pin!(halt);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        debug!(%remote, "connection accepted");
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            serve_connection(Connection::new(stream), ctx).await;
                        });
                    }
                    Err(e) => warn!("accept failed: {e}"),
                },
                () = &mut halt => break,
            }
        }

        info!(%binding, "tracker RPC surface stopped");
    })
}

async fn serve_connection(mut conn: Connection, ctx: AppContext) {
    loop {
        let request: TrackerRequest = match conn.recv().await {
            Ok(request) => request,
            Err(crate::shared::rpc::Error::Closed) => break,
            Err(e) => {
                warn!("dropping connection: {e}");
                break;
            }
        };
        let reply = handlers::handle(request, &ctx).await;
        if let Err(e) = conn.send(&reply).await {
            warn!("dropping connection: {e}");
            break;
        }
    }
}
