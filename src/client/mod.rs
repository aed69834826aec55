//! The peer client.
//!
//! One client process runs one **client actor** that owns the holdings
//! map: which chunks of which torrents this node can serve, and from which
//! local file. Everything that touches the map goes through the actor's
//! mailbox: offers, downloads finishing chunk by chunk, and serving
//! requests from other peers.
//!
//! The serving listener accepts peer connections and forwards `GetChunk`
//! requests to the actor; downloads run as separate tasks (see
//! [`download`]) and report each verified chunk back so the actor can
//! record it and confirm it to the tracker.
pub mod download;
pub mod error;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub use error::Error;

use crate::servers::signals::{shutdown_signal, Halted};
use crate::shared::bit_torrent::metainfo::{self, ChunkId, Metainfo, TorrentId};
use crate::shared::rpc::messages::{PeerReply, PeerRequest, PeerStatus, Status};
use crate::shared::rpc::node_client::NodeClient;
use crate::shared::rpc::Connection;

/// Mailbox depth for the client actor.
const COMMAND_MAILBOX: usize = 256;

/// One torrent this client holds (some of) locally.
struct LocalFile {
    metainfo: Metainfo,
    path: PathBuf,
    chunks: HashSet<u32>,
}

enum Command {
    Offer {
        metainfo: Metainfo,
        path: PathBuf,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Download {
        metainfo: Metainfo,
        path: PathBuf,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    /// A download task verified and wrote one chunk.
    ChunkDownloaded { chunk: ChunkId },
    GetChunk {
        chunk: ChunkId,
        reply: oneshot::Sender<(PeerStatus, Option<Vec<u8>>)>,
    },
    Close { reply: oneshot::Sender<()> },
}

/// Handle to a running peer client.
pub struct Client {
    host_port: String,
    tx: mpsc::Sender<Command>,
}

impl Client {
    /// Binds the serving listener and starts the client actor.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the serving port cannot be bound.
    pub async fn start(bind_addr: &str) -> std::io::Result<Client> {
        let listener = TcpListener::bind(bind_addr).await?;
        let host_port = listener.local_addr()?.to_string();
        info!(%host_port, "peer client serving");

        let (tx, rx) = mpsc::channel(COMMAND_MAILBOX);
        let (halt_tx, halt_rx) = mpsc::channel(1);

        tokio::spawn(serve_peers(listener, tx.clone(), halt_rx));

        let actor = ClientActor {
            host_port: host_port.clone(),
            files: HashMap::new(),
            tx: tx.clone(),
            halt_tx,
        };
        tokio::spawn(actor.run(rx));

        Ok(Client { host_port, tx })
    }

    /// The address other peers dial to fetch chunks from this client.
    #[must_use]
    pub fn host_port(&self) -> &str {
        &self.host_port
    }

    /// Registers a complete local copy of a torrent's file: records every
    /// chunk in the holdings map and confirms each one to the tracker.
    ///
    /// # Errors
    ///
    /// Will return `Err` if no tracker is reachable, the torrent was never
    /// registered, or a confirmation fails mid-way.
    pub async fn offer(&self, metainfo: Metainfo, path: PathBuf) -> Result<(), Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Offer { metainfo, path, reply })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Downloads a torrent's file to `path`, verifying every chunk.
    ///
    /// # Errors
    ///
    /// Will return `Err` on any fatal download error: no reachable
    /// tracker, a corrupt descriptor, or a chunk no peer could serve.
    pub async fn download(&self, metainfo: Metainfo, path: PathBuf) -> Result<(), Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Download { metainfo, path, reply })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Stops the actor and the serving listener.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Close { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

struct ClientActor {
    host_port: String,
    files: HashMap<TorrentId, LocalFile>,
    tx: mpsc::Sender<Command>,
    halt_tx: mpsc::Sender<Halted>,
}

impl ClientActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Offer { metainfo, path, reply } => {
                    let chunks = (0..metainfo.chunk_count()).collect();
                    self.files.insert(
                        metainfo.id.clone(),
                        LocalFile {
                            metainfo: metainfo.clone(),
                            path,
                            chunks,
                        },
                    );
                    // The chunk hashes are not re-checked here; a peer that
                    // downloads them will verify and move on if they lie.
                    let result = self.offer_to_tracker(&metainfo).await;
                    let _ = reply.send(result);
                }
                Command::Download { metainfo, path, reply } => {
                    self.files.insert(
                        metainfo.id.clone(),
                        LocalFile {
                            metainfo: metainfo.clone(),
                            path: path.clone(),
                            chunks: HashSet::new(),
                        },
                    );
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let result = download::run(metainfo, path, tx).await;
                        let _ = reply.send(result);
                    });
                }
                Command::ChunkDownloaded { chunk } => self.record_downloaded(chunk),
                Command::GetChunk { chunk, reply } => {
                    let _ = reply.send(self.serve_chunk(&chunk).await);
                }
                Command::Close { reply } => {
                    let _ = self.halt_tx.send(Halted::Normal).await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
        debug!(host_port = %self.host_port, "client actor stopped");
    }

    /// Confirms every chunk of a freshly offered file to a tracker.
    async fn offer_to_tracker(&self, metainfo: &Metainfo) -> Result<(), Error> {
        let tracker = responsive_tracker(metainfo).await?;
        for index in 0..metainfo.chunk_count() {
            let chunk = ChunkId {
                torrent: metainfo.id.clone(),
                index,
            };
            match tracker.confirm_chunk(&chunk, &self.host_port).await? {
                Status::Ok => {}
                Status::FileNotFound => {
                    return Err(Error::UnknownTorrent(metainfo.id.clone()));
                }
                status => return Err(Error::TrackerRejected(status)),
            }
        }
        Ok(())
    }

    /// Records a chunk a download task verified, and asynchronously tells
    /// the tracker this node now serves it.
    fn record_downloaded(&mut self, chunk: ChunkId) {
        let Some(file) = self.files.get_mut(&chunk.torrent) else {
            // The entry was dropped while the download ran; nothing to
            // record and nothing to announce.
            return;
        };
        file.chunks.insert(chunk.index);

        let metainfo = file.metainfo.clone();
        let host_port = self.host_port.clone();
        tokio::spawn(async move {
            let result = async {
                let tracker = responsive_tracker(&metainfo).await?;
                tracker.confirm_chunk(&chunk, &host_port).await?;
                Ok::<(), Error>(())
            }
            .await;
            if let Err(e) = result {
                warn!("could not confirm downloaded chunk: {e}");
            }
        });
    }

    /// Serves one chunk request. Every failure collapses to
    /// `ChunkNotFound`: the answer is "can I serve it now?", never why not.
    async fn serve_chunk(&self, chunk: &ChunkId) -> (PeerStatus, Option<Vec<u8>>) {
        let Some(file) = self.files.get(&chunk.torrent) else {
            return (PeerStatus::ChunkNotFound, None);
        };
        if !file.chunks.contains(&chunk.index) {
            return (PeerStatus::ChunkNotFound, None);
        }
        let Ok(mut backing) = tokio::fs::File::open(&file.path).await else {
            return (PeerStatus::ChunkNotFound, None);
        };
        match metainfo::read_chunk(&mut backing, &file.metainfo, chunk.index).await {
            Ok(bytes) => (PeerStatus::Ok, Some(bytes)),
            Err(_) => (PeerStatus::ChunkNotFound, None),
        }
    }
}

/// The serving accept loop: forwards `GetChunk` requests to the actor.
async fn serve_peers(listener: TcpListener, tx: mpsc::Sender<Command>, halt_rx: mpsc::Receiver<Halted>) {
    let halt = shutdown_signal(halt_rx);
    tokio::pin!(halt);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        serve_peer_connection(Connection::new(stream), tx).await;
                    });
                }
                Err(e) => warn!("peer accept failed: {e}"),
            },
            () = &mut halt => break,
        }
    }
}

async fn serve_peer_connection(mut conn: Connection, tx: mpsc::Sender<Command>) {
    loop {
        let request: PeerRequest = match conn.recv().await {
            Ok(request) => request,
            Err(_) => break,
        };
        let PeerRequest::GetChunk { chunk } = request;

        let (reply, rx) = oneshot::channel();
        let (status, chunk) = if tx.send(Command::GetChunk { chunk, reply }).await.is_ok() {
            rx.await.unwrap_or((PeerStatus::ChunkNotFound, None))
        } else {
            (PeerStatus::ChunkNotFound, None)
        };

        if conn.send(&PeerReply::GetChunk { status, chunk }).await.is_err() {
            break;
        }
    }
}

/// Dials the descriptor's tracker nodes in order and returns the first one
/// that accepts a connection. There is no guarantee the connection will
/// not die immediately afterwards.
pub(crate) async fn responsive_tracker(metainfo: &Metainfo) -> Result<NodeClient, Error> {
    for addr in &metainfo.tracker_nodes {
        let client = NodeClient::new(addr.clone());
        if client.ensure_connected().await.is_ok() {
            return Ok(client);
        }
    }
    Err(Error::TrackerUnreachable)
}
