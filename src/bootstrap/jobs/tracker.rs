//! Tracker node job starter.
//!
//! Bringing a node up happens in two phases:
//!
//! 1. [`bind`]: the RPC listener comes up and starts accepting. Nothing is
//!    answered yet beyond queueing, but the master must be dialable before
//!    any slave can register, so this happens first. The bound address is
//!    known from here on, which is also what lets the test harness start a
//!    whole cluster on ephemeral ports.
//! 2. [`BoundTracker::start`]: cluster formation. The master collects
//!    `RegisterServer` calls until every node is known and acknowledged;
//!    slaves register against the master once a second until they get `Ok`.
//!    Then every node dials every other (itself included), and the two
//!    actors start. Requests that arrived during formation were stashed
//!    and are serviced first.
//!
//! A failure anywhere here is fatal to the process; everything after
//! bootstrap is handled by the actors.
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Configuration;
use crate::core::paxos::proposer::{ProposerActor, ProposerEvent};
use crate::core::pending::PendingQueue;
use crate::core::services::event::{Event, EventActor};
use crate::servers::signals::Halted;
use crate::servers::tracker::handlers::AppContext;
use crate::servers::tracker::server;
use crate::shared::rpc;
use crate::shared::rpc::messages::{NodeInfo, Status};
use crate::shared::rpc::node_client::{NodeClient, Ring};

/// Mailbox depth for the event actor. Requests queue here while the actor
/// is stalled or catching up.
const EVENT_MAILBOX: usize = 1024;

/// Bootstrap failure: the only kind of error that kills a tracker process.
#[derive(Error, Debug)]
pub enum Error {
    #[error("could not bind the tracker port: {0}")]
    Listen(#[from] std::io::Error),
    #[error("could not dial the cluster mesh: {0}")]
    Mesh(rpc::Error),
    #[error("registration rejected by the master: {0}")]
    RegisterRejected(Status),
    #[error("cluster formation produced a malformed node list")]
    MalformedCluster,
    #[error("the node shut down during cluster formation")]
    FormationInterrupted,
}

/// A node whose RPC surface is up but whose cluster is not formed yet.
pub struct BoundTracker {
    cfg: Configuration,
    binding: SocketAddr,
    ctx: AppContext,
    event_rx: mpsc::Receiver<Event>,
    proposer_rx: mpsc::UnboundedReceiver<ProposerEvent>,
    server: JoinHandle<()>,
}

/// A fully bootstrapped tracker node.
pub struct RunningTracker {
    binding: SocketAddr,
    ctx: AppContext,
    server: JoinHandle<()>,
    event: JoinHandle<()>,
    proposer: JoinHandle<()>,
}

/// Binds the RPC listener and spawns the accept loop.
///
/// # Errors
///
/// Will return `Err` if the port cannot be bound.
pub async fn bind(cfg: Configuration) -> Result<BoundTracker, Error> {
    let listener = TcpListener::bind(("127.0.0.1", cfg.port)).await?;
    let binding = listener.local_addr()?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_MAILBOX);
    let (proposer_tx, proposer_rx) = mpsc::unbounded_channel();
    let (halt_tx, halt_rx) = mpsc::channel(1);

    let ctx = AppContext {
        event_tx,
        proposer_tx,
        halt_tx,
    };

    let server = server::start(listener, ctx.clone(), halt_rx);

    Ok(BoundTracker {
        cfg,
        binding,
        ctx,
        event_rx,
        proposer_rx,
        server,
    })
}

/// Binds and bootstraps in one go; what the binary uses.
///
/// # Errors
///
/// Will return `Err` on any bootstrap failure.
pub async fn start_job(cfg: Configuration) -> Result<RunningTracker, Error> {
    bind(cfg).await?.start().await
}

impl BoundTracker {
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.binding
    }

    /// Runs cluster formation and starts the actors.
    ///
    /// # Errors
    ///
    /// Will return `Err` if registration fails, the node list is
    /// malformed, or the mesh cannot be dialled.
    pub async fn start(mut self) -> Result<RunningTracker, Error> {
        let host_port = self.binding.to_string();
        let mut stashed = Vec::new();

        let nodes = match self.cfg.master_addr.clone() {
            None => {
                info!(cluster_size = self.cfg.cluster_size, "forming cluster as master");
                master_await_join(&self.cfg, &host_port, &mut self.event_rx, &mut stashed).await?
            }
            Some(master_addr) => {
                info!(%master_addr, "registering with the master");
                slave_await_join(&self.cfg, &host_port, &master_addr).await?
            }
        };

        let ring = Arc::new(Ring::new(nodes));
        if ring.len() != self.cfg.cluster_size || !ring.is_well_formed() {
            return Err(Error::MalformedCluster);
        }
        ring.connect_all().await.map_err(Error::Mesh)?;
        info!(members = ring.len(), "cluster mesh established");

        let pending = Arc::new(PendingQueue::default());

        let proposer = ProposerActor::new(
            &self.cfg,
            Arc::clone(&ring),
            Arc::clone(&pending),
            self.ctx.event_tx.clone(),
            self.ctx.proposer_tx.clone(),
        );
        let proposer = tokio::spawn(proposer.run(self.proposer_rx));

        let event_actor = EventActor::new(
            &self.cfg,
            ring,
            pending,
            self.ctx.event_tx.clone(),
            self.ctx.proposer_tx.clone(),
        );
        let event = tokio::spawn(event_actor.run(self.event_rx, stashed));

        Ok(RunningTracker {
            binding: self.binding,
            ctx: self.ctx,
            server: self.server,
            event,
            proposer,
        })
    }
}

impl RunningTracker {
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.binding
    }

    /// Runs until the node halts (control-channel shutdown).
    pub async fn wait(self) {
        let _ = self.server.await;
    }

    /// Stops the actors and the accept loop. Used by the test harness to
    /// kill a node; the control channel reaches the same path remotely.
    pub async fn shutdown(self) {
        let _ = self.ctx.event_tx.send(Event::Shutdown).await;
        let _ = self.ctx.proposer_tx.send(ProposerEvent::Shutdown);
        let _ = self.ctx.halt_tx.send(Halted::Normal).await;
        let _ = self.server.await;
        let _ = self.event.await;
        let _ = self.proposer.await;
    }
}

/// Collects slave registrations until every node is known and every node
/// has been told `Ok`. Non-registration traffic that arrives meanwhile is
/// stashed for the event actor.
async fn master_await_join(
    cfg: &Configuration,
    host_port: &str,
    event_rx: &mut mpsc::Receiver<Event>,
    stashed: &mut Vec<Event>,
) -> Result<Vec<NodeInfo>, Error> {
    let mut nodes = vec![NodeInfo {
        host_port: host_port.to_owned(),
        node_id: cfg.node_id,
    }];
    let mut seen: HashSet<u32> = HashSet::from([cfg.node_id]);
    let mut acked: HashSet<u32> = HashSet::from([cfg.node_id]);

    while acked.len() < cfg.cluster_size {
        let event = event_rx.recv().await.ok_or(Error::FormationInterrupted)?;
        match event {
            Event::Register { info, reply } => {
                let node_id = info.node_id;
                if seen.insert(node_id) {
                    debug!(node_id, host_port = %info.host_port, "slave registered");
                    nodes.push(info);
                }
                let status = if nodes.len() == cfg.cluster_size {
                    acked.insert(node_id);
                    Status::Ok
                } else {
                    Status::NotReady
                };
                let _ = reply.send((status, nodes.clone()));
            }
            other => stashed.push(other),
        }
    }

    Ok(nodes)
}

/// Registers with the master until it confirms the ring is complete.
/// Retries forever on `NotReady` and on transport errors; the master may
/// simply not be up yet.
async fn slave_await_join(
    cfg: &Configuration,
    host_port: &str,
    master_addr: &str,
) -> Result<Vec<NodeInfo>, Error> {
    let master = NodeClient::new(master_addr);
    let info = NodeInfo {
        host_port: host_port.to_owned(),
        node_id: cfg.node_id,
    };

    loop {
        match master.register(&info).await {
            Ok((Status::Ok, nodes)) => return Ok(nodes),
            Ok((Status::NotReady, _)) | Err(_) => {
                tokio::time::sleep(cfg.register_period).await;
            }
            Ok((status, _)) => return Err(Error::RegisterRejected(status)),
        }
    }
}
