//! Translation of wire requests into core events.
//!
//! Each handler is a short-lived worker: it builds the event, hands it to
//! the owning actor's mailbox with a one-shot reply channel, waits, and
//! maps the answer back to the wire. A mailbox that is gone (the node is
//! shutting down) degrades to a `Reject` answer; the caller is about to
//! lose the connection anyway.
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::core::paxos::proposer::ProposerEvent;
use crate::core::pending::UpdateTx;
use crate::core::services::event::Event;
use crate::servers::signals::Halted;
use crate::shared::rpc::messages::{
    PrepareReply, RequestReply, Status, TrackerReply, TrackerRequest,
};

/// Handles to everything a connection task needs to service requests.
#[derive(Clone)]
pub struct AppContext {
    pub event_tx: mpsc::Sender<Event>,
    pub proposer_tx: mpsc::UnboundedSender<ProposerEvent>,
    pub halt_tx: mpsc::Sender<Halted>,
}

/// Services one decoded request.
pub async fn handle(request: TrackerRequest, ctx: &AppContext) -> TrackerReply {
    match request {
        TrackerRequest::Register { info } => {
            let (tx, rx) = oneshot::channel();
            send_event(ctx, Event::Register { info, reply: tx }).await;
            match rx.await {
                Ok((status, nodes)) => TrackerReply::Register { status, nodes },
                Err(_) => TrackerReply::Register {
                    status: Status::Reject,
                    nodes: vec![],
                },
            }
        }
        TrackerRequest::Prepare { n, slot } => {
            let (tx, rx) = oneshot::channel();
            send_event(ctx, Event::Prepare { n, slot, reply: tx }).await;
            TrackerReply::Prepare(rx.await.unwrap_or(PrepareReply {
                status: Status::Reject,
                n: 0,
                op: None,
                seq: 0,
            }))
        }
        TrackerRequest::Accept { n, slot, op } => {
            let (tx, rx) = oneshot::channel();
            send_event(ctx, Event::Accept { n, slot, op, reply: tx }).await;
            TrackerReply::Accept {
                status: rx.await.unwrap_or(Status::Reject),
            }
        }
        TrackerRequest::Commit { slot, op } => {
            let (tx, rx) = oneshot::channel();
            send_event(ctx, Event::Commit { slot, op, reply: tx }).await;
            TrackerReply::Commit {
                seq: rx.await.unwrap_or(0),
            }
        }
        TrackerRequest::GetOp { slot } => {
            let (tx, rx) = oneshot::channel();
            send_event(ctx, Event::GetOp { slot, reply: tx }).await;
            let (status, op) = rx.await.unwrap_or((Status::Reject, None));
            TrackerReply::GetOp { status, op }
        }
        TrackerRequest::Create { metainfo } => {
            let (tx, rx) = update_channel();
            send_event(ctx, Event::Create { metainfo, reply: tx }).await;
            update_reply(rx).await
        }
        TrackerRequest::Confirm { chunk, peer } => {
            let (tx, rx) = update_channel();
            send_event(ctx, Event::Confirm { chunk, peer, reply: tx }).await;
            update_reply(rx).await
        }
        TrackerRequest::Report { chunk, peer } => {
            let (tx, rx) = update_channel();
            send_event(ctx, Event::Report { chunk, peer, reply: tx }).await;
            update_reply(rx).await
        }
        TrackerRequest::Request { chunk } => {
            let (tx, rx) = oneshot::channel();
            send_event(ctx, Event::Request { chunk, reply: tx }).await;
            let reply = match rx.await {
                Ok(Ok((peers, chunk_hash))) => RequestReply {
                    status: Status::Ok,
                    peers,
                    chunk_hash: Some(chunk_hash),
                },
                Ok(Err(ref e)) => RequestReply {
                    status: e.into(),
                    peers: vec![],
                    chunk_hash: None,
                },
                Err(_) => RequestReply {
                    status: Status::Reject,
                    peers: vec![],
                    chunk_hash: None,
                },
            };
            TrackerReply::Request(reply)
        }
        TrackerRequest::GetTrackers => {
            let (tx, rx) = oneshot::channel();
            send_event(ctx, Event::GetTrackers { reply: tx }).await;
            match rx.await {
                Ok(host_ports) => TrackerReply::Trackers {
                    status: Status::Ok,
                    host_ports,
                },
                Err(_) => TrackerReply::Trackers {
                    status: Status::Reject,
                    host_ports: vec![],
                },
            }
        }
        TrackerRequest::Stall { seconds } => {
            if seconds > 0 {
                let seconds = u64::try_from(seconds).expect("positive seconds fit in u64");
                info!(seconds, "stalling both actors");
                send_event(ctx, Event::Stall { seconds }).await;
                let _ = ctx.proposer_tx.send(ProposerEvent::Stall { seconds });
            } else {
                info!("shutdown requested over the control channel");
                send_event(ctx, Event::Shutdown).await;
                let _ = ctx.proposer_tx.send(ProposerEvent::Shutdown);
                let _ = ctx.halt_tx.send(Halted::Normal).await;
            }
            TrackerReply::Stall
        }
    }
}

async fn send_event(ctx: &AppContext, event: Event) {
    let _ = ctx.event_tx.send(event).await;
}

fn update_channel() -> (UpdateTx, oneshot::Receiver<Result<(), crate::core::error::Error>>) {
    oneshot::channel()
}

async fn update_reply(rx: oneshot::Receiver<Result<(), crate::core::error::Error>>) -> TrackerReply {
    let status = match rx.await {
        Ok(Ok(())) => Status::Ok,
        Ok(Err(ref e)) => e.into(),
        Err(_) => Status::Reject,
    };
    TrackerReply::Update { status }
}
