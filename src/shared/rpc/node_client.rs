//! Cached RPC connections to tracker nodes, and the ring of all of them a
//! cluster member keeps.
//!
//! A [`NodeClient`] holds at most one live connection, dialled lazily and
//! dropped on the first transport error so the next call re-dials. Calls
//! are serialized with an async mutex held across the whole exchange,
//! which keeps request and reply frames paired.
use tokio::sync::Mutex;

use super::messages::{
    NodeInfo, Operation, PrepareReply, RequestReply, Status, TrackerReply, TrackerRequest,
};
use super::{Connection, Error};
use crate::shared::bit_torrent::metainfo::{ChunkId, Metainfo};

/// A cached connection to one tracker node.
pub struct NodeClient {
    addr: String,
    conn: Mutex<Option<Connection>>,
}

impl NodeClient {
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Dials the node if no connection is cached yet.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the node does not accept the connection.
    pub async fn ensure_connected(&self) -> Result<(), Error> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(Connection::connect(&self.addr).await?);
        }
        Ok(())
    }

    /// One request/reply exchange, re-dialling first if needed. A transport
    /// error evicts the cached connection.
    ///
    /// # Errors
    ///
    /// Will return `Err` if dialling or either leg of the exchange fails.
    pub async fn call(&self, req: &TrackerRequest) -> Result<TrackerReply, Error> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(Connection::connect(&self.addr).await?);
        }
        let conn = guard.as_mut().expect("connection was just established");
        match conn.call(req).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                *guard = None;
                Err(e)
            }
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on transport failure or a mismatched reply.
    pub async fn register(&self, info: &NodeInfo) -> Result<(Status, Vec<NodeInfo>), Error> {
        match self.call(&TrackerRequest::Register { info: info.clone() }).await? {
            TrackerReply::Register { status, nodes } => Ok((status, nodes)),
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on transport failure or a mismatched reply.
    pub async fn prepare(&self, n: u64, slot: u64) -> Result<PrepareReply, Error> {
        match self.call(&TrackerRequest::Prepare { n, slot }).await? {
            TrackerReply::Prepare(reply) => Ok(reply),
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on transport failure or a mismatched reply.
    pub async fn accept(&self, n: u64, slot: u64, op: Operation) -> Result<Status, Error> {
        match self.call(&TrackerRequest::Accept { n, slot, op }).await? {
            TrackerReply::Accept { status } => Ok(status),
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on transport failure or a mismatched reply.
    pub async fn commit(&self, slot: u64, op: Operation) -> Result<u64, Error> {
        match self.call(&TrackerRequest::Commit { slot, op }).await? {
            TrackerReply::Commit { seq } => Ok(seq),
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on transport failure or a mismatched reply.
    pub async fn get_op(&self, slot: u64) -> Result<(Status, Option<Operation>), Error> {
        match self.call(&TrackerRequest::GetOp { slot }).await? {
            TrackerReply::GetOp { status, op } => Ok((status, op)),
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on transport failure or a mismatched reply.
    pub async fn create_entry(&self, metainfo: &Metainfo) -> Result<Status, Error> {
        let req = TrackerRequest::Create {
            metainfo: metainfo.clone(),
        };
        match self.call(&req).await? {
            TrackerReply::Update { status } => Ok(status),
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on transport failure or a mismatched reply.
    pub async fn confirm_chunk(&self, chunk: &ChunkId, peer: &str) -> Result<Status, Error> {
        let req = TrackerRequest::Confirm {
            chunk: chunk.clone(),
            peer: peer.to_owned(),
        };
        match self.call(&req).await? {
            TrackerReply::Update { status } => Ok(status),
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on transport failure or a mismatched reply.
    pub async fn report_missing(&self, chunk: &ChunkId, peer: &str) -> Result<Status, Error> {
        let req = TrackerRequest::Report {
            chunk: chunk.clone(),
            peer: peer.to_owned(),
        };
        match self.call(&req).await? {
            TrackerReply::Update { status } => Ok(status),
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on transport failure or a mismatched reply.
    pub async fn request_chunk(&self, chunk: &ChunkId) -> Result<RequestReply, Error> {
        let req = TrackerRequest::Request { chunk: chunk.clone() };
        match self.call(&req).await? {
            TrackerReply::Request(reply) => Ok(reply),
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on transport failure or a mismatched reply.
    pub async fn get_trackers(&self) -> Result<(Status, Vec<String>), Error> {
        match self.call(&TrackerRequest::GetTrackers).await? {
            TrackerReply::Trackers { status, host_ports } => Ok((status, host_ports)),
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on transport failure or a mismatched reply.
    pub async fn stall(&self, seconds: i64) -> Result<(), Error> {
        match self.call(&TrackerRequest::Stall { seconds }).await? {
            TrackerReply::Stall => Ok(()),
            _ => Err(Error::UnexpectedReply),
        }
    }
}

/// The full cluster mesh: every member, with a cached connection to each,
/// indexed by `node_id`. Built once at bootstrap; membership never changes
/// afterwards.
pub struct Ring {
    nodes: Vec<NodeInfo>,
    clients: Vec<NodeClient>,
}

impl Ring {
    /// Builds the mesh from the bootstrap node list. The list must contain
    /// every `node_id` in `[0, len)` exactly once.
    #[must_use]
    pub fn new(mut nodes: Vec<NodeInfo>) -> Self {
        nodes.sort_by_key(|node| node.node_id);
        let clients = nodes
            .iter()
            .map(|node| NodeClient::new(node.host_port.clone()))
            .collect();
        Self { nodes, clients }
    }

    /// Whether every `node_id` in `[0, len)` appears exactly once.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.nodes
            .iter()
            .enumerate()
            .all(|(i, node)| node.node_id as usize == i)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn client(&self, node_id: usize) -> &NodeClient {
        &self.clients[node_id]
    }

    #[must_use]
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    #[must_use]
    pub fn host_ports(&self) -> Vec<String> {
        self.nodes.iter().map(|node| node.host_port.clone()).collect()
    }

    /// Eagerly dials every member, including this node itself.
    ///
    /// # Errors
    ///
    /// Will return `Err` if any member refuses the connection; at bootstrap
    /// time every listener is already up, so this is fatal.
    pub async fn connect_all(&self) -> Result<(), Error> {
        for client in &self.clients {
            client.ensure_connected().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeInfo, Ring};

    fn node(id: u32) -> NodeInfo {
        NodeInfo {
            host_port: format!("127.0.0.1:{}", 7000 + id),
            node_id: id,
        }
    }

    #[test]
    fn should_index_ring_clients_by_node_id_regardless_of_registration_order() {
        let ring = Ring::new(vec![node(2), node(0), node(1)]);

        assert!(ring.is_well_formed());
        assert_eq!(ring.client(2).addr(), "127.0.0.1:7002");
    }

    #[test]
    fn should_detect_a_gap_in_the_node_ids() {
        let ring = Ring::new(vec![node(0), node(2)]);

        assert!(!ring.is_well_formed());
    }
}
