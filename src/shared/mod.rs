//! Vocabulary shared by the tracker cluster and the peer clients: torrent
//! descriptors and their SHA-1 identifiers, and the framed RPC transport
//! every surface of the system speaks.
pub mod bit_torrent;
pub mod rpc;
