//! `BitTorrent`-flavoured primitives: the whole-file info-hash that anchors
//! a torrent's identity, and the metainfo descriptor with its per-chunk
//! hashes and chunk arithmetic.
pub mod info_hash;
pub mod metainfo;
