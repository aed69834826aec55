//! The RPC transport every surface of the system speaks: length-delimited
//! frames over TCP carrying `bincode`-encoded messages.
//!
//! One logical call is one request frame followed by one reply frame on the
//! same connection. Connections are persistent; callers that cache one (see
//! [`node_client::NodeClient`]) serialize their calls so request and reply
//! frames stay paired.
pub mod messages;
pub mod node_client;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Frames larger than this are protocol violations; the limit only has to
/// clear the largest chunk a peer may serve in one reply.
const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Transport or codec failure on an RPC connection.
#[derive(Error, Debug)]
pub enum Error {
    #[error("transport failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("message encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("connection closed by remote")]
    Closed,
    #[error("remote answered with an unexpected reply variant")]
    UnexpectedReply,
}

/// A framed, `bincode`-speaking TCP connection.
pub struct Connection {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl Connection {
    /// Dials `addr`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the TCP connection cannot be established.
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }

    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_LENGTH)
            .new_codec();
        Self {
            framed: Framed::new(stream, codec),
        }
    }

    /// Sends one message as one frame.
    ///
    /// # Errors
    ///
    /// Will return `Err` on encoding or transport failure.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> Result<(), Error> {
        let bytes = bincode::serialize(msg)?;
        self.framed.send(Bytes::from(bytes)).await?;
        Ok(())
    }

    /// Receives one frame and decodes it.
    ///
    /// # Errors
    ///
    /// Will return `Err` on transport or decoding failure, and
    /// [`Error::Closed`] when the remote hangs up cleanly.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let frame = self.framed.next().await.ok_or(Error::Closed)??;
        Ok(bincode::deserialize(&frame)?)
    }

    /// One request/reply exchange.
    ///
    /// # Errors
    ///
    /// Will return `Err` if either leg of the exchange fails.
    pub async fn call<Q: Serialize, R: DeserializeOwned>(&mut self, req: &Q) -> Result<R, Error> {
        self.send(req).await?;
        self.recv().await
    }
}
