//! TCP connection to the missive server.
//!
//! The stream is split into a [`FrameReader`] and [`FrameWriter`] pair so the
//! interactive loop can wait for pushed deliveries and user input at the same
//! time.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, warn};

use missive_protocol::{FrameAssembler, RawFrame, Request, WireMode};

use crate::error::{ClientError, ClientResult};

/// Connects to the server and splits the stream into frame halves.
///
/// The session is locked to `mode` from the first request onwards.
pub async fn connect(
    host: &str,
    port: u16,
    mode: WireMode,
    timeout: Duration,
) -> ClientResult<(FrameReader, FrameWriter)> {
    let addr = format!("{}:{}", host, port);
    debug!(%addr, mode = %mode, "connecting to server");

    let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| {
            ClientError::Timeout(format!(
                "connecting to {} after {}s",
                addr,
                timeout.as_secs()
            ))
        })?
        .map_err(|e| ClientError::Connection(format!("failed to connect to {}: {}", addr, e)))?;

    let (reader, writer) = stream.into_split();
    Ok((
        FrameReader {
            reader,
            assembler: FrameAssembler::with_mode(mode),
        },
        FrameWriter { writer, mode },
    ))
}

/// Reads and reassembles frames arriving from the server.
pub struct FrameReader {
    reader: OwnedReadHalf,
    assembler: FrameAssembler,
}

impl FrameReader {
    /// Returns the next complete frame, or `None` when the server closes the
    /// connection between frames.
    pub async fn next_frame(&mut self) -> ClientResult<Option<RawFrame>> {
        loop {
            if let Some(frame) = self.assembler.next_frame()? {
                return Ok(Some(frame));
            }
            let mut chunk = [0u8; 4096];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                if self.assembler.is_between_frames() {
                    return Ok(None);
                }
                return Err(ClientError::Connection(
                    "server closed the connection mid-frame".into(),
                ));
            }
            self.assembler.feed(&chunk[..n]);
        }
    }
}

/// Writes request frames to the server.
pub struct FrameWriter {
    writer: OwnedWriteHalf,
    mode: WireMode,
}

impl FrameWriter {
    /// Wire mode this session is locked to.
    pub fn mode(&self) -> WireMode {
        self.mode
    }

    /// Encodes and sends one request.
    pub async fn send(&mut self, request: &Request) -> ClientResult<()> {
        let frame = request.to_frame(self.mode)?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Closes the write half, telling the server we are done.
    pub async fn shutdown(&mut self) {
        if let Err(error) = self.writer.shutdown().await {
            warn!(%error, "failed to shut down the connection cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use missive_protocol::{Action, Envelope, PROTOCOL_VERSION};
    use missive_server::{
        DeliveryEngine, Dispatcher, MemoryStore, ServerConfig, SocketServer,
    };

    async fn start_server() -> SocketAddr {
        let store = Arc::new(MemoryStore::new());
        let delivery = Arc::new(DeliveryEngine::new(store.clone()));
        let dispatcher = Arc::new(Dispatcher::new(store, delivery));

        let server = SocketServer::new(ServerConfig::new("127.0.0.1", 0))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.run(dispatcher).await });
        addr
    }

    #[tokio::test]
    async fn ping_round_trip() {
        let addr = start_server().await;
        let (mut reader, mut writer) = connect(
            "127.0.0.1",
            addr.port(),
            WireMode::Compact,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        writer.send(&Request::Ping).await.unwrap();
        let frame = reader.next_frame().await.unwrap().expect("reply frame");
        assert_eq!(frame.action, Action::Ping);
        let envelope: Envelope<()> =
            Envelope::from_content(WireMode::Compact, &frame.content).unwrap();
        assert!(envelope.success);
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        // Bind a port, then free it so nothing is listening there.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect(
            "127.0.0.1",
            port,
            WireMode::Structured,
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    #[tokio::test]
    async fn mid_frame_disconnect_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Half a preamble, then hang up.
            stream.write_all(&[PROTOCOL_VERSION, 0]).await.unwrap();
        });

        let (mut reader, _writer) = connect(
            "127.0.0.1",
            addr.port(),
            WireMode::Structured,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let result = reader.next_frame().await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }
}
