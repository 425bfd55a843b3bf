//! Gateway connection and framing.
//!
//! The gateway speaks newline-delimited JSON over a TCP stream. This module
//! owns connecting, the registration handshake, and frame-level reads and
//! writes; the serve loop on top lives in the dispatcher.

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, trace};

use crate::commands::{ClientFrame, CommandFrame, GatewayFrame, RegisterRequest};

/// Error type for gateway connection operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The endpoint could not be reached.
    #[error("failed to connect to gateway at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// The gateway rejected the registration request.
    #[error("registration rejected: {message}")]
    Registration { message: String },

    /// The connection closed before the expected frame arrived.
    #[error("connection closed by gateway")]
    ConnectionClosed,

    /// Timed out waiting for the gateway.
    #[error("gateway request timed out")]
    Timeout,

    /// The platform call for the gateway configuration failed.
    #[error("platform error: {0}")]
    Platform(#[from] gatelink_core::platform::PlatformError),

    /// I/O error on the connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Handler for commands whose name is not in the known set.
pub type UnknownCommandHandler = Box<dyn Fn(&CommandFrame) + Send + Sync>;

/// Handler for error messages received from the gateway.
pub type ConnectionErrorHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Handler called when the gateway closes the connection.
pub type DisconnectHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Default unknown-command handler: log the frame.
pub fn default_unknown_command_handler() -> UnknownCommandHandler {
    Box::new(|frame| {
        tracing::info!(command = %frame.name, id = %frame.id, "received unrecognized gateway command");
    })
}

/// Default connection-error handler: log the message.
pub fn default_connection_error_handler() -> ConnectionErrorHandler {
    Box::new(|message| {
        tracing::error!("gateway connection error: {message}");
    })
}

/// Default disconnect handler: log the message.
pub fn default_disconnect_handler() -> DisconnectHandler {
    Box::new(|message| {
        tracing::error!("gateway disconnected: {message}");
    })
}

/// A registered connection to the gateway.
pub struct GatewayConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    handshake_timeout: Duration,
}

impl GatewayConnection {
    /// Connect to a gateway endpoint (`host:port`).
    pub async fn connect(endpoint: &str) -> Result<Self, GatewayError> {
        debug!("connecting to gateway at {endpoint}");

        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|source| GatewayError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            handshake_timeout: Duration::from_secs(10),
        })
    }

    /// Set the registration handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Register this client with the gateway and await the acknowledgement.
    pub async fn register(&mut self, request: RegisterRequest) -> Result<(), GatewayError> {
        self.send(&ClientFrame::Register(request)).await?;

        let frame = tokio::time::timeout(self.handshake_timeout, self.next_frame())
            .await
            .map_err(|_| GatewayError::Timeout)??;

        match frame {
            Some(GatewayFrame::Registered) => {
                debug!("registered with gateway");
                Ok(())
            }
            Some(GatewayFrame::Error { message }) => Err(GatewayError::Registration { message }),
            Some(GatewayFrame::Disconnect { message }) => {
                Err(GatewayError::Registration { message })
            }
            Some(GatewayFrame::Command(_)) => Err(GatewayError::Registration {
                message: "gateway sent a command before acknowledging registration".to_string(),
            }),
            None => Err(GatewayError::ConnectionClosed),
        }
    }

    /// Send a frame, newline-delimited.
    pub async fn send(&mut self, frame: &ClientFrame) -> Result<(), GatewayError> {
        write_frame(&mut self.writer, frame).await
    }

    /// Read the next frame. Returns `Ok(None)` when the gateway closes the
    /// connection.
    pub async fn next_frame(&mut self) -> Result<Option<GatewayFrame>, GatewayError> {
        read_frame(&mut self.reader).await
    }

    /// Split into the raw halves for the serve loop.
    pub fn into_split(self) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        (self.reader, self.writer)
    }
}

/// Read one frame from a split reader. Returns `Ok(None)` on EOF.
pub(crate) async fn read_frame(
    reader: &mut BufReader<OwnedReadHalf>,
) -> Result<Option<GatewayFrame>, GatewayError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    trace!("received frame: {}", line.trim());
    Ok(Some(serde_json::from_str(&line)?))
}

/// Write one frame to a split writer.
pub(crate) async fn write_frame(
    writer: &mut OwnedWriteHalf,
    frame: &ClientFrame,
) -> Result<(), GatewayError> {
    let json = serde_json::to_string(frame)?;
    trace!("sending frame: {json}");
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            token: "at-1".to_string(),
            client_name: "Gatelink Client".to_string(),
            client_version: "0.2.0".to_string(),
            platform: "linux".to_string(),
            host: "test-host".to_string(),
            extension: String::new(),
            instance_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn register_handshake_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = TokioBufReader::new(read_half);

            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let frame: ClientFrame = serde_json::from_str(&line).unwrap();
            assert!(matches!(frame, ClientFrame::Register(_)));

            write_half
                .write_all(b"{\"type\":\"registered\"}\n")
                .await
                .unwrap();
        });

        let mut connection = GatewayConnection::connect(&addr.to_string()).await.unwrap();
        connection.register(register_request()).await.unwrap();

        server.await.unwrap();
    }

    #[tokio::test]
    async fn register_rejection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = TokioBufReader::new(read_half);

            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();

            write_half
                .write_all(b"{\"type\":\"error\",\"message\":\"bad token\"}\n")
                .await
                .unwrap();
        });

        let mut connection = GatewayConnection::connect(&addr.to_string()).await.unwrap();
        let result = connection.register(register_request()).await;

        match result {
            Err(GatewayError::Registration { message }) => assert_eq!(message, "bad token"),
            other => panic!("expected registration error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn connect_to_unreachable_endpoint_fails() {
        // Port 1 is essentially never listening.
        let result = GatewayConnection::connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(GatewayError::Connect { .. })));
    }
}
