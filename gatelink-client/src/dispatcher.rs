//! Gateway command dispatcher.
//!
//! The dispatcher runs the startup sequence (endpoint discovery, connect,
//! register) and then serves inbound commands: status heartbeats re-arm the
//! liveness window, capability queries return the supported-data set, and
//! the model commands resolve a session before delegating to the pluggable
//! handlers. Every command receives exactly one reply; a failing handler is
//! mapped to a failure reply instead of leaving the gateway waiting.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gatelink_core::platform::{GatewayConfig, PlatformClient};

use crate::commands::{
    BakeDataCommand, BakeDataReply, ClientFrame, CommandFrame, CommandType, ExportFileCommand,
    ExportFileReply, GatewayFrame, GetDataCommand, GetDataReply, PrepareModelCommand,
    PrepareModelReply, RegisterRequest, StatusReply, SupportedData,
};
use crate::connection::{
    self, ConnectionErrorHandler, DisconnectHandler, GatewayConnection, GatewayError,
    UnknownCommandHandler, default_connection_error_handler, default_disconnect_handler,
    default_unknown_command_handler,
};
use crate::handlers::{CommandHandlers, DefaultHandlers};
use crate::session::SessionResolver;

/// Endpoint used when the gateway configuration advertises none.
pub const DEFAULT_GATEWAY_ENDPOINT: &str = "gateway.eu-central-1.gatelink.dev:443";

/// Fixed display name sent at registration.
pub const CLIENT_NAME: &str = "Gatelink Client";

/// Grace window after the last status command before the client counts as
/// inactive. The gateway sends status every 30 seconds.
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(35);

/// Liveness signal driven by inbound status commands.
///
/// A single deadline, re-armed on every heartbeat; no timer task runs.
/// Starts expired: the client is inactive until the first status arrives.
struct Liveness {
    window: Duration,
    deadline: Mutex<tokio::time::Instant>,
}

impl Liveness {
    fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: Mutex::new(tokio::time::Instant::now()),
        }
    }

    /// Re-arm the deadline to now + window.
    fn touch(&self) {
        *self.deadline.lock() = tokio::time::Instant::now() + self.window;
    }

    fn is_active(&self) -> bool {
        tokio::time::Instant::now() < *self.deadline.lock()
    }
}

/// Shared state of the serve loop.
struct ServeState {
    first_activity: i64,
    supported_data: SupportedData,
    handlers: Arc<dyn CommandHandlers>,
    sessions: Arc<SessionResolver>,
    liveness: Arc<Liveness>,
    on_unknown_command: UnknownCommandHandler,
    on_connection_error: ConnectionErrorHandler,
    on_disconnect: DisconnectHandler,
}

/// Builder for a [`Dispatcher`].
pub struct DispatcherBuilder {
    platform: PlatformClient,
    supported_data: SupportedData,
    handlers: Arc<dyn CommandHandlers>,
    client_version: String,
    endpoint: Option<String>,
    on_unknown_command: UnknownCommandHandler,
    on_connection_error: ConnectionErrorHandler,
    on_disconnect: DisconnectHandler,
}

impl DispatcherBuilder {
    fn new(platform: PlatformClient) -> Self {
        Self {
            platform,
            supported_data: SupportedData::default(),
            handlers: Arc::new(DefaultHandlers),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            endpoint: None,
            on_unknown_command: default_unknown_command_handler(),
            on_connection_error: default_connection_error_handler(),
            on_disconnect: default_disconnect_handler(),
        }
    }

    /// Data kinds the registered handlers support.
    pub fn supported_data(mut self, supported_data: SupportedData) -> Self {
        self.supported_data = supported_data;
        self
    }

    /// Business-logic handlers for the model commands.
    pub fn handlers(mut self, handlers: Arc<dyn CommandHandlers>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Version string of the embedding application.
    pub fn client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Connect to a fixed endpoint instead of querying the gateway
    /// configuration.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Handler for commands outside the known set.
    pub fn unknown_command_handler(mut self, handler: UnknownCommandHandler) -> Self {
        self.on_unknown_command = handler;
        self
    }

    /// Handler for error messages received from the gateway.
    pub fn connection_error_handler(mut self, handler: ConnectionErrorHandler) -> Self {
        self.on_connection_error = handler;
        self
    }

    /// Handler called when the gateway closes the connection.
    pub fn disconnect_handler(mut self, handler: DisconnectHandler) -> Self {
        self.on_disconnect = handler;
        self
    }

    /// Run the startup sequence and start serving commands.
    pub async fn connect(self) -> Result<Dispatcher, GatewayError> {
        let endpoint = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let config = self.platform.gateway_config().await?;
                choose_endpoint(&config)
            }
        };

        let mut connection = GatewayConnection::connect(&endpoint).await?;

        connection
            .register(RegisterRequest {
                token: self.platform.access_token().expose().to_string(),
                client_name: CLIENT_NAME.to_string(),
                client_version: self.client_version.clone(),
                platform: std::env::consts::OS.to_string(),
                host: host_identifier(),
                extension: String::new(),
                instance_id: Uuid::new_v4(),
            })
            .await?;

        info!("registered with gateway at {endpoint}");

        let liveness = Arc::new(Liveness::new(LIVENESS_WINDOW));
        let sessions = Arc::new(SessionResolver::new(self.platform.clone()));

        let state = Arc::new(ServeState {
            first_activity: Utc::now().timestamp(),
            supported_data: self.supported_data,
            handlers: self.handlers,
            sessions: sessions.clone(),
            liveness: liveness.clone(),
            on_unknown_command: self.on_unknown_command,
            on_connection_error: self.on_connection_error,
            on_disconnect: self.on_disconnect,
        });

        let (reader, writer) = connection.into_split();
        let (reply_tx, reply_rx) = mpsc::channel(32);

        let writer_task = tokio::spawn(write_loop(writer, reply_rx));
        let serve_task = tokio::spawn(serve_loop(reader, reply_tx, state));

        Ok(Dispatcher {
            liveness,
            sessions,
            serve_task,
            writer_task,
        })
    }
}

/// Pick an endpoint from the gateway configuration, falling back to the
/// hardcoded default when none is advertised.
fn choose_endpoint(config: &GatewayConfig) -> String {
    match config.any_endpoint() {
        Some(endpoint) => endpoint.to_string(),
        None => {
            warn!(
                "gateway configuration advertises no endpoint, using default {}",
                DEFAULT_GATEWAY_ENDPOINT
            );
            DEFAULT_GATEWAY_ENDPOINT.to_string()
        }
    }
}

/// Host identifier sent at registration.
fn host_identifier() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

/// A running gateway dispatcher.
pub struct Dispatcher {
    liveness: Arc<Liveness>,
    sessions: Arc<SessionResolver>,
    serve_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl Dispatcher {
    /// Start building a dispatcher over an authenticated platform client.
    pub fn builder(platform: PlatformClient) -> DispatcherBuilder {
        DispatcherBuilder::new(platform)
    }

    /// True while the liveness window has not expired, i.e. a status
    /// command arrived within the last 35 seconds.
    pub fn is_active(&self) -> bool {
        self.liveness.is_active()
    }

    /// The session resolver shared with the serve loop.
    pub fn sessions(&self) -> Arc<SessionResolver> {
        self.sessions.clone()
    }

    /// Wait until the gateway closes the connection.
    pub async fn join(self) {
        let _ = self.serve_task.await;
        let _ = self.writer_task.await;
    }

    /// Stop serving immediately.
    pub fn shutdown(&self) {
        self.serve_task.abort();
        self.writer_task.abort();
    }
}

/// Forward replies to the gateway until every sender is gone.
async fn write_loop(mut writer: OwnedWriteHalf, mut replies: mpsc::Receiver<ClientFrame>) {
    while let Some(frame) = replies.recv().await {
        if let Err(e) = connection::write_frame(&mut writer, &frame).await {
            warn!("failed to send reply to gateway: {e}");
            break;
        }
    }
}

/// Read frames until the gateway disconnects, spawning a task per command.
async fn serve_loop(
    mut reader: BufReader<OwnedReadHalf>,
    reply_tx: mpsc::Sender<ClientFrame>,
    state: Arc<ServeState>,
) {
    loop {
        match connection::read_frame(&mut reader).await {
            Ok(Some(GatewayFrame::Command(command))) => {
                let state = state.clone();
                let reply_tx = reply_tx.clone();
                tokio::spawn(async move {
                    handle_command(command, state, reply_tx).await;
                });
            }
            Ok(Some(GatewayFrame::Error { message })) => {
                (state.on_connection_error)(&message);
            }
            Ok(Some(GatewayFrame::Disconnect { message })) => {
                (state.on_disconnect)(&message);
                break;
            }
            Ok(Some(GatewayFrame::Registered)) => {
                debug!("ignoring duplicate registration acknowledgement");
            }
            Ok(None) => {
                (state.on_disconnect)("connection closed by gateway");
                break;
            }
            Err(GatewayError::Serialization(e)) => {
                // A malformed frame does not tear down the connection.
                (state.on_connection_error)(&format!("malformed frame: {e}"));
            }
            Err(e) => {
                (state.on_disconnect)(&e.to_string());
                break;
            }
        }
    }
}

/// Serve one command and send exactly one reply.
async fn handle_command(
    command: CommandFrame,
    state: Arc<ServeState>,
    reply_tx: mpsc::Sender<ClientFrame>,
) {
    let Some(command_type) = CommandType::parse(&command.name) else {
        (state.on_unknown_command)(&command);
        return;
    };

    let payload = execute(command_type, &command, &state).await;

    if reply_tx
        .send(ClientFrame::Reply {
            id: command.id.clone(),
            payload,
        })
        .await
        .is_err()
    {
        warn!(id = %command.id, "reply channel closed before command could be answered");
    }
}

/// Execute a command; every branch produces a reply payload.
async fn execute(
    command_type: CommandType,
    command: &CommandFrame,
    state: &ServeState,
) -> serde_json::Value {
    match command_type {
        CommandType::Status => {
            state.liveness.touch();
            to_value(&StatusReply {
                first_activity: state.first_activity,
                latest_activity: Utc::now().timestamp(),
            })
        }

        CommandType::GetSupportedData => to_value(&state.supported_data),

        CommandType::PrepareModel => {
            let parsed: PrepareModelCommand = match serde_json::from_value(command.payload.clone())
            {
                Ok(parsed) => parsed,
                Err(e) => return to_value(&PrepareModelReply::error(format!("malformed payload: {e}"))),
            };

            match state.sessions.resolve(&parsed.model.id).await {
                Ok(_) => to_value(&PrepareModelReply::success()),
                Err(e) => {
                    warn!(model_id = %parsed.model.id, "prepare model failed: {e}");
                    to_value(&PrepareModelReply::error(e.to_string()))
                }
            }
        }

        CommandType::GetData => {
            let parsed: GetDataCommand = match serde_json::from_value(command.payload.clone()) {
                Ok(parsed) => parsed,
                Err(e) => return to_value(&GetDataReply::nothing(format!("malformed payload: {e}"))),
            };

            let session = match state.sessions.resolve(&parsed.model.id).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(model_id = %parsed.model.id, "session resolution failed: {e}");
                    return to_value(&GetDataReply::nothing(format!("session resolution failed: {e}")));
                }
            };

            match state.handlers.get_data(&parsed, &session).await {
                Ok(reply) => to_value(&reply),
                Err(e) => {
                    warn!(parameter = %parsed.parameter.id, "get data handler failed: {e}");
                    to_value(&GetDataReply::nothing(format!("handler failed: {e}")))
                }
            }
        }

        CommandType::BakeData => {
            let parsed: BakeDataCommand = match serde_json::from_value(command.payload.clone()) {
                Ok(parsed) => parsed,
                Err(e) => return to_value(&BakeDataReply::nothing(format!("malformed payload: {e}"))),
            };

            let session = match state.sessions.resolve(&parsed.model.id).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(model_id = %parsed.model.id, "session resolution failed: {e}");
                    return to_value(&BakeDataReply::nothing(format!("session resolution failed: {e}")));
                }
            };

            match state.handlers.bake_data(&parsed, &session).await {
                Ok(reply) => to_value(&reply),
                Err(e) => {
                    warn!(output = %parsed.output.id, "bake data handler failed: {e}");
                    to_value(&BakeDataReply::nothing(format!("handler failed: {e}")))
                }
            }
        }

        CommandType::ExportFile => {
            let parsed: ExportFileCommand = match serde_json::from_value(command.payload.clone()) {
                Ok(parsed) => parsed,
                Err(e) => return to_value(&ExportFileReply::nothing(format!("malformed payload: {e}"))),
            };

            let session = match state.sessions.resolve(&parsed.model.id).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(model_id = %parsed.model.id, "session resolution failed: {e}");
                    return to_value(&ExportFileReply::nothing(format!("session resolution failed: {e}")));
                }
            };

            match state.handlers.export_file(&parsed, &session).await {
                Ok(reply) => to_value(&reply),
                Err(e) => {
                    warn!(export = %parsed.export.id, "export file handler failed: {e}");
                    to_value(&ExportFileReply::nothing(format!("handler failed: {e}")))
                }
            }
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test(start_paused = true)]
    async fn liveness_starts_inactive() {
        let liveness = Liveness::new(LIVENESS_WINDOW);
        assert!(!liveness.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_expires_after_window() {
        let liveness = Liveness::new(LIVENESS_WINDOW);

        liveness.touch();
        assert!(liveness.is_active());

        tokio::time::advance(Duration::from_secs(34)).await;
        assert!(liveness.is_active());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!liveness.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_rearms_on_touch() {
        let liveness = Liveness::new(LIVENESS_WINDOW);

        liveness.touch();
        tokio::time::advance(Duration::from_secs(30)).await;
        liveness.touch();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(liveness.is_active());
    }

    #[test]
    fn choose_endpoint_prefers_advertised() {
        let mut endpoint = HashMap::new();
        endpoint.insert("eu".to_string(), "gw.example.com:443".to_string());
        let config = GatewayConfig { endpoint };

        assert_eq!(choose_endpoint(&config), "gw.example.com:443");
    }

    #[test]
    fn choose_endpoint_falls_back_to_default() {
        let config = GatewayConfig::default();
        assert_eq!(choose_endpoint(&config), DEFAULT_GATEWAY_ENDPOINT);
    }
}
