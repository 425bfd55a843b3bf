//! Gateway wire protocol: frames, command DTOs, and reply types.
//!
//! The gateway speaks newline-delimited JSON. Inbound frames are commands
//! addressed to this client (plus error/disconnect notifications); outbound
//! frames are the registration request and command replies. Each command
//! type has a fixed payload/reply shape and a closed result set.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Frames sent by this client to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Register this client as a command-driven peer.
    Register(RegisterRequest),

    /// Reply to a previously received command.
    Reply {
        /// Id of the command being answered.
        id: String,
        payload: serde_json::Value,
    },
}

/// Frames received from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
    /// Acknowledgement of a registration request.
    Registered,

    /// A command addressed to this client.
    Command(CommandFrame),

    /// An error reported by the gateway for this connection.
    Error { message: String },

    /// The gateway is closing the connection.
    Disconnect { message: String },
}

/// An inbound command envelope.
///
/// `name` is matched against the known command set; unrecognized names are
/// routed to the unknown-command handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFrame {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Registration payload sent to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Platform access token proving the user identity.
    pub token: String,
    /// Fixed client display name.
    pub client_name: String,
    /// Version of the embedding application.
    pub client_version: String,
    /// Platform identifier (operating system).
    pub platform: String,
    /// Host identifier.
    pub host: String,
    /// Reserved extension field, currently empty.
    pub extension: String,
    /// Per-process instance id.
    pub instance_id: Uuid,
}

/// The closed set of command types this client serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    Status,
    GetSupportedData,
    PrepareModel,
    GetData,
    BakeData,
    ExportFile,
}

impl CommandType {
    /// Parse a wire command name. Returns `None` for unrecognized names.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Self::Status),
            "getSupportedData" => Some(Self::GetSupportedData),
            "prepareModel" => Some(Self::PrepareModel),
            "getData" => Some(Self::GetData),
            "bakeData" => Some(Self::BakeData),
            "exportFile" => Some(Self::ExportFile),
            _ => None,
        }
    }

    /// Wire name of this command type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::GetSupportedData => "getSupportedData",
            Self::PrepareModel => "prepareModel",
            Self::GetData => "getData",
            Self::BakeData => "bakeData",
            Self::ExportFile => "exportFile",
        }
    }
}

/// Reference to a model by its external id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRef {
    pub id: String,
}

/// Reference to a parameter of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRef {
    pub id: String,
}

/// Reference to an output of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRef {
    pub id: String,
}

/// Reference to an export of a model, with the index of the content entry
/// to fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRef {
    pub id: String,
    pub index: usize,
}

/// Reference to an uploaded asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRef {
    pub id: String,
}

/// Reply to the status (heartbeat) command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    /// Unix seconds of dispatcher construction.
    pub first_activity: i64,
    /// Unix seconds of this reply.
    pub latest_activity: i64,
}

/// Data kinds the registered handlers support.
///
/// The reply to the get-supported-data command. [`Default`] yields the four
/// empty lists; the embedding application fills in what its handlers
/// actually accept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedData {
    #[serde(default)]
    pub parameter_types: Vec<String>,
    #[serde(default)]
    pub type_hints: Vec<String>,
    #[serde(default)]
    pub content_types: Vec<String>,
    #[serde(default)]
    pub file_extensions: Vec<String>,
}

/// Common `info` block of command replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyInfo<R> {
    pub result: R,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

macro_rules! command_result {
    ($name:ident) => {
        /// Closed result set of the corresponding command.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            Success,
            Nothing,
            Error,
        }
    };
}

command_result!(PrepareModelResult);
command_result!(GetDataResult);
command_result!(BakeDataResult);
command_result!(ExportFileResult);

/// Prepare-model command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareModelCommand {
    pub model: ModelRef,
}

/// Prepare-model reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareModelReply {
    pub info: ReplyInfo<PrepareModelResult>,
}

impl PrepareModelReply {
    pub fn success() -> Self {
        Self {
            info: ReplyInfo {
                result: PrepareModelResult::Success,
                message: None,
                count: None,
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            info: ReplyInfo {
                result: PrepareModelResult::Error,
                message: Some(message.into()),
                count: None,
            },
        }
    }
}

/// Get-data command payload: the user requested data for a parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataCommand {
    pub model: ModelRef,
    pub parameter: ParameterRef,
}

/// Get-data reply, optionally carrying the uploaded asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataReply {
    pub info: ReplyInfo<GetDataResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetRef>,
}

impl GetDataReply {
    pub fn success(message: impl Into<String>, count: u32, asset: AssetRef) -> Self {
        Self {
            info: ReplyInfo {
                result: GetDataResult::Success,
                message: Some(message.into()),
                count: Some(count),
            },
            asset: Some(asset),
        }
    }

    pub fn nothing(message: impl Into<String>) -> Self {
        Self {
            info: ReplyInfo {
                result: GetDataResult::Nothing,
                message: Some(message.into()),
                count: Some(0),
            },
            asset: None,
        }
    }
}

/// Bake-data command payload: the user requested baking of an output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakeDataCommand {
    pub model: ModelRef,
    pub output: OutputRef,
}

/// Bake-data reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakeDataReply {
    pub info: ReplyInfo<BakeDataResult>,
}

impl BakeDataReply {
    pub fn success(message: impl Into<String>, count: u32) -> Self {
        Self {
            info: ReplyInfo {
                result: BakeDataResult::Success,
                message: Some(message.into()),
                count: Some(count),
            },
        }
    }

    pub fn nothing(message: impl Into<String>) -> Self {
        Self {
            info: ReplyInfo {
                result: BakeDataResult::Nothing,
                message: Some(message.into()),
                count: Some(0),
            },
        }
    }
}

/// Export-file command payload: parameter values plus the export to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFileCommand {
    pub model: ModelRef,
    pub export: ExportRef,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

/// Export-file reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFileReply {
    pub info: ReplyInfo<ExportFileResult>,
}

impl ExportFileReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            info: ReplyInfo {
                result: ExportFileResult::Success,
                message: Some(message.into()),
                count: None,
            },
        }
    }

    pub fn nothing(message: impl Into<String>) -> Self {
        Self {
            info: ReplyInfo {
                result: ExportFileResult::Nothing,
                message: Some(message.into()),
                count: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_type_round_trips_wire_names() {
        for name in [
            "status",
            "getSupportedData",
            "prepareModel",
            "getData",
            "bakeData",
            "exportFile",
        ] {
            let parsed = CommandType::parse(name).unwrap();
            assert_eq!(parsed.as_str(), name);
        }
        assert!(CommandType::parse("selfDestruct").is_none());
    }

    #[test]
    fn gateway_frame_deserializes_command() {
        let json = r#"{"type":"command","id":"c1","name":"getData","payload":{"model":{"id":"m1"},"parameter":{"id":"p1"}}}"#;
        let frame: GatewayFrame = serde_json::from_str(json).unwrap();
        match frame {
            GatewayFrame::Command(cmd) => {
                assert_eq!(cmd.id, "c1");
                assert_eq!(cmd.name, "getData");
                let payload: GetDataCommand = serde_json::from_value(cmd.payload).unwrap();
                assert_eq!(payload.model.id, "m1");
                assert_eq!(payload.parameter.id, "p1");
            }
            other => panic!("expected command frame, got {:?}", other),
        }
    }

    #[test]
    fn client_frame_serializes_reply() {
        let frame = ClientFrame::Reply {
            id: "c1".to_string(),
            payload: serde_json::json!({"ok": true}),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"reply\""));
        assert!(json.contains("\"id\":\"c1\""));
    }

    #[test]
    fn register_request_uses_camel_case() {
        let request = RegisterRequest {
            token: "at".to_string(),
            client_name: "Gatelink Client".to_string(),
            client_version: "0.2.0".to_string(),
            platform: "linux".to_string(),
            host: "workstation".to_string(),
            extension: String::new(),
            instance_id: Uuid::nil(),
        };
        let json = serde_json::to_string(&ClientFrame::Register(request)).unwrap();
        assert!(json.contains("\"clientName\":\"Gatelink Client\""));
        assert!(json.contains("\"clientVersion\":\"0.2.0\""));
        assert!(json.contains("\"instanceId\""));
    }

    #[test]
    fn status_reply_uses_camel_case() {
        let reply = StatusReply {
            first_activity: 100,
            latest_activity: 200,
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(json, r#"{"firstActivity":100,"latestActivity":200}"#);
    }

    #[test]
    fn result_enums_serialize_screaming() {
        assert_eq!(
            serde_json::to_string(&GetDataResult::Nothing).unwrap(),
            "\"NOTHING\""
        );
        assert_eq!(
            serde_json::to_string(&ExportFileResult::Success).unwrap(),
            "\"SUCCESS\""
        );
    }

    #[test]
    fn nothing_reply_carries_zero_count() {
        let reply = GetDataReply::nothing("No handler registered.");
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["info"]["result"], "NOTHING");
        assert_eq!(json["info"]["count"], 0);
        assert!(json.get("asset").is_none());
    }

    #[test]
    fn supported_data_defaults_to_empty_lists() {
        let data = SupportedData::default();
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["parameterTypes"], serde_json::json!([]));
        assert_eq!(json["typeHints"], serde_json::json!([]));
        assert_eq!(json["contentTypes"], serde_json::json!([]));
        assert_eq!(json["fileExtensions"], serde_json::json!([]));
    }
}
