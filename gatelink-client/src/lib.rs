//! # Gatelink Client
//!
//! Gateway peer client for Gatelink.
//!
//! This crate connects an authenticated user to the platform's gateway
//! service and serves the command set a remote operator can send: status
//! heartbeats, capability queries, model preparation, and the get-data /
//! bake-data / export-file business commands. Commands referencing a model
//! lazily resolve a session at that model's backend; sessions are cached
//! per model id and concurrent requests collapse to one resolution.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gatelink_client::{Dispatcher, SupportedData};
//!
//! async fn serve(platform: gatelink_core::PlatformClient) -> anyhow::Result<()> {
//!     let dispatcher = Dispatcher::builder(platform)
//!         .supported_data(SupportedData {
//!             parameter_types: vec!["File".to_string()],
//!             ..Default::default()
//!         })
//!         .connect()
//!         .await?;
//!
//!     println!("serving commands, active: {}", dispatcher.is_active());
//!     dispatcher.join().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod commands;
pub mod connection;
pub mod dispatcher;
pub mod handlers;
pub mod session;

// Re-export main types at crate root
pub use backend::{BackendClient, BackendError, ScopedConfig, SessionHandle};
pub use commands::{
    BakeDataCommand, BakeDataReply, BakeDataResult, CommandFrame, CommandType, ExportFileCommand,
    ExportFileReply, ExportFileResult, GetDataCommand, GetDataReply, GetDataResult, ModelRef,
    PrepareModelCommand, PrepareModelReply, PrepareModelResult, StatusReply, SupportedData,
};
pub use connection::{GatewayConnection, GatewayError};
pub use dispatcher::{CLIENT_NAME, DEFAULT_GATEWAY_ENDPOINT, Dispatcher, DispatcherBuilder, LIVENESS_WINDOW};
pub use handlers::{CommandHandlers, DefaultHandlers, HandlerResult};
pub use session::{ModelSession, SessionError, SessionResolver};
