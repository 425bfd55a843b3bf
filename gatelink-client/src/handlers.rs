//! Pluggable command handlers.
//!
//! The embedding application implements [`CommandHandlers`] for the
//! business logic of the get-data, bake-data, and export-file commands.
//! Every method has a default implementation that logs a warning and
//! replies with a NOTHING result, so an application only overrides what it
//! supports.

use async_trait::async_trait;

use crate::commands::{
    BakeDataCommand, BakeDataReply, ExportFileCommand, ExportFileReply, GetDataCommand,
    GetDataReply,
};
use crate::session::ModelSession;

/// Handler result type.
///
/// Handler failures are caught at the dispatcher boundary and mapped to a
/// failure reply; they never leave the gateway waiting.
pub type HandlerResult<T> = anyhow::Result<T>;

/// Business logic invoked by the command dispatcher.
///
/// Handlers receive the command payload and the resolved session for the
/// referenced model; they may perform additional I/O against the model's
/// backend via [`ModelSession::backend`].
#[async_trait]
pub trait CommandHandlers: Send + Sync {
    /// Handle the get-data command: provide data for a parameter.
    async fn get_data(
        &self,
        command: &GetDataCommand,
        _session: &ModelSession,
    ) -> HandlerResult<GetDataReply> {
        tracing::warn!(
            parameter = %command.parameter.id,
            "received get data command, but no handler is registered"
        );
        Ok(GetDataReply::nothing("No handler registered."))
    }

    /// Handle the bake-data command: accept data from an output.
    async fn bake_data(
        &self,
        command: &BakeDataCommand,
        _session: &ModelSession,
    ) -> HandlerResult<BakeDataReply> {
        tracing::warn!(
            output = %command.output.id,
            "received bake data command, but no handler is registered"
        );
        Ok(BakeDataReply::nothing("No handler registered."))
    }

    /// Handle the export-file command: run an export and fetch the file.
    async fn export_file(
        &self,
        command: &ExportFileCommand,
        _session: &ModelSession,
    ) -> HandlerResult<ExportFileReply> {
        tracing::warn!(
            export = %command.export.id,
            "received export file command, but no handler is registered"
        );
        Ok(ExportFileReply::nothing("No handler registered."))
    }
}

/// Handler set with every method left at its default.
///
/// Used when the embedding application registers no handlers of its own.
#[derive(Debug, Default)]
pub struct DefaultHandlers;

impl CommandHandlers for DefaultHandlers {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ScopedConfig, SessionHandle};
    use crate::commands::{GetDataResult, ModelRef, OutputRef, ParameterRef};
    use gatelink_core::store::Secret;
    use std::collections::HashMap;

    fn dummy_session() -> ModelSession {
        ModelSession {
            config: ScopedConfig {
                base_url: "https://backend.example.com".to_string(),
                access_token: Secret::new("scoped"),
            },
            session: SessionHandle {
                session_id: "s-1".to_string(),
                parameters: HashMap::new(),
                exports: HashMap::new(),
            },
        }
    }

    #[tokio::test]
    async fn default_get_data_replies_nothing() {
        let handlers = DefaultHandlers;
        let command = GetDataCommand {
            model: ModelRef { id: "m-1".to_string() },
            parameter: ParameterRef { id: "p-1".to_string() },
        };

        let reply = handlers.get_data(&command, &dummy_session()).await.unwrap();

        assert_eq!(reply.info.result, GetDataResult::Nothing);
        assert_eq!(reply.info.count, Some(0));
        assert!(reply.asset.is_none());
    }

    #[tokio::test]
    async fn default_bake_data_replies_nothing() {
        let handlers = DefaultHandlers;
        let command = BakeDataCommand {
            model: ModelRef { id: "m-1".to_string() },
            output: OutputRef { id: "o-1".to_string() },
        };

        let reply = handlers.bake_data(&command, &dummy_session()).await.unwrap();

        assert_eq!(reply.info.result, crate::commands::BakeDataResult::Nothing);
    }
}
