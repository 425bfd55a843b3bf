//! Example command handlers.
//!
//! These handlers demonstrate the command contracts against a resolved
//! model session: get-data uploads a bundled sample file matching the
//! parameter's accepted formats, and export-file runs a download-type
//! export and fetches the result. Real applications replace them with
//! their own business logic.

use async_trait::async_trait;
use tracing::info;

use gatelink_client::backend::{ExportComputeRequest, FileUploadQuery};
use gatelink_client::commands::{
    AssetRef, ExportFileCommand, ExportFileReply, GetDataCommand, GetDataReply, SupportedData,
};
use gatelink_client::handlers::{CommandHandlers, HandlerResult};
use gatelink_client::session::ModelSession;

/// A sample file the get-data handler can supply.
struct SampleFile {
    filename: &'static str,
    content_type: &'static str,
    bytes: &'static [u8],
}

const SAMPLE_JSON: &[u8] = br#"{"name": "gatelink sample", "vertices": [[0,0,0], [1,0,0], [0,1,0]]}"#;

const SAMPLE_FILES: [SampleFile; 1] = [SampleFile {
    filename: "sample.json",
    content_type: "application/json",
    bytes: SAMPLE_JSON,
}];

/// Data kinds these example handlers support.
pub fn supported_data() -> SupportedData {
    SupportedData {
        parameter_types: vec!["File".to_string()],
        content_types: vec!["application/json".to_string()],
        file_extensions: vec!["json".to_string()],
        ..Default::default()
    }
}

/// Find a sample file acceptable to a parameter's format list.
fn find_sample(formats: Option<&Vec<String>>) -> Option<&'static SampleFile> {
    let formats = formats?;
    SAMPLE_FILES
        .iter()
        .find(|sample| formats.iter().any(|f| f == sample.content_type))
}

/// Example handler set.
pub struct ExampleHandlers;

#[async_trait]
impl CommandHandlers for ExampleHandlers {
    async fn get_data(
        &self,
        command: &GetDataCommand,
        session: &ModelSession,
    ) -> HandlerResult<GetDataReply> {
        let parameter_id = &command.parameter.id;

        let Some(definition) = session.session.parameters.get(parameter_id) else {
            return Ok(GetDataReply::nothing(format!(
                "Unknown parameter {parameter_id}."
            )));
        };

        if definition.parameter_type == "File" {
            if let Some(sample) = find_sample(definition.format.as_ref()) {
                let backend = session.backend();

                let slot = backend
                    .request_file_upload(
                        &session.session.session_id,
                        parameter_id,
                        &FileUploadQuery {
                            size: sample.bytes.len(),
                            filename: sample.filename.to_string(),
                            format: sample.content_type.to_string(),
                        },
                    )
                    .await?;

                backend
                    .upload_file(&slot.href, sample.bytes.to_vec(), sample.content_type)
                    .await?;

                info!(parameter = %parameter_id, file = sample.filename, "sample file uploaded");

                return Ok(GetDataReply::success(
                    "File uploaded successfully.",
                    1,
                    AssetRef { id: slot.id },
                ));
            }
        }

        Ok(GetDataReply::nothing("No data available."))
    }

    async fn export_file(
        &self,
        command: &ExportFileCommand,
        session: &ModelSession,
    ) -> HandlerResult<ExportFileReply> {
        let export_id = &command.export.id;

        let Some(definition) = session.session.exports.get(export_id) else {
            return Ok(ExportFileReply::nothing(format!(
                "Unknown export {export_id}."
            )));
        };

        if !definition.is_download() {
            return Ok(ExportFileReply::nothing("Export is not of type download."));
        }

        let backend = session.backend();
        let result = backend
            .compute_export(
                &session.session.session_id,
                export_id,
                &ExportComputeRequest {
                    parameters: command.parameters.clone(),
                    exports: vec![export_id.clone()],
                },
            )
            .await?;

        if !result.is_successful() {
            return Ok(ExportFileReply::nothing(
                "Export computation was not successful.",
            ));
        }

        let Some(content) = result.content.get(command.export.index) else {
            return Ok(ExportFileReply::nothing(format!(
                "Export has no content at index {}.",
                command.export.index
            )));
        };

        let bytes = backend.download(&content.href).await?;

        let filename = result.filename.as_deref().unwrap_or("export.bin");
        let target = std::env::temp_dir().join(filename);
        std::fs::write(&target, &bytes)?;

        info!(export = %export_id, path = %target.display(), "export downloaded");

        Ok(ExportFileReply::success(format!(
            "File {} downloaded successfully ({} bytes).",
            filename,
            bytes.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_data_matches_sample_files() {
        let supported = supported_data();
        assert_eq!(supported.parameter_types, vec!["File"]);
        for sample in &SAMPLE_FILES {
            assert!(supported
                .content_types
                .iter()
                .any(|c| c == sample.content_type));
        }
    }

    #[test]
    fn find_sample_matches_on_content_type() {
        let formats = vec!["application/json".to_string()];
        let sample = find_sample(Some(&formats)).unwrap();
        assert_eq!(sample.filename, "sample.json");

        let other = vec!["model/vnd.3dm".to_string()];
        assert!(find_sample(Some(&other)).is_none());
        assert!(find_sample(None).is_none());
    }
}
