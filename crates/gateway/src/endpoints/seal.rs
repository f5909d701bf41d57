//! # POST /seal-pdf
//!
//! 契約者IDによるPDFシール。

use std::sync::Arc;

use axum::extract::{Multipart, State};
use esign_types::SealingRequest;

use crate::config::GatewayState;
use crate::endpoints::form::UploadForm;
use crate::endpoints::upload::{run_upload, UploadMode};
use crate::error::GatewayError;
use crate::validation::{self, ValidationError};

/// POST /seal-pdf: PDFをアップロードし、署名局でシールする。
///
/// multipart: `pdf`, `idSubscriber`, `totp`, `visual`, `location?`, `reason?`
pub async fn handle_seal(
    State(state): State<Arc<GatewayState>>,
    multipart: Multipart,
) -> Result<String, GatewayError> {
    let form = UploadForm::read(multipart, "pdf").await?;

    let request = build_sealing_request(&form).inspect_err(|e| {
        tracing::info!("シールリクエストの検証に失敗: {e}");
    })?;
    if let Err(e) = validation::validate_file(form.file.as_ref()) {
        tracing::info!(id_subscriber = %request.id_subscriber, "ファイルの検証に失敗: {e}");
        return Err(e.into());
    }
    let upload = form.file.ok_or(ValidationError::MissingFile)?;

    tracing::info!(
        id_subscriber = %request.id_subscriber,
        original_name = %upload.original_name,
        "シールリクエストを受信"
    );

    run_upload(&state, UploadMode::Seal(request), upload).await
}

fn build_sealing_request(form: &UploadForm) -> Result<SealingRequest, ValidationError> {
    Ok(SealingRequest {
        id_subscriber: validation::require(form.text("idSubscriber"), "idSubscriber")?
            .to_string(),
        totp: validation::require(form.text("totp"), "totp")?.to_string(),
        visual: validation::parse_visual_option(form.text("visual"))?,
        location: form.text("location").map(str::to_string),
        reason: form.text("reason").map(str::to_string),
    })
}
