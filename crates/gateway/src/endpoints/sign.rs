//! # POST /sign
//!
//! NIKによるPDF署名。
//!
//! NIKとファイルを先に検証し、失敗した場合はステージングも署名局の呼び出しも
//! 行わずに400を返す。

use std::sync::Arc;

use axum::extract::{Multipart, State};
use esign_types::{SignatureProperties, SigningRequest};

use crate::config::GatewayState;
use crate::endpoints::form::UploadForm;
use crate::endpoints::upload::{run_upload, UploadMode};
use crate::error::GatewayError;
use crate::validation::{self, PlacementFields, ValidationError};

/// POST /sign: PDFをアップロードし、署名局で署名する。
///
/// multipart: `pdf`, `nik`, `visual`, `passphrase?`, `totp?`,
/// `page?`, `xAxis?`, `yAxis?`, `width?`, `height?`, `label?`, `location?`, `reason?`
pub async fn handle_sign(
    State(state): State<Arc<GatewayState>>,
    multipart: Multipart,
) -> Result<String, GatewayError> {
    let form = UploadForm::read(multipart, "pdf").await?;
    // NIKは前後の空白も含めて検証する
    let nik = form.raw("nik").unwrap_or_default().to_string();

    if let Err(e) = validation::validate_identity(&nik) {
        tracing::info!(nik = %nik, "NIKの検証に失敗: {e}");
        return Err(e.into());
    }
    if let Err(e) = validation::validate_file(form.file.as_ref()) {
        tracing::info!(nik = %nik, "ファイルの検証に失敗: {e}");
        return Err(e.into());
    }

    let request = build_signing_request(&form, &nik)?;
    let upload = form.file.ok_or(ValidationError::MissingFile)?;

    tracing::info!(
        nik = %nik,
        original_name = %upload.original_name,
        visual = %request.visual,
        "署名リクエストを受信"
    );

    run_upload(&state, UploadMode::Sign(request), upload).await
}

/// フォームから署名要求を組み立てる。
fn build_signing_request(form: &UploadForm, nik: &str) -> Result<SigningRequest, ValidationError> {
    let visual = validation::parse_visual_option(form.text("visual"))?;
    let authorization =
        validation::parse_authorization(form.text("passphrase"), form.text("totp"))?;
    let placement = validation::parse_placement(
        visual,
        PlacementFields {
            page: form.text("page"),
            x: form.text("xAxis"),
            y: form.text("yAxis"),
            width: form.text("width"),
            height: form.text("height"),
        },
    )?;
    let properties = SignatureProperties {
        label: form.text("label").map(str::to_string),
        location: form.text("location").map(str::to_string),
        reason: form.text("reason").map(str::to_string),
    };

    Ok(SigningRequest {
        nik: nik.to_string(),
        visual,
        authorization,
        placement,
        properties: (!properties.is_empty()).then_some(properties),
    })
}
