//! # アップロードパイプライン
//!
//! 署名とシールで共通の処理フロー。
//!
//! ## 処理フロー
//! 1. 検証済みファイルをステージング
//! 2. 署名局へ中継（`UploadMode` で署名・シールを選択）
//! 3. 成果物を `signed-*` / `sealed-*` として保存
//! 4. 成果物名を含むメッセージを返す
//!
//! どのステップも1回だけ実行し、失敗した時点で打ち切る。
//! 署名局が失敗した場合は成果物ファイルを作らない。

use esign_types::{SealingRequest, SigningRequest};

use crate::config::GatewayState;
use crate::endpoints::form::PendingUpload;
use crate::error::GatewayError;
use crate::storage::ArtifactKind;

/// 署名局に対して実行する操作。
#[derive(Debug, Clone)]
pub enum UploadMode {
    /// NIKによるPDF署名
    Sign(SigningRequest),
    /// 契約者IDによるPDFシール
    Seal(SealingRequest),
}

impl UploadMode {
    fn artifact_kind(&self) -> ArtifactKind {
        match self {
            UploadMode::Sign(_) => ArtifactKind::Signed,
            UploadMode::Seal(_) => ArtifactKind::Sealed,
        }
    }

    /// ログ相関用の識別子（NIKまたは契約者ID）
    fn subject(&self) -> &str {
        match self {
            UploadMode::Sign(r) => &r.nik,
            UploadMode::Seal(r) => &r.id_subscriber,
        }
    }

    fn success_message(&self, artifact_name: &str) -> String {
        match self {
            UploadMode::Sign(_) => {
                format!("File uploaded and signed successfully: {artifact_name}")
            }
            UploadMode::Seal(_) => format!("File sealed successfully: {artifact_name}"),
        }
    }

    fn remote_failure_message(&self) -> &'static str {
        match self {
            UploadMode::Sign(_) => "Failed to sign the PDF using Esign API.",
            UploadMode::Seal(_) => "Failed to seal the PDF using Esign API.",
        }
    }

    fn persist_failure_message(&self) -> &'static str {
        match self {
            UploadMode::Sign(_) => "Failed to save the signed PDF.",
            UploadMode::Seal(_) => "Failed to save the sealed PDF.",
        }
    }
}

/// 検証済みのアップロードをステージング→中継→保存する。
pub async fn run_upload(
    state: &GatewayState,
    mode: UploadMode,
    upload: PendingUpload,
) -> Result<String, GatewayError> {
    let staged = state
        .staging
        .stage_incoming_file(&upload.bytes[..], &upload.original_name, &upload.content_type)
        .await
        .map_err(|e| {
            tracing::error!(subject = %mode.subject(), "アップロードのステージングに失敗: {e}");
            GatewayError::persistence("Failed to store the uploaded PDF.", e)
        })?;

    tracing::info!(
        subject = %mode.subject(),
        staged_name = %staged.staged_name,
        original_name = %staged.original_name,
        size_bytes = staged.size_bytes,
        "署名局へPDFを送信"
    );

    let result = match &mode {
        UploadMode::Sign(request) => state.authority.sign_pdf(&staged, request).await,
        UploadMode::Seal(request) => state.authority.seal_pdf(&staged, request).await,
    };
    let artifact = result.map_err(|e| {
        tracing::error!(
            subject = %mode.subject(),
            staged_name = %staged.staged_name,
            downstream_status = ?e.status(),
            "署名局の呼び出しに失敗: {e}"
        );
        GatewayError::remote(mode.remote_failure_message(), e)
    })?;

    let artifact_name = mode.artifact_kind().artifact_name(&staged.staged_name);
    let path = state
        .staging
        .persist_artifact(&artifact, &artifact_name)
        .await
        .map_err(|e| {
            tracing::error!(
                subject = %mode.subject(),
                staged_name = %staged.staged_name,
                "成果物の保存に失敗: {e}"
            );
            GatewayError::persistence(mode.persist_failure_message(), e)
        })?;

    tracing::info!(
        subject = %mode.subject(),
        path = %path.display(),
        bytes = artifact.len(),
        "成果物を保存"
    );

    Ok(mode.success_message(&artifact_name))
}
