//! # multipartフォームの受信
//!
//! アップロードフォームを読み取り、テキストフィールドとPDFファイルパートに分ける。
//! ファイルはこの時点ではメモリ上に保持し、検証に通った後でステージングする。

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;

use crate::error::GatewayError;
use crate::validation::ValidationError;

/// PDFとして受け付けるContent-Type
const PDF_MIME_TYPE: &str = "application/pdf";

/// 受信済み・未ステージングのファイルパート。
#[derive(Debug, Clone)]
pub struct PendingUpload {
    /// クライアントが送ったファイル名
    pub original_name: String,
    /// 宣言されたContent-Type
    pub content_type: String,
    /// ファイル内容
    pub bytes: Bytes,
}

impl PendingUpload {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// 受信したアップロードフォーム。
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    /// ファイルパート（無い場合は `None`）
    pub file: Option<PendingUpload>,
}

impl UploadForm {
    /// multipartボディを最後まで読み取る。
    ///
    /// `file_field` 以外のパートはテキストとして扱う。PDF以外のファイルパートは
    /// ハンドラに到達する前に415で拒否する。空のファイル入力は未指定とみなす。
    pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self, GatewayError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if name == file_field {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;

                if original_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                if !is_pdf(&content_type) {
                    tracing::info!(
                        original_name = %original_name,
                        content_type = %content_type,
                        "PDF以外のファイルを拒否"
                    );
                    return Err(GatewayError::UnsupportedMediaType(
                        "Only PDF files are allowed".to_string(),
                    ));
                }

                form.file = Some(PendingUpload {
                    original_name,
                    content_type,
                    bytes,
                });
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// テキストフィールドを受信したまま取り出す。トリムはしない。
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// テキストフィールドを取り出す。空白のみの値は未指定とみなす。
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

fn is_pdf(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(PDF_MIME_TYPE))
}

/// multipartの読み取りエラーを400に変換する。
/// ボディサイズ上限に達した場合はファイルサイズ超過として扱う。
///
/// 上限超過はボディの読み取り中に検出されるため、`/sign` でもNIKの検証より先に
/// このエラーが返る。
fn multipart_error(e: MultipartError) -> GatewayError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ValidationError::FileTooLarge.into();
    }
    tracing::info!("multipartの読み取りに失敗: {}", e.body_text());
    GatewayError::BadRequest(e.body_text())
}
