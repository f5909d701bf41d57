//! # Gateway エラー型
//!
//! 全エンドポイントで共通のエラー型。HTTPクライアントには短いメッセージのみを
//! プレーンテキストで返し、原因の詳細はログに残す。

use axum::http::StatusCode;

use crate::authority::AuthorityError;
use crate::storage::StorageError;
use crate::validation::ValidationError;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 不正なリクエスト（検証失敗、JSON/multipartのパース失敗）
    #[error("{0}")]
    BadRequest(String),
    /// PDF以外のファイル
    #[error("{0}")]
    UnsupportedMediaType(String),
    /// 署名局の呼び出しに失敗
    #[error("{message}")]
    Remote {
        /// クライアントに返すメッセージ
        message: String,
        #[source]
        source: AuthorityError,
    },
    /// ステージングディレクトリへの書き込みに失敗
    #[error("{message}")]
    Persistence {
        /// クライアントに返すメッセージ
        message: String,
        #[source]
        source: StorageError,
    },
}

impl GatewayError {
    /// 署名局エラーをクライアント向けメッセージで包む。
    pub fn remote(message: impl Into<String>, source: AuthorityError) -> Self {
        GatewayError::Remote {
            message: message.into(),
            source,
        }
    }

    /// ストレージエラーをクライアント向けメッセージで包む。
    pub fn persistence(message: impl Into<String>, source: StorageError) -> Self {
        GatewayError::Persistence {
            message: message.into(),
            source,
        }
    }
}

impl From<ValidationError> for GatewayError {
    fn from(e: ValidationError) -> Self {
        GatewayError::BadRequest(e.to_string())
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            GatewayError::Remote { .. } | GatewayError::Persistence { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}
