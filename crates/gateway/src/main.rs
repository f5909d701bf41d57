//! # e-Sign Gateway
//!
//! PDFと署名者情報を受け取り、外部の電子署名局に中継して
//! 署名済み・シール済みPDFをローカルに保存するGateway。
//!
//! ## 役割
//! - NIK・アップロードファイルの検証
//! - ステージングディレクトリへの保存
//! - 署名局のTOTP/OTPハンドシェイクの中継
//! - 署名局へのPDF送信と成果物の保存
//!
//! ## API エンドポイント
//! - `POST /request-totp`: 署名用TOTPのメール送信
//! - `POST /activate-seal`: シール用TOTPのアクティベート
//! - `POST /request-seal-otp`: シール用OTPの発行
//! - `POST /seal-pdf`: PDFシール
//! - `POST /sign`: PDF署名

mod authority;
mod config;
mod endpoints;
mod error;
mod storage;
mod validation;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;

use crate::authority::EsignClient;
use crate::config::{GatewayConfig, GatewayState};
use crate::storage::StagingArea;

/// multipartの境界・テキストフィールド分の余裕
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// ルーターを構築する。
pub(crate) fn build_router(state: Arc<GatewayState>) -> axum::Router {
    let body_limit = validation::MAX_PDF_BYTES as usize + MULTIPART_OVERHEAD_BYTES;

    axum::Router::new()
        .route(
            "/request-totp",
            axum::routing::post(endpoints::handle_request_totp),
        )
        .route(
            "/activate-seal",
            axum::routing::post(endpoints::handle_activate_seal),
        )
        .route(
            "/request-seal-otp",
            axum::routing::post(endpoints::handle_request_seal_otp),
        )
        .route("/seal-pdf", axum::routing::post(endpoints::handle_seal))
        .route("/sign", axum::routing::post(endpoints::handle_sign))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;

    // ステージングディレクトリ（起動時に一度だけ作成）
    let staging = StagingArea::new(&config.staging_dir);
    staging.ensure().await?;
    tracing::info!(staging_dir = %staging.root().display(), "ステージングディレクトリを確認");

    let authority = EsignClient::new(
        reqwest::Client::new(),
        &config.esign_base_url,
        &config.credential,
    )?;
    tracing::info!(esign_base_url = %config.esign_base_url, "署名局クライアントを初期化");

    let state = Arc::new(GatewayState {
        authority: Box::new(authority),
        staging,
    });

    let app = build_router(state);

    tracing::info!("Gatewayを {} で起動します", config.listen_addr);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
