//! # TOTP / OTP エンドポイント
//!
//! 署名局に一時コードのメール送信を依頼する3つのエンドポイント。
//! コードは署名者に直接届き、このサービスには返らない。

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use esign_types::{SealActivationBody, SealOtpBody, SignerIdentifier, TotpRequestBody};

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::validation::{self, ValidationError};

/// 空白のみの値を未指定として扱う。
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// JSONボディを取り出す。読み取れないボディは400にする。
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, GatewayError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            tracing::info!("JSONボディの読み取りに失敗: {}", rejection.body_text());
            Err(GatewayError::BadRequest(rejection.body_text()))
        }
    }
}

/// POST /request-totp: 署名用TOTPのメール送信を依頼する。
///
/// NIKとemailの両方があればNIKを使う。NIKの形式はここでは検証しない。
/// どちらも無い場合は署名局を呼ばずに400を返す。
pub async fn handle_request_totp(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<TotpRequestBody>, JsonRejection>,
) -> Result<&'static str, GatewayError> {
    let body = json_body(payload)?;
    let signer = match (non_blank(body.nik), non_blank(body.email)) {
        (Some(nik), _) => SignerIdentifier::Nik(nik),
        (None, Some(email)) => SignerIdentifier::Email(email),
        (None, None) => {
            return Err(GatewayError::BadRequest(
                "Either nik or email is required.".to_string(),
            ))
        }
    };

    tracing::info!(signer = %signer, "TOTPを要求");

    let response = state.authority.request_totp(&signer).await.map_err(|e| {
        tracing::error!(signer = %signer, downstream_status = ?e.status(), "TOTP要求に失敗: {e}");
        GatewayError::remote("Failed to request TOTP.", e)
    })?;

    tracing::info!(signer = %signer, response = %response, "TOTP要求に成功");
    Ok("TOTP requested successfully. Check your email.")
}

/// POST /activate-seal: シール用TOTPをアクティベートする。
///
/// `idSubscriber` が無い場合は署名局を呼ばずに400を返す。
pub async fn handle_activate_seal(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<SealActivationBody>, JsonRejection>,
) -> Result<&'static str, GatewayError> {
    let body = json_body(payload)?;
    let id_subscriber = non_blank(body.id_subscriber);
    let id_subscriber = validation::require(id_subscriber.as_deref(), "idSubscriber")?;

    tracing::info!(id_subscriber = %id_subscriber, "シール用TOTPをアクティベート");

    let response = state
        .authority
        .activate_seal_totp(id_subscriber)
        .await
        .map_err(|e| {
            tracing::error!(
                id_subscriber = %id_subscriber,
                downstream_status = ?e.status(),
                "シール用TOTPのアクティベートに失敗: {e}"
            );
            GatewayError::remote("Failed to activate seal TOTP.", e)
        })?;

    tracing::info!(id_subscriber = %id_subscriber, response = %response, "シール用TOTPをアクティベートしました");
    Ok("Seal TOTP activated. Check your email.")
}

/// POST /request-seal-otp: アクティベーションTOTPをシール用OTPに交換する。
///
/// `idSubscriber` か `totp` が無い場合は署名局を呼ばずに400を返す。
pub async fn handle_request_seal_otp(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<SealOtpBody>, JsonRejection>,
) -> Result<&'static str, GatewayError> {
    let body = json_body(payload)?;
    let id_subscriber = non_blank(body.id_subscriber);
    let totp = non_blank(body.totp);
    let id_subscriber = validation::require(id_subscriber.as_deref(), "idSubscriber")?;
    let totp = totp
        .as_deref()
        .ok_or(ValidationError::MissingField("totp"))?;

    tracing::info!(id_subscriber = %id_subscriber, "シール用OTPを要求");

    let response = state
        .authority
        .request_seal_otp(id_subscriber, totp)
        .await
        .map_err(|e| {
            tracing::error!(
                id_subscriber = %id_subscriber,
                downstream_status = ?e.status(),
                "シール用OTPの要求に失敗: {e}"
            );
            GatewayError::remote("Failed to request seal OTP.", e)
        })?;

    tracing::info!(id_subscriber = %id_subscriber, response = %response, "シール用OTPの要求に成功");
    Ok("Seal OTP requested successfully. Check your email.")
}
