//! # e-Sign Gateway 共有型定義
//!
//! Gatewayと署名局（Signing Authority）の間でやり取りされるデータ構造を
//! Rust構造体として提供する。
//!
//! ## 命名規則
//! - クライアント向けJSON: `idSubscriber` 等のcamelCase（既存フロントエンド互換）
//! - 署名局向けペイロード: 署名局APIのフィールド名（`tampilan` 等）をそのまま使用

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 1回のOTP要求で対象とするデータ件数。署名局APIの `data` フィールド。
pub const DATA_UNITS_PER_REQUEST: u32 = 1;

// ---------------------------------------------------------------------------
// 識別子・署名オプション
// ---------------------------------------------------------------------------

/// TOTP要求時に署名者を特定する識別子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerIdentifier {
    /// 16桁のNIK（住民番号）
    Nik(String),
    /// 署名者のメールアドレス
    Email(String),
}

impl fmt::Display for SignerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerIdentifier::Nik(nik) => write!(f, "NIK: {nik}"),
            SignerIdentifier::Email(email) => write!(f, "Email: {email}"),
        }
    }
}

/// 署名の可視表示オプション（署名局APIの `tampilan`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualOption {
    /// PDF上に署名欄を描画する
    Visible,
    /// 署名欄を描画しない
    Invisible,
}

impl VisualOption {
    /// 署名局APIに送るワイヤ表現。
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualOption::Visible => "visible",
            VisualOption::Invisible => "invisible",
        }
    }
}

impl fmt::Display for VisualOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知の可視表示オプション。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVisualOption(pub String);

impl FromStr for VisualOption {
    type Err = UnknownVisualOption;

    /// 大文字小文字を区別せずにパースする。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visible" => Ok(VisualOption::Visible),
            "invisible" => Ok(VisualOption::Invisible),
            _ => Err(UnknownVisualOption(s.to_string())),
        }
    }
}

/// PDF署名の認可方式。
///
/// 署名局はパスフレーズまたはTOTPのどちらかで署名者を認可する。
/// `None` の場合はどちらのフィールドも送信せず、判断を署名局に委ねる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationMethod {
    /// 署名者のパスフレーズ
    Passphrase(String),
    /// メールで届いたTOTP
    Totp(String),
    /// 認可情報なし
    None,
}

/// 可視署名の配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// ページ番号（1始まり）
    pub page: u32,
    /// X座標
    pub x: u32,
    /// Y座標
    pub y: u32,
    /// 幅
    pub width: u32,
    /// 高さ
    pub height: u32,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            page: 1,
            x: 0,
            y: 0,
            width: 100,
            height: 50,
        }
    }
}

/// 署名欄に表示する付加情報。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureProperties {
    /// 署名欄のラベル
    pub label: Option<String>,
    /// 署名場所
    pub location: Option<String>,
    /// 署名理由
    pub reason: Option<String>,
}

impl SignatureProperties {
    /// いずれのフィールドも設定されていないか。
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.location.is_none() && self.reason.is_none()
    }
}

// ---------------------------------------------------------------------------
// 署名・シール要求
// ---------------------------------------------------------------------------

/// PDF署名要求。フォームフィールドから1リクエストごとに組み立てる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    /// 検証済みのNIK
    pub nik: String,
    /// 可視表示オプション
    pub visual: VisualOption,
    /// 認可方式
    pub authorization: AuthorizationMethod,
    /// 配置（`Visible` の場合のみ）
    pub placement: Option<Placement>,
    /// 付加情報（いずれかが指定された場合のみ）
    pub properties: Option<SignatureProperties>,
}

/// PDFシール要求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealingRequest {
    /// シール契約者ID
    pub id_subscriber: String,
    /// シール用OTP
    pub totp: String,
    /// 可視表示オプション
    pub visual: VisualOption,
    /// シール場所
    pub location: Option<String>,
    /// シール理由
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// クライアント向けJSONボディ
// ---------------------------------------------------------------------------

/// POST /request-totp のリクエストボディ。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TotpRequestBody {
    /// 署名者のNIK
    #[serde(default)]
    pub nik: Option<String>,
    /// 署名者のメールアドレス
    #[serde(default)]
    pub email: Option<String>,
}

/// POST /activate-seal のリクエストボディ。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealActivationBody {
    /// シール契約者ID
    #[serde(default)]
    pub id_subscriber: Option<String>,
}

/// POST /request-seal-otp のリクエストボディ。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealOtpBody {
    /// シール契約者ID
    #[serde(default)]
    pub id_subscriber: Option<String>,
    /// アクティベーションで届いたTOTP
    #[serde(default)]
    pub totp: Option<String>,
}

// ---------------------------------------------------------------------------
// 署名局向けペイロード
// ---------------------------------------------------------------------------

/// 署名用TOTP要求（`/api/v2/sign/get/totp`）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityTotpRequest {
    /// 署名者のNIK
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nik: Option<String>,
    /// 署名者のメールアドレス
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// 署名対象のファイル数
    pub data: u32,
}

impl AuthorityTotpRequest {
    /// 識別子から要求を構築する。
    pub fn for_signer(signer: &SignerIdentifier) -> Self {
        let (nik, email) = match signer {
            SignerIdentifier::Nik(nik) => (Some(nik.clone()), None),
            SignerIdentifier::Email(email) => (None, Some(email.clone())),
        };
        Self {
            nik,
            email,
            data: DATA_UNITS_PER_REQUEST,
        }
    }
}

/// シール用TOTPアクティベーション要求（`/api/v2/seal/get/activation`）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoritySealActivationRequest {
    /// シール契約者ID
    pub id_subscriber: String,
}

/// シール用OTP要求（`/api/v2/seal/get/totp`）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoritySealOtpRequest {
    /// シール契約者ID
    pub id_subscriber: String,
    /// シール対象のファイル数
    pub data: u32,
    /// アクティベーションTOTP
    pub totp: String,
}

/// multipartの `signatureProperties` フィールドに格納するJSON。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritySignatureProperties {
    /// 可視表示オプション
    pub tampilan: VisualOption,
    /// 署名欄ラベル（署名時のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// 場所
    pub location: Option<String>,
    /// 理由
    pub reason: Option<String>,
}

impl AuthoritySignatureProperties {
    /// シール要求から構築する。未指定の場所・理由は `null` として送る。
    pub fn for_seal(request: &SealingRequest) -> Self {
        Self {
            tampilan: request.visual,
            label: None,
            location: request.location.clone(),
            reason: request.reason.clone(),
        }
    }

    /// 署名要求から構築する。付加情報がなければ `None`。
    pub fn for_sign(request: &SigningRequest) -> Option<Self> {
        let properties = request.properties.as_ref()?;
        Some(Self {
            tampilan: request.visual,
            label: properties.label.clone(),
            location: properties.location.clone(),
            reason: properties.reason.clone(),
        })
    }
}
