//! # 入力検証
//!
//! NIK・アップロードファイル・フォームフィールドの検証。
//! すべて純粋関数で、I/Oを行わない。検証に失敗したリクエストは
//! ステージングも署名局の呼び出しも行わずに400で返す。

use esign_types::{AuthorizationMethod, Placement, VisualOption};

use crate::endpoints::form::PendingUpload;

/// アップロードファイルの上限サイズ（10 MiB、境界値は許可）。
pub const MAX_PDF_BYTES: u64 = 10 * 1024 * 1024;

/// NIKの桁数
const NIK_LENGTH: usize = 16;

/// 検証エラー。`Display` がそのままクライアントへのメッセージになる。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("NIK must be a 16-digit integer.")]
    InvalidIdentity,
    #[error("No file uploaded or file format is incorrect. Only PDF files are allowed.")]
    MissingFile,
    #[error("File size exceeds the limit of 10 MB.")]
    FileTooLarge,
    #[error("{0} is required.")]
    MissingField(&'static str),
    #[error("visual must be either \"visible\" or \"invisible\".")]
    InvalidVisualOption,
    #[error("Provide either passphrase or totp, not both.")]
    ConflictingAuthorization,
    #[error("{0} must be a non-negative integer.")]
    InvalidPlacement(&'static str),
}

/// NIKが16桁の10進数であることを検証する。
pub fn validate_identity(value: &str) -> Result<(), ValidationError> {
    if value.len() == NIK_LENGTH && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentity)
    }
}

/// アップロードファイルの有無とサイズを検証する。
///
/// PDF以外のファイルはmultipartの境界で既に拒否されているため、
/// ここでは内容の検査は行わない。
pub fn validate_file(file: Option<&PendingUpload>) -> Result<(), ValidationError> {
    let file = file.ok_or(ValidationError::MissingFile)?;
    if file.size_bytes() > MAX_PDF_BYTES {
        return Err(ValidationError::FileTooLarge);
    }
    Ok(())
}

/// 必須フィールドを取り出す。
pub fn require<'a>(
    value: Option<&'a str>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    value.ok_or(ValidationError::MissingField(field))
}

/// `visual` フィールドをパースする。
pub fn parse_visual_option(value: Option<&str>) -> Result<VisualOption, ValidationError> {
    require(value, "visual")?
        .parse()
        .map_err(|_| ValidationError::InvalidVisualOption)
}

/// パスフレーズ・TOTPから認可方式を決定する。
///
/// 両方の指定は曖昧なため拒否する。どちらもなければ `None` として
/// 署名局に判断を委ねる。
pub fn parse_authorization(
    passphrase: Option<&str>,
    totp: Option<&str>,
) -> Result<AuthorizationMethod, ValidationError> {
    match (passphrase, totp) {
        (Some(_), Some(_)) => Err(ValidationError::ConflictingAuthorization),
        (Some(p), None) => Ok(AuthorizationMethod::Passphrase(p.to_string())),
        (None, Some(t)) => Ok(AuthorizationMethod::Totp(t.to_string())),
        (None, None) => Ok(AuthorizationMethod::None),
    }
}

/// フォームの配置フィールド。未指定の値はデフォルトで補う。
#[derive(Debug, Default, Clone, Copy)]
pub struct PlacementFields<'a> {
    pub page: Option<&'a str>,
    pub x: Option<&'a str>,
    pub y: Option<&'a str>,
    pub width: Option<&'a str>,
    pub height: Option<&'a str>,
}

/// 可視署名の配置を組み立てる。`Invisible` の場合は配置を送らない。
pub fn parse_placement(
    visual: VisualOption,
    fields: PlacementFields<'_>,
) -> Result<Option<Placement>, ValidationError> {
    if visual == VisualOption::Invisible {
        return Ok(None);
    }
    let defaults = Placement::default();
    Ok(Some(Placement {
        page: parse_u32(fields.page, "page", defaults.page)?,
        x: parse_u32(fields.x, "xAxis", defaults.x)?,
        y: parse_u32(fields.y, "yAxis", defaults.y)?,
        width: parse_u32(fields.width, "width", defaults.width)?,
        height: parse_u32(fields.height, "height", defaults.height)?,
    }))
}

fn parse_u32(
    value: Option<&str>,
    field: &'static str,
    default: u32,
) -> Result<u32, ValidationError> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidPlacement(field)),
        None => Ok(default),
    }
}
