//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 署名局の資格情報は起動時に一度だけ読み込み、クライアントに注入する。

use secrecy::SecretString;

use crate::authority::{BasicCredential, SigningAuthority};
use crate::storage::StagingArea;

/// 待ち受けアドレスのデフォルト
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
/// 署名局ベースURLのデフォルト
const DEFAULT_ESIGN_BASE_URL: &str = "https://10.152.0.110";
/// ステージングディレクトリのデフォルト（作業ディレクトリからの相対パス）
const DEFAULT_STAGING_DIR: &str = "uploads";

/// 起動時設定。
pub struct GatewayConfig {
    /// 待ち受けアドレス
    pub listen_addr: String,
    /// 署名局のベースURL
    pub esign_base_url: String,
    /// 署名局のBasic認証資格情報
    pub credential: BasicCredential,
    /// ステージングディレクトリ
    pub staging_dir: String,
}

impl GatewayConfig {
    /// 環境変数から構築する。
    ///
    /// - `GATEWAY_LISTEN_ADDR`（任意）
    /// - `ESIGN_BASE_URL`（任意）
    /// - `ESIGN_USERNAME` / `ESIGN_PASSWORD`（必須）
    /// - `STAGING_DIR`（任意）
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow::anyhow!("{key}が設定されていません"))
        };

        let username = required("ESIGN_USERNAME")?;
        let password = SecretString::from(required("ESIGN_PASSWORD")?);

        Ok(Self {
            listen_addr: lookup("GATEWAY_LISTEN_ADDR")
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            esign_base_url: lookup("ESIGN_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ESIGN_BASE_URL.to_string()),
            credential: BasicCredential { username, password },
            staging_dir: lookup("STAGING_DIR").unwrap_or_else(|| DEFAULT_STAGING_DIR.to_string()),
        })
    }
}

/// Gatewayの共有状態。起動後は読み取り専用。
pub struct GatewayState {
    /// 署名局クライアント（テストではモックに差し替え）
    pub authority: Box<dyn SigningAuthority>,
    /// ステージングディレクトリ
    pub staging: StagingArea,
}
