//! # エンドポイントテスト用共通ヘルパー
//!
//! 呼び出しを記録するモック署名局と、テスト用Gatewayサーバー。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use esign_types::{SealingRequest, SignerIdentifier, SigningRequest};
use reqwest::StatusCode;

use crate::authority::{AuthorityError, SigningAuthority};
use crate::config::GatewayState;
use crate::storage::{StagingArea, UploadedFile};

/// モック署名局が受けた呼び出し。
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    RequestTotp(SignerIdentifier),
    ActivateSeal(String),
    SealOtp { id_subscriber: String, totp: String },
    Sign {
        request: SigningRequest,
        staged_name: String,
        content: Vec<u8>,
    },
    Seal {
        request: SealingRequest,
        staged_name: String,
        content: Vec<u8>,
    },
}

/// モック署名局の応答。
#[derive(Debug, Clone)]
pub enum Outcome {
    /// 成功（sign/sealはこのバイト列を返す）
    Succeed(Vec<u8>),
    /// 指定ステータスで失敗
    FailWith(StatusCode),
    /// 成功を返す前にステージングディレクトリを削除し、保存を失敗させる
    SucceedButRemoveStaging(Vec<u8>),
}

/// 呼び出しを記録するモック署名局。
pub struct RecordingAuthority {
    calls: Arc<Mutex<Vec<Call>>>,
    outcome: Outcome,
}

impl RecordingAuthority {
    fn json_result(&self) -> Result<serde_json::Value, AuthorityError> {
        match &self.outcome {
            Outcome::FailWith(status) => Err(AuthorityError::Status {
                status: *status,
                body: "mock failure".to_string(),
            }),
            _ => Ok(serde_json::json!({"status": true})),
        }
    }

    async fn pdf_result(&self, file: &UploadedFile) -> Result<Vec<u8>, AuthorityError> {
        match &self.outcome {
            Outcome::Succeed(bytes) => Ok(bytes.clone()),
            Outcome::FailWith(status) => Err(AuthorityError::Status {
                status: *status,
                body: "mock failure".to_string(),
            }),
            Outcome::SucceedButRemoveStaging(bytes) => {
                if let Some(dir) = file.temporary_path.parent() {
                    tokio::fs::remove_dir_all(dir).await?;
                }
                Ok(bytes.clone())
            }
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl SigningAuthority for RecordingAuthority {
    async fn request_totp(
        &self,
        signer: &SignerIdentifier,
    ) -> Result<serde_json::Value, AuthorityError> {
        self.record(Call::RequestTotp(signer.clone()));
        self.json_result()
    }

    async fn activate_seal_totp(
        &self,
        id_subscriber: &str,
    ) -> Result<serde_json::Value, AuthorityError> {
        self.record(Call::ActivateSeal(id_subscriber.to_string()));
        self.json_result()
    }

    async fn request_seal_otp(
        &self,
        id_subscriber: &str,
        totp: &str,
    ) -> Result<serde_json::Value, AuthorityError> {
        self.record(Call::SealOtp {
            id_subscriber: id_subscriber.to_string(),
            totp: totp.to_string(),
        });
        self.json_result()
    }

    async fn sign_pdf(
        &self,
        file: &UploadedFile,
        request: &SigningRequest,
    ) -> Result<Vec<u8>, AuthorityError> {
        // 中継前にステージング済みであることを内容で確認する
        let content = tokio::fs::read(&file.temporary_path).await?;
        self.record(Call::Sign {
            request: request.clone(),
            staged_name: file.staged_name.clone(),
            content,
        });
        self.pdf_result(file).await
    }

    async fn seal_pdf(
        &self,
        file: &UploadedFile,
        request: &SealingRequest,
    ) -> Result<Vec<u8>, AuthorityError> {
        let content = tokio::fs::read(&file.temporary_path).await?;
        self.record(Call::Seal {
            request: request.clone(),
            staged_name: file.staged_name.clone(),
            content,
        });
        self.pdf_result(file).await
    }
}

/// テスト用に起動したGateway。
pub struct TestGateway {
    pub base_url: String,
    pub calls: Arc<Mutex<Vec<Call>>>,
    /// ステージングディレクトリ
    pub staging_dir: PathBuf,
    _tempdir: tempfile::TempDir,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// ステージングディレクトリ内のファイル名一覧（ソート済み）
    pub fn staged_files(&self) -> Vec<String> {
        list_files(&self.staging_dir)
    }
}

fn list_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// モック署名局を持つGatewayを起動する。
pub async fn start_gateway(outcome: Outcome) -> TestGateway {
    let tempdir = tempfile::tempdir().unwrap();
    let staging_dir = tempdir.path().join("uploads");
    let staging = StagingArea::new(&staging_dir);
    staging.ensure().await.unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let state = Arc::new(GatewayState {
        authority: Box::new(RecordingAuthority {
            calls: calls.clone(),
            outcome,
        }),
        staging,
    });
    let app = crate::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    TestGateway {
        base_url: format!("http://127.0.0.1:{port}"),
        calls,
        staging_dir,
        _tempdir: tempdir,
    }
}

/// PDFファイルパートを作る。
pub fn pdf_part(bytes: &[u8], file_name: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(bytes.to_vec())
        .file_name(file_name.to_string())
        .mime_str("application/pdf")
        .unwrap()
}
