//! # 署名局クライアント
//!
//! 外部の電子署名局（Signing Authority）への5種類の呼び出しをまとめる。
//! 各呼び出しは1回だけ送信し、自動再試行は行わない。
//!
//! ## 呼び出し一覧
//! - `POST /api/v2/sign/get/totp`: 署名用TOTPのメール送信
//! - `POST /api/v2/seal/get/activation`: シール用TOTPのアクティベーション
//! - `POST /api/v2/seal/get/totp`: シール用OTPの発行
//! - `POST /api/v2/sign/pdf`: PDF署名（multipart）
//! - `POST /api/v2/seal/pdf`: PDFシール（multipart）

use base64::Engine;
use esign_types::*;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::storage::UploadedFile;

pub const SIGN_TOTP_PATH: &str = "/api/v2/sign/get/totp";
pub const SEAL_ACTIVATION_PATH: &str = "/api/v2/seal/get/activation";
pub const SEAL_OTP_PATH: &str = "/api/v2/seal/get/totp";
pub const SIGN_PDF_PATH: &str = "/api/v2/sign/pdf";
pub const SEAL_PDF_PATH: &str = "/api/v2/seal/pdf";

/// Base64エンジン（Standard）
fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// 署名局呼び出しのエラー。
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// 送信・受信に失敗（接続不可、TLS、ボディ読み取り）
    #[error("署名局との通信に失敗: {0}")]
    Transport(#[from] reqwest::Error),
    /// 署名局が2xx以外を返した
    #[error("署名局がエラーを返しました: HTTP {status} - {body}")]
    Status { status: StatusCode, body: String },
    /// ステージングファイルを開けない
    #[error("ステージングファイルを開けません: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthorityError {
    /// 下流のHTTPステータス（取得できた場合）。
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AuthorityError::Status { status, .. } => Some(*status),
            AuthorityError::Transport(e) => e.status(),
            AuthorityError::Io(_) => None,
        }
    }
}

/// 署名局の抽象インターフェース。
///
/// 本番は [`EsignClient`]、テストではモック実装に差し替える。
#[async_trait::async_trait]
pub trait SigningAuthority: Send + Sync {
    /// 署名者にTOTPをメール送信させる。コード自体はこのサービスには返らない。
    async fn request_totp(
        &self,
        signer: &SignerIdentifier,
    ) -> Result<serde_json::Value, AuthorityError>;

    /// シール契約者のTOTPをアクティベートする。
    async fn activate_seal_totp(
        &self,
        id_subscriber: &str,
    ) -> Result<serde_json::Value, AuthorityError>;

    /// アクティベーションTOTPをシール用OTP（1件分）に交換する。
    async fn request_seal_otp(
        &self,
        id_subscriber: &str,
        totp: &str,
    ) -> Result<serde_json::Value, AuthorityError>;

    /// ステージング済みPDFに署名させ、署名済みPDFのバイト列を返す。
    async fn sign_pdf(
        &self,
        file: &UploadedFile,
        request: &SigningRequest,
    ) -> Result<Vec<u8>, AuthorityError>;

    /// ステージング済みPDFにシールさせ、シール済みPDFのバイト列を返す。
    async fn seal_pdf(
        &self,
        file: &UploadedFile,
        request: &SealingRequest,
    ) -> Result<Vec<u8>, AuthorityError>;
}

/// Basic認証の資格情報。起動時に設定から注入する。
pub struct BasicCredential {
    pub username: String,
    pub password: SecretString,
}

impl BasicCredential {
    /// `Authorization` ヘッダ値を構築する。ログに出ないようsensitive扱いにする。
    fn header_value(&self) -> anyhow::Result<HeaderValue> {
        let token = b64().encode(format!(
            "{}:{}",
            self.username,
            self.password.expose_secret()
        ));
        let mut value = HeaderValue::from_str(&format!("Basic {token}"))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// HTTP経由の署名局クライアント。
pub struct EsignClient {
    /// HTTPクライアント
    http: reqwest::Client,
    /// 署名局のベースURL（末尾スラッシュなし）
    base_url: String,
    /// 事前にエンコードしたBasic認証ヘッダ
    auth_header: HeaderValue,
}

impl EsignClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        credential: &BasicCredential,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: credential.header_value()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// JSONボディを送信し、JSONレスポンスを返す。
    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<serde_json::Value, AuthorityError> {
        let response = self
            .http
            .post(self.url(path))
            .header(AUTHORIZATION, self.auth_header.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(AuthorityError::Status { status, body: text });
        }

        // JSON以外の成功レスポンスは文字列として扱う
        Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
    }

    /// multipartボディを送信し、レスポンスのバイト列（PDF）を返す。
    async fn post_pdf(&self, path: &str, form: Form) -> Result<Vec<u8>, AuthorityError> {
        let response = self
            .http
            .post(self.url(path))
            .header(AUTHORIZATION, self.auth_header.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthorityError::Status { status, body });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// ステージングファイルをストリームとして送るmultipartパートを作る。
async fn file_part(file: &UploadedFile) -> Result<Part, AuthorityError> {
    let handle = tokio::fs::File::open(&file.temporary_path).await?;
    let part = Part::stream_with_length(reqwest::Body::from(handle), file.size_bytes)
        .file_name(file.staged_name.clone())
        .mime_str(&file.declared_mime_type)?;
    Ok(part)
}

/// 署名要求のフォームフィールドを組み立てる（ファイルパート以外）。
fn sign_form_fields(request: &SigningRequest) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("nik", request.nik.clone()),
        ("tampilan", request.visual.as_str().to_string()),
    ];

    match &request.authorization {
        AuthorizationMethod::Passphrase(p) => fields.push(("passphrase", p.clone())),
        AuthorizationMethod::Totp(t) => fields.push(("totp", t.clone())),
        AuthorizationMethod::None => {}
    }

    if let Some(p) = request.placement {
        fields.push(("page", p.page.to_string()));
        fields.push(("xAxis", p.x.to_string()));
        fields.push(("yAxis", p.y.to_string()));
        fields.push(("width", p.width.to_string()));
        fields.push(("height", p.height.to_string()));
    }

    fields
}

#[async_trait::async_trait]
impl SigningAuthority for EsignClient {
    async fn request_totp(
        &self,
        signer: &SignerIdentifier,
    ) -> Result<serde_json::Value, AuthorityError> {
        self.post_json(SIGN_TOTP_PATH, &AuthorityTotpRequest::for_signer(signer))
            .await
    }

    async fn activate_seal_totp(
        &self,
        id_subscriber: &str,
    ) -> Result<serde_json::Value, AuthorityError> {
        let body = AuthoritySealActivationRequest {
            id_subscriber: id_subscriber.to_string(),
        };
        self.post_json(SEAL_ACTIVATION_PATH, &body).await
    }

    async fn request_seal_otp(
        &self,
        id_subscriber: &str,
        totp: &str,
    ) -> Result<serde_json::Value, AuthorityError> {
        let body = AuthoritySealOtpRequest {
            id_subscriber: id_subscriber.to_string(),
            data: DATA_UNITS_PER_REQUEST,
            totp: totp.to_string(),
        };
        self.post_json(SEAL_OTP_PATH, &body).await
    }

    async fn sign_pdf(
        &self,
        file: &UploadedFile,
        request: &SigningRequest,
    ) -> Result<Vec<u8>, AuthorityError> {
        let mut form = Form::new().part("file", file_part(file).await?);
        for (name, value) in sign_form_fields(request) {
            form = form.text(name, value);
        }
        if let Some(props) = AuthoritySignatureProperties::for_sign(request) {
            // 型付き構造体のシリアライズは失敗しない
            let json = serde_json::to_string(&props).unwrap_or_default();
            form = form.text("signatureProperties", json);
        }

        self.post_pdf(SIGN_PDF_PATH, form).await
    }

    async fn seal_pdf(
        &self,
        file: &UploadedFile,
        request: &SealingRequest,
    ) -> Result<Vec<u8>, AuthorityError> {
        let props = serde_json::to_string(&AuthoritySignatureProperties::for_seal(request))
            .unwrap_or_default();
        let form = Form::new()
            .part("file", file_part(file).await?)
            .text("idSubscriber", request.id_subscriber.clone())
            .text("totp", request.totp.clone())
            .text("signatureProperties", props);

        self.post_pdf(SEAL_PDF_PATH, form).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::Multipart;
    use axum::http::HeaderMap;
    use axum::Json;

    /// モック署名局が受信した内容
    #[derive(Debug, Default, Clone)]
    struct Received {
        authorization: Option<String>,
        json: Option<serde_json::Value>,
        fields: HashMap<String, String>,
        file: Option<(String, Vec<u8>)>,
    }

    type Shared = Arc<Mutex<Received>>;

    fn credential() -> BasicCredential {
        BasicCredential {
            username: "user".to_string(),
            password: SecretString::from("pass".to_string()),
        }
    }

    /// "user:pass" のBase64
    const EXPECTED_AUTH: &str = "Basic dXNlcjpwYXNz";

    /// 指定パスでJSONまたはmultipartを受け取り、固定レスポンスを返すモック署名局を起動する。
    async fn start_mock_authority(
        path: &'static str,
        status: u16,
        response: Vec<u8>,
    ) -> (EsignClient, Shared) {
        let received: Shared = Arc::default();
        let rec = received.clone();

        let app = axum::Router::new().route(
            path,
            axum::routing::post(move |headers: HeaderMap, request: axum::extract::Request| {
                let rec = rec.clone();
                let response = response.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let is_multipart = headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .is_some_and(|v| v.starts_with("multipart/form-data"));

                    let mut r = Received {
                        authorization: auth,
                        ..Default::default()
                    };
                    if is_multipart {
                        use axum::extract::FromRequest;
                        let mut multipart = Multipart::from_request(request, &()).await.unwrap();
                        while let Some(field) = multipart.next_field().await.unwrap() {
                            let name = field.name().unwrap_or_default().to_string();
                            if name == "file" {
                                let file_name = field.file_name().unwrap_or_default().to_string();
                                let bytes = field.bytes().await.unwrap().to_vec();
                                r.file = Some((file_name, bytes));
                            } else {
                                let text = field.text().await.unwrap();
                                r.fields.insert(name, text);
                            }
                        }
                    } else {
                        use axum::extract::FromRequest;
                        let Json(v) = Json::<serde_json::Value>::from_request(request, &())
                            .await
                            .unwrap();
                        r.json = Some(v);
                    }
                    *rec.lock().unwrap() = r;

                    (axum::http::StatusCode::from_u16(status).unwrap(), response)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let client = EsignClient::new(
            reqwest::Client::new(),
            &format!("http://127.0.0.1:{port}/"),
            &credential(),
        )
        .unwrap();
        (client, received)
    }

    async fn staged_pdf(dir: &tempfile::TempDir, data: &[u8]) -> UploadedFile {
        crate::storage::StagingArea::new(dir.path())
            .stage_incoming_file(data, "doc.pdf", "application/pdf")
            .await
            .unwrap()
    }

    #[test]
    fn test_basic_header_is_sensitive() {
        let value = credential().header_value().unwrap();
        assert_eq!(value.to_str().unwrap(), EXPECTED_AUTH);
        assert!(value.is_sensitive());
    }

    #[tokio::test]
    async fn test_request_totp_payload() {
        let (client, received) =
            start_mock_authority(SIGN_TOTP_PATH, 200, br#"{"status":"ok"}"#.to_vec()).await;

        let result = client
            .request_totp(&SignerIdentifier::Email("a@example.com".to_string()))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"status": "ok"}));

        let r = received.lock().unwrap().clone();
        assert_eq!(r.authorization.as_deref(), Some(EXPECTED_AUTH));
        assert_eq!(
            r.json,
            Some(serde_json::json!({"email": "a@example.com", "data": 1}))
        );
    }

    #[tokio::test]
    async fn test_seal_otp_payload() {
        let (client, received) = start_mock_authority(SEAL_OTP_PATH, 200, b"sent".to_vec()).await;

        // JSON以外の成功レスポンスは文字列になる
        let result = client.request_seal_otp("sub-9", "654321").await.unwrap();
        assert_eq!(result, serde_json::Value::String("sent".to_string()));

        let r = received.lock().unwrap().clone();
        assert_eq!(
            r.json,
            Some(serde_json::json!({"idSubscriber": "sub-9", "data": 1, "totp": "654321"}))
        );
    }

    #[tokio::test]
    async fn test_activation_failure_maps_status() {
        let (client, _) =
            start_mock_authority(SEAL_ACTIVATION_PATH, 503, b"maintenance".to_vec()).await;

        let err = client.activate_seal_totp("sub-1").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(matches!(err, AuthorityError::Status { ref body, .. } if body == "maintenance"));
    }

    #[tokio::test]
    async fn test_sign_pdf_multipart_fields() {
        let (client, received) =
            start_mock_authority(SIGN_PDF_PATH, 200, b"%PDF signed".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let file = staged_pdf(&dir, b"%PDF-1.4 original").await;

        let request = SigningRequest {
            nik: "1234567890123456".to_string(),
            visual: VisualOption::Visible,
            authorization: AuthorizationMethod::Totp("111222".to_string()),
            placement: Some(Placement::default()),
            properties: Some(SignatureProperties {
                label: None,
                location: Some("Jakarta".to_string()),
                reason: None,
            }),
        };
        let bytes = client.sign_pdf(&file, &request).await.unwrap();
        assert_eq!(bytes, b"%PDF signed");

        let r = received.lock().unwrap().clone();
        assert_eq!(r.authorization.as_deref(), Some(EXPECTED_AUTH));
        assert_eq!(r.fields["nik"], "1234567890123456");
        assert_eq!(r.fields["tampilan"], "visible");
        assert_eq!(r.fields["totp"], "111222");
        assert!(!r.fields.contains_key("passphrase"));
        assert_eq!(r.fields["page"], "1");
        assert_eq!(r.fields["width"], "100");
        assert_eq!(r.fields["height"], "50");
        let props: serde_json::Value =
            serde_json::from_str(&r.fields["signatureProperties"]).unwrap();
        assert_eq!(props["location"], "Jakarta");

        let (file_name, content) = r.file.unwrap();
        assert_eq!(file_name, file.staged_name);
        assert_eq!(content, b"%PDF-1.4 original");
    }

    /// 認可情報なし・非表示の場合は余計なフィールドを送らない
    #[tokio::test]
    async fn test_sign_pdf_omits_blank_fields() {
        let (client, received) = start_mock_authority(SIGN_PDF_PATH, 200, b"ok".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let file = staged_pdf(&dir, b"%PDF").await;

        let request = SigningRequest {
            nik: "1234567890123456".to_string(),
            visual: VisualOption::Invisible,
            authorization: AuthorizationMethod::None,
            placement: None,
            properties: None,
        };
        client.sign_pdf(&file, &request).await.unwrap();

        let r = received.lock().unwrap().clone();
        let mut keys: Vec<_> = r.fields.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["nik", "tampilan"]);
    }

    #[tokio::test]
    async fn test_seal_pdf_multipart_fields() {
        let (client, received) =
            start_mock_authority(SEAL_PDF_PATH, 200, b"%PDF sealed".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let file = staged_pdf(&dir, b"%PDF-1.4").await;

        let request = SealingRequest {
            id_subscriber: "sub-1".to_string(),
            totp: "999000".to_string(),
            visual: VisualOption::Invisible,
            location: None,
            reason: None,
        };
        let bytes = client.seal_pdf(&file, &request).await.unwrap();
        assert_eq!(bytes, b"%PDF sealed");

        let r = received.lock().unwrap().clone();
        assert_eq!(r.fields["idSubscriber"], "sub-1");
        assert_eq!(r.fields["totp"], "999000");
        let props: serde_json::Value =
            serde_json::from_str(&r.fields["signatureProperties"]).unwrap();
        assert_eq!(
            props,
            serde_json::json!({"tampilan": "invisible", "location": null, "reason": null})
        );
    }

    #[tokio::test]
    async fn test_unreachable_authority_is_transport_error() {
        // 予約済みポートを確保してから閉じ、接続拒否を起こす
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = EsignClient::new(
            reqwest::Client::new(),
            &format!("http://127.0.0.1:{port}"),
            &credential(),
        )
        .unwrap();
        let err = client
            .request_totp(&SignerIdentifier::Nik("1234567890123456".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorityError::Transport(_)));
        assert_eq!(err.status(), None);
    }
}
