//! # ステージングストレージ
//!
//! アップロードされたPDFと、署名局から返却された署名済み・シール済みPDFを
//! 保存するローカルディレクトリを管理する。
//!
//! ステージングされたファイルはこのサービスでは削除しない。

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWriteExt};

/// 元ファイル名が空の場合に使う名前
const FALLBACK_FILE_NAME: &str = "upload.pdf";

/// ストレージエラー型。
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// ステージングファイルの書き込みに失敗
    #[error("ステージングファイルの書き込みに失敗 ({}): {source}", path.display())]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 成果物の書き込みに失敗
    #[error("成果物の書き込みに失敗 ({}): {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// ステージング済みのアップロードファイル。
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// ステージングディレクトリ内のパス
    pub temporary_path: PathBuf,
    /// ステージング時に付けたファイル名（`<token>-<元ファイル名>`）
    pub staged_name: String,
    /// クライアントが送ったファイル名
    pub original_name: String,
    /// クライアントが宣言したMIMEタイプ
    pub declared_mime_type: String,
    /// バイト数
    pub size_bytes: u64,
}

/// 署名済み・シール済み成果物のファイル名接頭辞。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Signed,
    Sealed,
}

impl ArtifactKind {
    /// 成果物のファイル名を導出する。
    pub fn artifact_name(&self, staged_name: &str) -> String {
        let prefix = match self {
            ArtifactKind::Signed => "signed",
            ArtifactKind::Sealed => "sealed",
        };
        format!("{prefix}-{staged_name}")
    }
}

/// ステージングディレクトリ。
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// ディレクトリが無ければ作成する。既に存在する場合は何もしない。
    pub async fn ensure(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// 受信したバイト列をステージングディレクトリに書き込む。
    ///
    /// ファイル名はランダムなトークンを前置して衝突を避ける。
    pub async fn stage_incoming_file<R>(
        &self,
        mut reader: R,
        original_name: &str,
        declared_mime_type: &str,
    ) -> Result<UploadedFile, StorageError>
    where
        R: AsyncRead + Unpin,
    {
        let staged_name = format!(
            "{}-{}",
            uuid::Uuid::new_v4().simple(),
            sanitize_file_name(original_name)
        );
        let path = self.root.join(&staged_name);

        let stage_err = |source| StorageError::Stage {
            path: path.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(&path).await.map_err(stage_err)?;
        let size_bytes = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(stage_err)?;
        file.flush().await.map_err(stage_err)?;

        tracing::debug!(
            staged_name = %staged_name,
            size_bytes,
            "アップロードファイルをステージング"
        );

        Ok(UploadedFile {
            temporary_path: path,
            staged_name,
            original_name: original_name.to_string(),
            declared_mime_type: declared_mime_type.to_string(),
            size_bytes,
        })
    }

    /// 成果物を `<root>/<derived_name>` に書き込む。
    ///
    /// 一時ファイルに書いてからリネームするため、呼び出し側から見て
    /// 中途半端なファイルは残らない。再試行はしない。
    pub async fn persist_artifact(
        &self,
        bytes: &[u8],
        derived_name: &str,
    ) -> Result<PathBuf, StorageError> {
        let final_path = self.root.join(derived_name);
        let tmp_path = self
            .root
            .join(format!(".{derived_name}.{}.partial", uuid::Uuid::new_v4().simple()));

        if let Err(source) = write_then_rename(&tmp_path, &final_path, bytes).await {
            if let Err(e) = tokio::fs::remove_file(&tmp_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %tmp_path.display(), "一時ファイルの削除に失敗: {e}");
                }
            }
            return Err(StorageError::Persist {
                path: final_path,
                source,
            });
        }

        Ok(final_path)
    }
}

async fn write_then_rename(
    tmp_path: &Path,
    final_path: &Path,
    bytes: &[u8],
) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp_path, final_path).await
}

/// クライアント由来のファイル名から安全な最終要素だけを取り出す。
fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
