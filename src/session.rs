//! 検出セッション
//!
//! 画面側の操作（画像のアップロード・検出・ヘルプ表示）に対応する状態を保持します。
//! セッションは読み込みに成功したモデルからしか作れないため、
//! モデルがない状態で検出が呼ばれることはありません。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Result, StegError};
use crate::ml::{InferenceEngine, Prediction};
use crate::types::is_supported_image;

/// 使い方の説明
pub const HELP_TEXT: &str = "\
StegGuard の使い方

1. 「Upload Image」で PNG / JPG / JPEG の画像を選択します。
2. 「Detect Steganography」で画像を解析します。
3. 結果欄に判定（Clean / Stego）と確信度が表示されます。

画像のカラーヒストグラムを学習済みのランダムフォレストで分類しています。";

/// 検出対象として選択された画像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub path: PathBuf,
}

impl StagedImage {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// 検出セッション
#[derive(Debug, Clone)]
pub struct DetectionSession {
    engine: Arc<InferenceEngine>,
    staged: Option<StagedImage>,
}

impl DetectionSession {
    /// モデルを読み込んでセッションを開始
    pub fn open<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let engine = InferenceEngine::load(model_path)?;
        Ok(Self::with_engine(Arc::new(engine)))
    }

    /// 読み込み済みのモデルを共有してセッションを作成
    pub fn with_engine(engine: Arc<InferenceEngine>) -> Self {
        Self {
            engine,
            staged: None,
        }
    }

    pub fn engine(&self) -> &Arc<InferenceEngine> {
        &self.engine
    }

    /// 画像を検出対象として選択する
    ///
    /// 失敗した場合は以前に選択していた画像がそのまま残る。
    pub fn upload<P: AsRef<Path>>(&mut self, path: P) -> Result<&StagedImage> {
        let path = path.as_ref();
        if !is_supported_image(path) {
            return Err(StegError::invalid_image(
                path.display().to_string(),
                "対応していない拡張子です（png, jpg, jpeg のみ）",
            ));
        }
        if !path.is_file() {
            return Err(StegError::invalid_image(
                path.display().to_string(),
                "ファイルが存在しません",
            ));
        }

        info!("画像を選択しました: {}", path.display());
        Ok(&*self.staged.insert(StagedImage {
            path: path.to_path_buf(),
        }))
    }

    pub fn staged(&self) -> Option<&StagedImage> {
        self.staged.as_ref()
    }

    /// 選択中の画像を解析する
    pub fn detect(&self) -> Result<Prediction> {
        let staged = self.require_staged()?;
        run_detection(&self.engine, &staged.path)
    }

    /// 選択中の画像をバックグラウンドで解析する
    ///
    /// tokio ランタイム内から呼び出す必要がある。
    pub fn spawn_detect(&self) -> JoinHandle<Result<Prediction>> {
        let engine = Arc::clone(&self.engine);
        let staged = self.require_staged().map(|s| s.path.clone());

        tokio::task::spawn_blocking(move || {
            let path = staged?;
            run_detection(&engine, &path)
        })
    }

    pub fn help(&self) -> &'static str {
        HELP_TEXT
    }

    fn require_staged(&self) -> Result<&StagedImage> {
        self.staged.as_ref().ok_or_else(|| {
            StegError::invalid_image("", "画像が選択されていません。先に画像をアップロードしてください")
        })
    }
}

fn run_detection(engine: &InferenceEngine, path: &Path) -> Result<Prediction> {
    debug!("解析を開始します: {}", path.display());
    let prediction = engine.predict(path)?;
    info!(
        "{}: {} ({:.2}%)",
        path.display(),
        prediction.label,
        prediction.confidence * 100.0
    );
    Ok(prediction)
}
