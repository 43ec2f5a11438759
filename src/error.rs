//! エラー定義
//!
//! ライブラリの公開APIはすべて [`StegError`] を返します。
//! バイナリ側では `anyhow` でラップしてメッセージを表示します。

use std::path::{Path, PathBuf};
use thiserror::Error;

/// ステガノ解析パイプラインのエラー
#[derive(Debug, Error)]
pub enum StegError {
    /// 画像が存在しない・読めない・デコードできない（回復可能）
    #[error("画像を読み込めません {path}: {reason}")]
    InvalidImage {
        path: String,
        reason: String,
    },

    /// モデルファイルが存在しない・壊れている・互換性がない（推論セッションにとって致命的）
    #[error("モデルの読み込みに失敗しました {path}: {reason}")]
    ModelLoadFailure {
        path: PathBuf,
        reason: String,
    },

    /// 分割ファイルの欠落や空の学習データ（学習は中断される）
    #[error("データセット設定エラー: {0}")]
    DatasetConfiguration(String),

    /// 分類器がデータを受け付けなかった（学習は中断される）
    #[error("学習エラー: {0}")]
    Fitting(String),

    /// 出力先への書き込み失敗
    #[error("I/Oエラー {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StegError {
    pub fn invalid_image(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidImage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn model_load(path: &Path, reason: impl ToString) -> Self {
        Self::ModelLoadFailure {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn dataset(reason: impl Into<String>) -> Self {
        Self::DatasetConfiguration(reason.into())
    }

    pub fn fitting(reason: impl Into<String>) -> Self {
        Self::Fitting(reason.into())
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// 画像単位の回復可能なエラーかどうか
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidImage { .. })
    }
}

pub type Result<T> = std::result::Result<T, StegError>;
