//! アプリケーション設定管理モジュール
//!
//! データセットの場所、抽出データの出力先、モデルの保存先、
//! 学習のハイパーパラメータをJSON形式で保存・読み込みします。
//! コマンドライン引数が指定された場合はそちらが優先されます。

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ml::ForestParams;
use crate::model::model_metadata::DEFAULT_MODEL_NAME;
use crate::types::{Split, DEFAULT_CLASS_NAMES};

/// パス設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// `<root>/<split>/<split>/<クラス名>/<画像>` の `<root>`
    pub dataset_root: PathBuf,
    /// 分割ごとの特徴量ファイルの出力先
    pub extracted_data_dir: PathBuf,
    /// 学習済みモデル（tar.gz）のパス
    pub model_path: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("archive"),
            extracted_data_dir: PathBuf::from("extracted_data"),
            model_path: PathBuf::from(format!("trained_model/{}.tar.gz", DEFAULT_MODEL_NAME)),
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// メタデータに記録するモデル名
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(flatten)]
    pub forest: ForestParams,
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            forest: ForestParams::default(),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathSettings,
    pub training: TrainingSettings,
    /// クラス名（インデックス順）
    pub class_names: Vec<String>,
    /// 特徴量抽出の対象とする分割
    pub splits: Vec<Split>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathSettings::default(),
            training: TrainingSettings::default(),
            class_names: DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            splits: Split::ALL.to_vec(),
        }
    }
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("stegguard.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("設定ファイルを読み込めません: {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("設定ファイルの形式が不正です: {}", path.display()))?;
        Ok(config)
    }

    /// 指定パス（省略時はデフォルトパス）から設定を読み込む
    ///
    /// 存在しない場合や読み込めない場合はデフォルト設定を返す。
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            tracing::debug!(
                "設定ファイルが存在しません。デフォルト設定を使用します: {}",
                path.display()
            );
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                tracing::info!("設定ファイルを読み込みました: {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("{:#}。デフォルト設定を使用します", e);
                Self::default()
            }
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
            .with_context(|| format!("設定ファイルを書き込めません: {}", path.display()))?;
        Ok(())
    }

    /// 設定情報を表示
    pub fn display(&self) {
        let forest = &self.training.forest;
        println!("=== アプリケーション設定 ===");
        println!("データセット: {}", self.paths.dataset_root.display());
        println!("抽出データ: {}", self.paths.extracted_data_dir.display());
        println!("モデルパス: {}", self.paths.model_path.display());
        println!("クラス名: {}", self.class_names.join(", "));
        let splits: Vec<&str> = self.splits.iter().map(|s| s.as_str()).collect();
        println!("対象分割: {}", splits.join(", "));
        println!("\n--- トレーニング設定 ---");
        println!("モデル名: {}", self.training.model_name);
        println!("決定木の本数: {}", forest.n_estimators);
        println!("シード: {}", forest.random_state);
        println!("分岐ごとの特徴量数: {}", forest.max_features);
        println!("ブートストラップ: {}", forest.bootstrap);
        println!("========================\n");
    }
}
