//! モデルメタデータの定義
//!
//! tar.gz 内の `metadata.json` として保存され、推論側はこれだけを見て
//! クラス数やクラス名、特徴量レイアウトを判断します。
//!
//! ## 互換性
//! - 未知のフィールドは無視する（前方互換）
//! - `schema_version` がこのビルドより新しいモデルは読み込まない
//! - 後から追加したフィールドには `#[serde(default)]` を付ける

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::features::FeatureLayout;
use crate::ml::ForestParams;
use crate::types::{Split, FEATURE_LEN};

/// このビルドが書き出すメタデータのスキーマバージョン
pub const SCHEMA_VERSION: u32 = 1;

/// デフォルトのモデル名
pub const DEFAULT_MODEL_NAME: &str = "StegGuard_Random_Forest_Classifier";

/// 分割ごとの評価結果の要約
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitScore {
    pub split: Split,
    pub accuracy: f64,
    pub samples: usize,
}

/// モデルメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub model_name: String,

    /// クラス名（インデックス順）
    /// 例: ["Clean", "Stego"]
    pub class_names: Vec<String>,

    /// 学習時のハイパーパラメータ（n_estimators, random_state など）
    #[serde(flatten)]
    pub hyperparameters: ForestParams,

    /// 特徴量のレイアウト（ビン数・チャンネル数・正規化方法）
    #[serde(default)]
    pub feature_layout: FeatureLayout,

    /// 特徴ベクトルの長さ（bins x channels）
    #[serde(default = "default_feature_len")]
    pub feature_len: usize,

    /// 学習時の評価結果
    #[serde(default)]
    pub evaluation: Vec<SplitScore>,

    /// モデルの学習時刻（ISO8601形式）
    #[serde(default)]
    pub trained_at: String,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_feature_len() -> usize {
    FEATURE_LEN
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        model_name: impl Into<String>,
        class_names: Vec<String>,
        hyperparameters: ForestParams,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            model_name: model_name.into(),
            class_names,
            hyperparameters,
            feature_layout: FeatureLayout::CURRENT,
            feature_len: FeatureLayout::CURRENT.feature_len(),
            evaluation: Vec::new(),
            trained_at: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn with_evaluation(mut self, evaluation: Vec<SplitScore>) -> Self {
        self.evaluation = evaluation;
        self
    }

    pub fn n_estimators(&self) -> usize {
        self.hyperparameters.n_estimators
    }

    pub fn random_state(&self) -> u64 {
        self.hyperparameters.random_state
    }

    /// このビルドで推論に使えるかを確認
    pub fn check_compatible(&self) -> std::result::Result<(), String> {
        if self.schema_version > SCHEMA_VERSION {
            return Err(format!(
                "スキーマバージョン {} には対応していません（対応: {} 以下）",
                self.schema_version, SCHEMA_VERSION
            ));
        }
        if self.class_names.is_empty() {
            return Err("クラス名が空です".to_string());
        }
        if self.feature_layout != FeatureLayout::CURRENT || self.feature_len != FEATURE_LEN {
            return Err(format!(
                "特徴量レイアウトが異なります: {:?} / {} 次元（期待: {:?} / {} 次元）",
                self.feature_layout,
                self.feature_len,
                FeatureLayout::CURRENT,
                FEATURE_LEN
            ));
        }
        Ok(())
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_CLASS_NAMES;

    fn metadata() -> ModelMetadata {
        ModelMetadata::new(
            DEFAULT_MODEL_NAME,
            DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            ForestParams::default(),
        )
    }

    #[test]
    fn test_json_roundtrip() {
        let saved = metadata().with_evaluation(vec![SplitScore {
            split: Split::Test,
            accuracy: 0.75,
            samples: 10,
        }]);
        let json = saved.to_json_string().unwrap();
        assert!(json.contains("\"n_estimators\": 100"));
        assert!(json.contains("\"random_state\": 42"));

        let restored = ModelMetadata::from_json_string(&json).unwrap();
        assert_eq!(restored, saved);
        assert_eq!(restored.n_estimators(), 100);
        assert_eq!(restored.random_state(), 42);
    }

    #[test]
    fn test_minimal_json_with_unknown_fields() {
        let json = r#"{
            "class_names": ["Clean", "Stego"],
            "n_estimators": 10,
            "random_state": 7,
            "future_field": {"anything": true}
        }"#;
        let metadata = ModelMetadata::from_json_string(json).unwrap();

        assert_eq!(metadata.schema_version, SCHEMA_VERSION);
        assert_eq!(metadata.n_estimators(), 10);
        assert_eq!(metadata.hyperparameters.min_samples_split, 2);
        assert_eq!(metadata.feature_layout, FeatureLayout::CURRENT);
        assert!(metadata.check_compatible().is_ok());
    }

    #[test]
    fn test_newer_schema_is_incompatible() {
        let mut metadata = metadata();
        metadata.schema_version = SCHEMA_VERSION + 1;
        assert!(metadata.check_compatible().is_err());
    }

    #[test]
    fn test_other_layout_is_incompatible() {
        let mut metadata = metadata();
        metadata.feature_layout.bins = 32;
        assert!(metadata.check_compatible().is_err());

        let mut other_len = self::metadata();
        other_len.feature_len = 512;
        assert!(other_len.check_compatible().is_err());

        let mut no_classes = self::metadata();
        no_classes.class_names.clear();
        assert!(no_classes.check_compatible().is_err());
    }
}
