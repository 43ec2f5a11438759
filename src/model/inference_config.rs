//! モデルメタデータから推論に必要な情報を取り出す

use crate::features::FeatureLayout;
use crate::model::model_metadata::ModelMetadata;

/// 推論時に参照する設定
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// クラス名（インデックス順）
    pub class_names: Vec<String>,
    pub feature_layout: FeatureLayout,
    pub n_estimators: usize,
    pub random_state: u64,
}

impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            class_names: metadata.class_names.clone(),
            feature_layout: metadata.feature_layout,
            n_estimators: metadata.n_estimators(),
            random_state: metadata.random_state(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn feature_len(&self) -> usize {
        self.feature_layout.feature_len()
    }

    /// クラスインデックスからラベルを取得
    pub fn class_index_to_label(&self, index: usize) -> Option<&str> {
        self.class_names.get(index).map(String::as_str)
    }

    /// 設定情報を表示
    pub fn print_info(&self) {
        println!("\n=== 推論設定 ===");
        println!("クラス名: {}", self.class_names.join(", "));
        println!("総クラス数: {}", self.num_classes());
        println!("特徴量次元: {}", self.feature_len());
        println!("決定木の本数: {}", self.n_estimators);
        println!("シード: {}", self.random_state);
        println!("==================");
    }
}
