//! モデル推論機能
//!
//! 読み込んだモデルは変更されないため、`Arc<InferenceEngine>` として
//! 複数スレッドから同時に `predict` を呼び出せます。

use serde::Serialize;
use std::path::Path;

use crate::error::{Result, StegError};
use crate::features::{extract_from_bytes, extract_from_path, FeatureVector};
use crate::ml::forest::{argmax, RandomForest};
use crate::model::{load_model_with_metadata, InferenceConfig, ModelMetadata};

/// 1枚の画像に対する推論結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub class_index: usize,
    pub label: String,
    /// 予測クラスの確率（0.0〜1.0）
    pub confidence: f32,
    /// クラスごとの確率（メタデータのクラス順）
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// 結果表示用の2行テキスト
    pub fn summary(&self) -> String {
        format!(
            "{} Detected\nConfidence: {:.2}%",
            self.label,
            self.confidence * 100.0
        )
    }
}

/// 推論エンジン
#[derive(Debug)]
pub struct InferenceEngine {
    forest: RandomForest,
    config: InferenceConfig,
    metadata: ModelMetadata,
}

impl InferenceEngine {
    /// モデルを読み込んで推論エンジンを初期化
    ///
    /// アーカイブが読めない場合や、このビルドと互換性がない場合は
    /// `ModelLoadFailure` を返す。
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();

        let (metadata, model_binary) = load_model_with_metadata(model_path)
            .map_err(|e| StegError::model_load(model_path, format!("{:#}", e)))?;
        metadata
            .check_compatible()
            .map_err(|reason| StegError::model_load(model_path, reason))?;

        let forest = RandomForest::from_bytes(&model_binary).map_err(|e| {
            StegError::model_load(model_path, format!("モデル本体を復元できません: {}", e))
        })?;

        let config = InferenceConfig::from_metadata(&metadata);
        if forest.n_classes() != config.num_classes() {
            return Err(StegError::model_load(
                model_path,
                format!(
                    "モデルのクラス数 {} がクラス名の数 {} と一致しません",
                    forest.n_classes(),
                    config.num_classes()
                ),
            ));
        }
        if forest.n_features() != config.feature_len() {
            return Err(StegError::model_load(
                model_path,
                format!(
                    "モデルの特徴量次元 {} が {} と一致しません",
                    forest.n_features(),
                    config.feature_len()
                ),
            ));
        }

        forest.validate().map_err(|reason| {
            StegError::model_load(model_path, format!("モデル本体が壊れています: {}", reason))
        })?;

        tracing::info!(
            "モデルを読み込みました: {} (クラス: {}, 決定木: {} 本)",
            model_path.display(),
            config.class_names.join(", "),
            forest.n_trees()
        );

        Ok(Self {
            forest,
            config,
            metadata,
        })
    }

    /// 画像ファイルを分類
    pub fn predict<P: AsRef<Path>>(&self, image_path: P) -> Result<Prediction> {
        let features = extract_from_path(image_path.as_ref())?;
        self.predict_features(&features)
    }

    /// メモリ上の画像データ（PNG/JPEG）を分類
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let features = extract_from_bytes(bytes)?;
        self.predict_features(&features)
    }

    /// 抽出済みの特徴量を分類
    pub fn predict_features(&self, features: &FeatureVector) -> Result<Prediction> {
        if features.len() != self.forest.n_features() {
            return Err(StegError::invalid_image(
                "<features>",
                format!(
                    "特徴量の次元数が {} です（期待: {}）",
                    features.len(),
                    self.forest.n_features()
                ),
            ));
        }

        let probabilities = self.forest.predict_proba(features.as_slice());
        let (class_index, confidence) = argmax(&probabilities);
        // 読み込み時にクラス数を照合済み
        let label = self
            .config
            .class_index_to_label(class_index)
            .unwrap_or_default()
            .to_string();

        Ok(Prediction {
            class_index,
            label,
            confidence,
            probabilities,
        })
    }

    /// 複数画像をまとめて分類（失敗した画像はその位置にエラーを返す）
    pub fn predict_batch<P: AsRef<Path>>(&self, image_paths: &[P]) -> Vec<Result<Prediction>> {
        image_paths.iter().map(|path| self.predict(path)).collect()
    }

    /// InferenceConfigへの参照を取得
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn class_names(&self) -> &[String] {
        &self.config.class_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::tree::{DecisionTree, Node};
    use crate::ml::ForestParams;
    use crate::model::{save_model_with_metadata, SCHEMA_VERSION};
    use crate::types::FEATURE_LEN;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn class_names() -> Vec<String> {
        vec!["Clean".to_string(), "Stego".to_string()]
    }

    fn png_bytes(color: [u8; 3]) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(4, 4, Rgb(color))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// 暗い単色画像を Clean、明るい単色画像を Stego として学習したモデル
    fn train_forest() -> RandomForest {
        let features: Vec<FeatureVector> = [10u8, 20, 30, 40, 200, 210, 220, 230]
            .iter()
            .map(|&v| extract_from_bytes(&png_bytes([v, v, v])).unwrap())
            .collect();
        let rows: Vec<&[f32]> = features.iter().map(|f| f.as_slice()).collect();
        let y = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let params = ForestParams {
            n_estimators: 50,
            ..ForestParams::default()
        };
        RandomForest::fit(&rows, &y, 2, &params).unwrap()
    }

    fn save(dir: &Path, metadata: &ModelMetadata, forest: &RandomForest) -> PathBuf {
        save_model_with_metadata(&dir.join("model.tar.gz"), metadata, &forest.to_bytes().unwrap())
            .unwrap()
    }

    fn metadata() -> ModelMetadata {
        ModelMetadata::new("test", class_names(), ForestParams::default())
    }

    fn engine(dir: &Path) -> InferenceEngine {
        let path = save(dir, &metadata(), &train_forest());
        InferenceEngine::load(path).unwrap()
    }

    #[test]
    fn test_predict_from_file_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());

        let image_path = dir.path().join("dark.png");
        std::fs::write(&image_path, png_bytes([10, 10, 10])).unwrap();

        let from_file = engine.predict(&image_path).unwrap();
        let from_bytes = engine.predict_bytes(&png_bytes([10, 10, 10])).unwrap();
        assert_eq!(from_file, from_bytes);
        assert_eq!(from_file.label, "Clean");
        assert_eq!(from_file.class_index, 0);
        assert_eq!(from_file.probabilities.len(), 2);
        assert_eq!(from_file.confidence, from_file.probabilities[0]);

        let bright = engine.predict_bytes(&png_bytes([230, 230, 230])).unwrap();
        assert_eq!(bright.label, "Stego");
    }

    #[test]
    fn test_summary_format() {
        let prediction = Prediction {
            class_index: 1,
            label: "Stego".to_string(),
            confidence: 0.8734,
            probabilities: vec![0.1266, 0.8734],
        };
        assert_eq!(prediction.summary(), "Stego Detected\nConfidence: 87.34%");
    }

    #[test]
    fn test_invalid_images() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());

        let missing = engine.predict(dir.path().join("missing.png"));
        assert!(matches!(missing, Err(StegError::InvalidImage { .. })));

        let corrupt = engine.predict_bytes(b"garbage");
        assert!(matches!(corrupt, Err(StegError::InvalidImage { .. })));

        let short = engine.predict_features(&FeatureVector::from(vec![0.0; 10]));
        assert!(matches!(short, Err(StegError::InvalidImage { .. })));

        // 失敗後も引き続き使える
        assert!(engine.predict_bytes(&png_bytes([1, 2, 3])).is_ok());
    }

    #[test]
    fn test_batch_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let ok = dir.path().join("ok.png");
        std::fs::write(&ok, png_bytes([220, 220, 220])).unwrap();

        let results = engine.predict_batch(&[ok.clone(), dir.path().join("nope.png"), ok]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_load_failures() {
        let dir = tempfile::tempdir().unwrap();
        let forest = train_forest();

        let missing = InferenceEngine::load(dir.path().join("missing.tar.gz"));
        assert!(matches!(missing, Err(StegError::ModelLoadFailure { .. })));

        let mut newer = metadata();
        newer.schema_version = SCHEMA_VERSION + 1;
        let path = save(dir.path(), &newer, &forest);
        assert!(matches!(
            InferenceEngine::load(&path),
            Err(StegError::ModelLoadFailure { .. })
        ));

        let mut layout = metadata();
        layout.feature_layout.bins = 128;
        let path = save(dir.path(), &layout, &forest);
        assert!(matches!(
            InferenceEngine::load(&path),
            Err(StegError::ModelLoadFailure { .. })
        ));

        let mut three_classes = metadata();
        three_classes.class_names.push("Other".to_string());
        let path = save(dir.path(), &three_classes, &forest);
        assert!(matches!(
            InferenceEngine::load(&path),
            Err(StegError::ModelLoadFailure { .. })
        ));

        let path = save_model_with_metadata(&dir.path().join("bad.tar.gz"), &metadata(), b"junk")
            .unwrap();
        assert!(matches!(
            InferenceEngine::load(&path),
            Err(StegError::ModelLoadFailure { .. })
        ));
    }

    #[test]
    fn test_rejects_forest_with_other_feature_len() {
        let dir = tempfile::tempdir().unwrap();
        let rows = [vec![0.0f32, 1.0], vec![1.0, 0.0]];
        let x: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();
        let forest = RandomForest::fit(&x, &[0, 1], 2, &ForestParams::default()).unwrap();
        assert_ne!(forest.n_features(), FEATURE_LEN);

        let path = save(dir.path(), &metadata(), &forest);
        assert!(matches!(
            InferenceEngine::load(&path),
            Err(StegError::ModelLoadFailure { .. })
        ));
    }

    /// 構造の壊れたフォレストを保存して読み込みを試す
    fn load_broken(dir: &Path, trees: Vec<DecisionTree>) -> Result<InferenceEngine> {
        let forest = RandomForest::from_trees(FEATURE_LEN, 2, trees);
        let path = save(dir, &metadata(), &forest);
        InferenceEngine::load(path)
    }

    #[test]
    fn test_rejects_forest_with_broken_trees() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = || Node::Leaf {
            distribution: vec![0.5, 0.5],
        };

        let out_of_range_feature = DecisionTree::from_nodes(vec![
            Node::Split {
                feature: 9999,
                threshold: 0.5,
                left: 1,
                right: 1,
            },
            leaf(),
        ]);
        assert!(matches!(
            load_broken(dir.path(), vec![out_of_range_feature]),
            Err(StegError::ModelLoadFailure { .. })
        ));

        let cycle = DecisionTree::from_nodes(vec![Node::Split {
            feature: 0,
            threshold: 0.5,
            left: 0,
            right: 0,
        }]);
        assert!(matches!(
            load_broken(dir.path(), vec![cycle]),
            Err(StegError::ModelLoadFailure { .. })
        ));

        assert!(matches!(
            load_broken(dir.path(), Vec::new()),
            Err(StegError::ModelLoadFailure { .. })
        ));

        let engine = load_broken(dir.path(), vec![DecisionTree::from_nodes(vec![leaf()])]).unwrap();
        let prediction = engine.predict_features(&FeatureVector::from(vec![0.0; FEATURE_LEN]));
        assert_eq!(prediction.unwrap().probabilities, vec![0.5, 0.5]);
    }

    #[test]
    fn test_concurrent_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine(dir.path()));
        let images = [[10u8, 10, 10], [230, 230, 230], [20, 20, 20], [220, 220, 220]];
        let expected: Vec<Prediction> = images
            .iter()
            .map(|&color| engine.predict_bytes(&png_bytes(color)).unwrap())
            .collect();
        assert_eq!(expected[0].label, "Clean");
        assert_eq!(expected[1].label, "Stego");

        let handles: Vec<_> = images
            .iter()
            .map(|&color| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| engine.predict_bytes(&png_bytes(color)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for ((handle, expected), label) in handles
            .into_iter()
            .zip(&expected)
            .zip(["Clean", "Stego", "Clean", "Stego"])
        {
            for prediction in handle.join().unwrap() {
                assert_eq!(prediction.label, label);
                assert_eq!(&prediction, expected);
            }
        }
    }
}
