//! モデル学習と評価
//!
//! 抽出済みの train/val/test 分割を読み込み、train でフォレストを学習し、
//! 3分割すべてを評価してからメタデータ付きでモデルを保存します。

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::dataset::SplitData;
use crate::error::{Result, StegError};
use crate::ml::forest::{ForestParams, RandomForest};
use crate::ml::metrics::{ClassificationReport, ConfusionMatrix};
use crate::model::config::AppConfig;
use crate::model::{save_model_with_metadata, ModelMetadata, SplitScore};
use crate::types::{Label, Split};

/// 学習の入力設定
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// `{split}_data.bin` が置かれたディレクトリ
    pub data_dir: PathBuf,
    /// 保存先（拡張子は `.tar.gz` に揃えられる）
    pub model_path: PathBuf,
    pub model_name: String,
    pub class_names: Vec<String>,
    pub params: ForestParams,
}

impl TrainerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            data_dir: config.paths.extracted_data_dir.clone(),
            model_path: config.paths.model_path.clone(),
            model_name: config.training.model_name.clone(),
            class_names: config.class_names.clone(),
            params: config.training.forest.clone(),
        }
    }
}

/// 1分割分の評価結果
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub split: Split,
    pub samples: usize,
    pub accuracy: f64,
    pub report: ClassificationReport,
    pub confusion: ConfusionMatrix,
}

impl Evaluation {
    /// メタデータに記録する要約
    pub fn score(&self) -> SplitScore {
        SplitScore {
            split: self.split,
            accuracy: self.accuracy,
            samples: self.samples,
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.split.display_name();
        writeln!(f, "{} Accuracy: {:.4}", name, self.accuracy)?;
        writeln!(f, "{} Classification Report:", name)?;
        writeln!(f, "{}", self.report)?;
        writeln!(f, "{} Confusion Matrix:", name)?;
        write!(f, "{}", self.confusion)
    }
}

/// 学習結果
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub train: Evaluation,
    pub val: Evaluation,
    pub test: Evaluation,
    pub model_path: PathBuf,
    pub metadata: ModelMetadata,
}

impl TrainingReport {
    pub fn evaluations(&self) -> [&Evaluation; 3] {
        [&self.train, &self.val, &self.test]
    }
}

/// 学習済みフォレストで分割データを評価
///
/// # Panics
/// データの次元数がフォレストの学習時と異なる場合
pub fn evaluate(forest: &RandomForest, data: &SplitData, class_names: &[String]) -> Evaluation {
    let rows: Vec<&[f32]> = data.features.iter().map(|f| f.as_slice()).collect();
    let y_true = data.label_indices();
    let y_pred = forest.predict_batch(&rows);

    let confusion = ConfusionMatrix::from_predictions(&y_true, &y_pred, forest.n_classes());
    let report = ClassificationReport::from_confusion(&confusion, class_names);

    Evaluation {
        split: data.split,
        samples: data.len(),
        accuracy: report.accuracy,
        report,
        confusion,
    }
}

/// 学習用データでフォレストを学習
pub fn fit(train: &SplitData, params: &ForestParams) -> Result<RandomForest> {
    let rows: Vec<&[f32]> = train.features.iter().map(|f| f.as_slice()).collect();
    RandomForest::fit(&rows, &train.label_indices(), Label::ALL.len(), params)
}

/// 3分割をすべて読み込む。欠落・破損・空の分割があればエラー
pub fn load_splits(config: &TrainerConfig) -> Result<[SplitData; 3]> {
    let load = |split: Split| -> Result<SplitData> {
        let data = SplitData::load(&config.data_dir, split)?;
        if data.is_empty() {
            return Err(StegError::dataset(format!(
                "{} 分割のデータが空です",
                split
            )));
        }
        info!(
            "{} データを読み込みました: {} 件 (Clean {}, Stego {})",
            split.display_name(),
            data.len(),
            data.count(Label::Clean),
            data.count(Label::Stego)
        );
        Ok(data)
    };

    Ok([load(Split::Train)?, load(Split::Val)?, load(Split::Test)?])
}

/// モデルを学習・評価し、メタデータと共に保存する
pub fn train_model(config: &TrainerConfig) -> Result<TrainingReport> {
    if config.class_names.len() != Label::ALL.len() {
        return Err(StegError::dataset(format!(
            "クラス名は {} 個である必要があります（指定: {:?}）",
            Label::ALL.len(),
            config.class_names
        )));
    }

    let [train_data, val_data, test_data] = load_splits(config)?;

    info!(
        "学習を開始します: 決定木 {} 本, シード {}, 特徴量 {}",
        config.params.n_estimators, config.params.random_state, config.params.max_features
    );
    let forest = fit(&train_data, &config.params)?;
    info!(
        "学習が完了しました: 決定木 {} 本, 総ノード数 {}",
        forest.n_trees(),
        forest.total_nodes()
    );

    let train = evaluate(&forest, &train_data, &config.class_names);
    let val = evaluate(&forest, &val_data, &config.class_names);
    let test = evaluate(&forest, &test_data, &config.class_names);
    for evaluation in [&train, &val, &test] {
        info!(
            "{} Accuracy: {:.4} ({} 件)",
            evaluation.split.display_name(),
            evaluation.accuracy,
            evaluation.samples
        );
    }

    let metadata = ModelMetadata::new(
        config.model_name.clone(),
        config.class_names.clone(),
        config.params.clone(),
    )
    .with_evaluation(vec![train.score(), val.score(), test.score()]);

    let model_binary = forest
        .to_bytes()
        .map_err(|e| StegError::fitting(format!("モデルのシリアライズに失敗しました: {}", e)))?;
    let model_path = save_model_with_metadata(&config.model_path, &metadata, &model_binary)?;
    info!("モデルを保存しました: {}", model_path.display());

    Ok(TrainingReport {
        train,
        val,
        test,
        model_path,
        metadata,
    })
}
