//! ランダムフォレスト分類器
//!
//! 決定木ごとにブートストラップ標本を作り、分岐ごとに特徴量の一部だけを検討します。
//! 予測確率は全木の葉のクラス分布の平均です。
//!
//! # 再現性
//! 各木のシードは `random_state` から事前に生成するため、
//! 並列 (rayon) でも逐次でも同じデータ・同じシードなら同じモデルになります。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{Result, StegError};
use crate::ml::tree::{DecisionTree, TreeParams};

/// 分岐ごとに検討する特徴量数の決め方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// √n_features
    Sqrt,
    /// log2(n_features)
    Log2,
    /// すべての特徴量
    All,
    /// 固定数
    Fixed(usize),
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Fixed(n) => n,
        };
        n.clamp(1, n_features.max(1))
    }
}

impl std::fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::Log2 => write!(f, "log2"),
            MaxFeatures::All => write!(f, "all"),
            MaxFeatures::Fixed(n) => write!(f, "{}", n),
        }
    }
}

/// フォレストのハイパーパラメータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// 決定木の本数
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// 乱数シード
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    #[serde(default = "default_max_features")]
    pub max_features: MaxFeatures,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    #[serde(default = "default_bootstrap")]
    pub bootstrap: bool,
}

fn default_n_estimators() -> usize {
    100
}

fn default_random_state() -> u64 {
    42
}

fn default_max_features() -> MaxFeatures {
    MaxFeatures::Sqrt
}

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_bootstrap() -> bool {
    true
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            random_state: default_random_state(),
            max_features: default_max_features(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            bootstrap: default_bootstrap(),
        }
    }
}

/// 学習済みランダムフォレスト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// フォレストを学習
    ///
    /// - `x`: 特徴量行列（全行同じ長さ）
    /// - `y`: クラスインデックス（`n_classes` 未満）
    ///
    /// データが空、行の長さが揃っていない、非有限値を含む、
    /// ラベルが範囲外、またはクラスが1種類しかない場合は `Fitting` エラー。
    pub fn fit(x: &[&[f32]], y: &[usize], n_classes: usize, params: &ForestParams) -> Result<Self> {
        let n_features = validate_training_data(x, y, n_classes)?;
        if params.n_estimators == 0 {
            return Err(StegError::fitting("決定木の本数は1以上である必要があります"));
        }

        let tree_params = TreeParams {
            max_features: params.max_features.resolve(n_features),
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split.max(2),
            min_samples_leaf: params.min_samples_leaf.max(1),
        };

        let mut seeder = StdRng::seed_from_u64(params.random_state);
        let seeds: Vec<u64> = (0..params.n_estimators).map(|_| seeder.gen()).collect();

        let fit_one = |seed: &u64| {
            let mut rng = StdRng::seed_from_u64(*seed);
            let samples = if params.bootstrap {
                (0..y.len()).map(|_| rng.gen_range(0..y.len())).collect()
            } else {
                (0..y.len()).collect()
            };
            DecisionTree::fit(x, y, samples, n_classes, &tree_params, &mut rng)
        };

        #[cfg(feature = "parallel")]
        let trees: Vec<DecisionTree> = seeds.par_iter().map(fit_one).collect();
        #[cfg(not(feature = "parallel"))]
        let trees: Vec<DecisionTree> = seeds.iter().map(fit_one).collect();

        Ok(Self {
            params: params.clone(),
            n_features,
            n_classes,
            trees,
        })
    }

    /// クラスごとの予測確率（全木の平均）
    ///
    /// # Panics
    /// `row` の長さが学習時の特徴量数と異なる場合
    pub fn predict_proba(&self, row: &[f32]) -> Vec<f32> {
        assert_eq!(
            row.len(),
            self.n_features,
            "特徴量の次元数が学習時と異なります"
        );

        let mut sums = vec![0.0f64; self.n_classes];
        for tree in &self.trees {
            for (sum, p) in sums.iter_mut().zip(tree.predict_distribution(row)) {
                *sum += *p as f64;
            }
        }

        let n_trees = self.trees.len().max(1) as f64;
        sums.into_iter().map(|s| (s / n_trees) as f32).collect()
    }

    /// 予測クラスとその確率（同率の場合は小さいインデックス）
    pub fn predict_with_confidence(&self, row: &[f32]) -> (usize, f32) {
        let proba = self.predict_proba(row);
        argmax(&proba)
    }

    pub fn predict(&self, row: &[f32]) -> usize {
        self.predict_with_confidence(row).0
    }

    /// 複数行をまとめて予測
    pub fn predict_batch(&self, rows: &[&[f32]]) -> Vec<usize> {
        rows.iter().map(|row| self.predict(row)).collect()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// 全木のノード数の合計
    pub fn total_nodes(&self) -> usize {
        self.trees.iter().map(|t| t.node_count()).sum()
    }

    /// 読み込んだフォレストの構造を検証する
    ///
    /// bincode として正しくても中身が壊れていれば予測時に範囲外参照や
    /// 無限ループになるため、推論に使う前に必ず呼び出す。
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.n_features == 0 || self.n_classes == 0 {
            return Err(format!(
                "特徴量次元 {} / クラス数 {} は使用できません",
                self.n_features, self.n_classes
            ));
        }
        if self.trees.is_empty() {
            return Err("決定木が含まれていません".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.n_classes)
                .map_err(|e| format!("決定木 {}: {}", i, e))?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn from_trees(n_features: usize, n_classes: usize, trees: Vec<DecisionTree>) -> Self {
        Self {
            params: ForestParams::default(),
            n_features,
            n_classes,
            trees,
        }
    }

    /// バイナリ（bincode）に変換
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

pub(crate) fn argmax(values: &[f32]) -> (usize, f32) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best })
}

fn validate_training_data(x: &[&[f32]], y: &[usize], n_classes: usize) -> Result<usize> {
    if x.is_empty() || y.is_empty() {
        return Err(StegError::fitting("学習データが空です"));
    }
    if x.len() != y.len() {
        return Err(StegError::fitting(format!(
            "特徴量 {} 行に対してラベルが {} 件あります",
            x.len(),
            y.len()
        )));
    }

    let n_features = x[0].len();
    if n_features == 0 {
        return Err(StegError::fitting("特徴量の次元数が0です"));
    }
    if let Some(row) = x.iter().position(|row| row.len() != n_features) {
        return Err(StegError::fitting(format!(
            "{} 行目の次元数が {} です（期待: {}）",
            row,
            x[row].len(),
            n_features
        )));
    }
    if let Some(row) = x.iter().position(|row| row.iter().any(|v| !v.is_finite())) {
        return Err(StegError::fitting(format!("{} 行目に非有限値が含まれています", row)));
    }
    if let Some(&label) = y.iter().find(|&&label| label >= n_classes) {
        return Err(StegError::fitting(format!(
            "ラベル {} はクラス数 {} の範囲外です",
            label, n_classes
        )));
    }

    let mut present = vec![false; n_classes];
    for &label in y {
        present[label] = true;
    }
    if present.iter().filter(|&&p| p).count() < 2 {
        return Err(StegError::fitting(
            "学習データに1種類のクラスしか含まれていません",
        ));
    }

    Ok(n_features)
}
