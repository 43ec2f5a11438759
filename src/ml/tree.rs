//! 分類用の決定木（CART, ジニ不純度）
//!
//! ノードは配列に平坦化して保持し、再帰ではなく明示的なスタックで構築します。

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// 木の構築パラメータ
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    /// 各分岐で検討する特徴量の数
    pub max_features: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Node {
    /// `row[feature] <= threshold` なら left、そうでなければ right
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    /// クラスごとの割合
    Leaf { distribution: Vec<f32> },
}

/// 学習済みの決定木
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct Pending {
    slot: usize,
    samples: Vec<usize>,
    depth: usize,
}

impl DecisionTree {
    /// `samples`（重複可、ブートストラップ用）を使って木を構築
    ///
    /// `x` の各行は同じ長さ、`y` は `n_classes` 未満であることを呼び出し側が保証する。
    pub fn fit(
        x: &[&[f32]],
        y: &[usize],
        samples: Vec<usize>,
        n_classes: usize,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = x.first().map(|row| row.len()).unwrap_or(0);
        let mut nodes = vec![placeholder()];
        let mut stack = vec![Pending {
            slot: 0,
            samples,
            depth: 0,
        }];

        while let Some(Pending { slot, samples, depth }) = stack.pop() {
            let counts = class_counts(y, &samples, n_classes);
            let n = samples.len();

            let is_pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
            let depth_reached = params.max_depth.map_or(false, |max| depth >= max);
            let too_small = n < params.min_samples_split || n < 2 * params.min_samples_leaf;

            if is_pure || depth_reached || too_small {
                nodes[slot] = leaf(&counts, n);
                continue;
            }

            let Some((feature, threshold)) =
                best_split(x, y, &samples, &counts, n_features, n_classes, params, rng)
            else {
                nodes[slot] = leaf(&counts, n);
                continue;
            };

            let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
                .into_iter()
                .partition(|&i| x[i][feature] <= threshold);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(placeholder());
            nodes.push(placeholder());
            nodes[slot] = Node::Split {
                feature,
                threshold,
                left,
                right,
            };

            stack.push(Pending {
                slot: right,
                samples: right_samples,
                depth: depth + 1,
            });
            stack.push(Pending {
                slot: left,
                samples: left_samples,
                depth: depth + 1,
            });
        }

        Self { nodes }
    }

    /// 葉に到達するまで辿り、その葉のクラス分布を返す
    pub fn predict_distribution(&self, row: &[f32]) -> &[f32] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
                Node::Leaf { distribution } => return distribution,
            }
        }
    }

    /// 読み込んだ木の構造を検証する
    ///
    /// 子ノードは必ず親より後ろに置かれるので、子のインデックスが
    /// 自身より大きいことを確認すれば循環は起こらない。
    pub fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("ノードがありません".to_string());
        }

        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "ノード {} の特徴量 {} が次元数 {} の範囲外です",
                            index, feature, n_features
                        ));
                    }
                    for child in [*left, *right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(format!("ノード {} の子ノード {} が不正です", index, child));
                        }
                    }
                }
                Node::Leaf { distribution } => {
                    if distribution.len() != n_classes {
                        return Err(format!(
                            "ノード {} のクラス分布が {} 要素です（期待: {}）",
                            index,
                            distribution.len(),
                            n_classes
                        ));
                    }
                    if distribution.iter().any(|p| !p.is_finite()) {
                        return Err(format!("ノード {} のクラス分布に非有限値があります", index));
                    }
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((index, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[index] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        max_depth
    }
}

fn placeholder() -> Node {
    Node::Leaf {
        distribution: Vec::new(),
    }
}

fn leaf(counts: &[usize], n: usize) -> Node {
    let total = n.max(1) as f32;
    Node::Leaf {
        distribution: counts.iter().map(|&c| c as f32 / total).collect(),
    }
}

fn class_counts(y: &[usize], samples: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &i in samples {
        counts[y[i]] += 1;
    }
    counts
}

/// `n * gini = n - Σ c² / n`
fn weighted_gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    let sum_sq: f64 = counts.iter().map(|&c| (c as f64) * (c as f64)).sum();
    n - sum_sq / n
}

/// ランダムに選んだ特徴量の中から子ノードの不純度の和が最小となる分岐を探す
///
/// 定数の特徴量は検討数に数えず、次の特徴量を試す。
#[allow(clippy::too_many_arguments)]
fn best_split(
    x: &[&[f32]],
    y: &[usize],
    samples: &[usize],
    counts: &[usize],
    n_features: usize,
    n_classes: usize,
    params: &TreeParams,
    rng: &mut StdRng,
) -> Option<(usize, f32)> {
    let n = samples.len();
    let mut candidates: Vec<usize> = (0..n_features).collect();
    candidates.shuffle(rng);

    let mut best: Option<(f64, usize, f32)> = None;
    let mut visited = 0;
    let mut column: Vec<(f32, usize)> = Vec::with_capacity(n);

    for feature in candidates {
        if visited >= params.max_features {
            break;
        }

        column.clear();
        column.extend(samples.iter().map(|&i| (x[i][feature], y[i])));
        column.sort_by(|a, b| a.0.total_cmp(&b.0));

        if column[0].0 == column[n - 1].0 {
            continue;
        }
        visited += 1;

        let mut left = vec![0usize; n_classes];
        let mut right = counts.to_vec();

        for pos in 0..n - 1 {
            let (value, label) = column[pos];
            left[label] += 1;
            right[label] -= 1;

            let next = column[pos + 1].0;
            if value == next {
                continue;
            }

            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                continue;
            }

            let score = weighted_gini(&left, n_left) + weighted_gini(&right, n_right);
            if best.map_or(true, |(best_score, _, _)| score < best_score) {
                best = Some((score, feature, midpoint(value, next)));
            }
        }
    }

    best.map(|(_, feature, threshold)| (feature, threshold))
}

/// 2値の中点。丸めで上側の値と等しくなる場合は下側の値を使う
fn midpoint(low: f32, high: f32) -> f32 {
    let mid = low + (high - low) / 2.0;
    if mid >= high {
        low
    } else {
        mid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params(max_features: usize) -> TreeParams {
        TreeParams {
            max_features,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }

    #[test]
    fn test_separable_data_fits_exactly() {
        let rows: Vec<Vec<f32>> = vec![
            vec![0.1, 0.9],
            vec![0.2, 0.8],
            vec![0.3, 0.7],
            vec![0.7, 0.3],
            vec![0.8, 0.2],
            vec![0.9, 0.1],
        ];
        let x: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();
        let y = vec![0, 0, 0, 1, 1, 1];
        let mut rng = StdRng::seed_from_u64(7);

        let tree = DecisionTree::fit(&x, &y, (0..6).collect(), 2, &params(2), &mut rng);

        for (row, &label) in x.iter().zip(&y) {
            let dist = tree.predict_distribution(row);
            assert_eq!(dist[label], 1.0);
        }
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn test_pure_node_is_single_leaf() {
        let rows = vec![vec![0.0f32], vec![1.0]];
        let x: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();
        let mut rng = StdRng::seed_from_u64(0);

        let tree = DecisionTree::fit(&x, &[1, 1], vec![0, 1], 2, &params(1), &mut rng);

        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict_distribution(&[0.5]), &[0.0, 1.0]);
    }

    #[test]
    fn test_constant_features_give_mixed_leaf() {
        let rows = vec![vec![0.5f32, 0.5], vec![0.5, 0.5], vec![0.5, 0.5], vec![0.5, 0.5]];
        let x: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();
        let mut rng = StdRng::seed_from_u64(0);

        let tree = DecisionTree::fit(&x, &[0, 1, 1, 1], (0..4).collect(), 2, &params(1), &mut rng);

        assert_eq!(tree.predict_distribution(&[0.5, 0.5]), &[0.25, 0.75]);
    }

    #[test]
    fn test_constant_feature_does_not_use_up_budget() {
        // 特徴量0は定数、特徴量1だけが有効。max_features=1 でも分岐できる
        let rows = vec![vec![1.0f32, 0.0], vec![1.0, 0.1], vec![1.0, 0.9], vec![1.0, 1.0]];
        let x: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();

        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let tree =
                DecisionTree::fit(&x, &[0, 0, 1, 1], (0..4).collect(), 2, &params(1), &mut rng);
            assert_eq!(tree.predict_distribution(&[1.0, 0.05])[0], 1.0);
            assert_eq!(tree.predict_distribution(&[1.0, 0.95])[1], 1.0);
        }
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let rows: Vec<Vec<f32>> = (0..8).map(|i| vec![i as f32]).collect();
        let x: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();
        let y = vec![0, 1, 0, 1, 0, 1, 0, 1];
        let mut rng = StdRng::seed_from_u64(3);
        let limited = TreeParams {
            max_depth: Some(2),
            ..params(1)
        };

        let tree = DecisionTree::fit(&x, &y, (0..8).collect(), 2, &limited, &mut rng);
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_fitted_tree_is_valid() {
        let rows = vec![vec![0.1f32, 0.9], vec![0.2, 0.8], vec![0.8, 0.2], vec![0.9, 0.1]];
        let x: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();
        let mut rng = StdRng::seed_from_u64(1);

        let tree = DecisionTree::fit(&x, &[0, 0, 1, 1], (0..4).collect(), 2, &params(2), &mut rng);
        assert!(tree.validate(2, 2).is_ok());
        assert!(tree.validate(2, 3).is_err());
    }

    #[test]
    fn test_validate_rejects_broken_nodes() {
        let leaf = || Node::Leaf {
            distribution: vec![0.5, 0.5],
        };
        let split = |feature, left, right| Node::Split {
            feature,
            threshold: 0.5,
            left,
            right,
        };

        assert!(DecisionTree::from_nodes(vec![]).validate(4, 2).is_err());

        let out_of_range_feature = DecisionTree::from_nodes(vec![split(9999, 1, 2), leaf(), leaf()]);
        assert!(out_of_range_feature.validate(4, 2).is_err());

        let missing_child = DecisionTree::from_nodes(vec![split(0, 1, 5), leaf()]);
        assert!(missing_child.validate(4, 2).is_err());

        let self_loop = DecisionTree::from_nodes(vec![split(0, 0, 1), leaf()]);
        assert!(self_loop.validate(4, 2).is_err());

        let back_edge =
            DecisionTree::from_nodes(vec![split(0, 1, 2), split(1, 0, 2), leaf()]);
        assert!(back_edge.validate(4, 2).is_err());

        let short_leaf = DecisionTree::from_nodes(vec![Node::Leaf {
            distribution: vec![1.0],
        }]);
        assert!(short_leaf.validate(4, 2).is_err());

        let valid = DecisionTree::from_nodes(vec![split(3, 1, 2), leaf(), leaf()]);
        assert!(valid.validate(4, 2).is_ok());
    }

    #[test]
    fn test_midpoint() {
        assert_eq!(midpoint(0.0, 1.0), 0.5);
        let a = 1.0f32;
        let b = f32::from_bits(a.to_bits() + 1);
        assert_eq!(midpoint(a, b), a);
    }
}
