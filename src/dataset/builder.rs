//! ラベル付きディレクトリから分割ごとの特徴量データを生成
//!
//! ディレクトリ構成:
//! ```text
//! root/<split>/<split>/<クラス名>/<画像ファイル>
//! ```
//! クラス名が `clean`（大文字小文字無視）なら Clean、それ以外はすべて Stego。

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::dataset::split_store::SplitData;
use crate::error::{Result, StegError};
use crate::features::{extract_from_path, FeatureVector};
use crate::types::{is_supported_image, Label, Split};

/// 進捗情報
#[derive(Debug, Clone)]
pub struct BuildProgress<'a> {
    pub split: Split,
    /// 処理が終わったクラスディレクトリ名
    pub class_dir: &'a str,
    /// この分割で処理済みの画像数（失敗分を含む）
    pub processed: usize,
    /// この分割の画像総数
    pub total: usize,
}

/// 分割ごとの処理結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitSummary {
    pub split: Split,
    pub samples: usize,
    pub clean: usize,
    pub stego: usize,
    /// 特徴量抽出に失敗してスキップした画像数
    pub skipped: usize,
    /// 保存先（サンプルが0件の場合は保存しない）
    pub saved_to: Option<PathBuf>,
}

/// クラスディレクトリとその中の画像一覧
struct ClassDir {
    name: String,
    label: Label,
    images: Vec<PathBuf>,
}

/// データセットビルダー
pub struct DatasetBuilder {
    root: PathBuf,
    output_dir: PathBuf,
}

impl DatasetBuilder {
    pub fn new(root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 分割のクラスディレクトリが並ぶ場所（`root/<split>/<split>`）
    pub fn split_dir(&self, split: Split) -> PathBuf {
        self.root.join(split.as_str()).join(split.as_str())
    }

    /// 指定した全分割を処理して保存
    pub fn build(&self, splits: &[Split]) -> Result<Vec<SplitSummary>> {
        self.build_with_progress(splits, |_| {})
    }

    pub fn build_with_progress<F>(&self, splits: &[Split], mut progress: F) -> Result<Vec<SplitSummary>>
    where
        F: FnMut(&BuildProgress),
    {
        splits
            .iter()
            .map(|&split| self.build_split(split, &mut progress))
            .collect()
    }

    /// 1分割を処理し、サンプルがあれば保存する
    pub fn build_split(
        &self,
        split: Split,
        progress: &mut dyn FnMut(&BuildProgress),
    ) -> Result<SplitSummary> {
        info!("{} 分割を処理中...", split);

        let (data, skipped) = self.collect_split(split, progress)?;

        let saved_to = if data.is_empty() {
            warn!("{} 分割にデータが見つかりませんでした", split);
            None
        } else {
            std::fs::create_dir_all(&self.output_dir)
                .map_err(|e| StegError::io(&self.output_dir, e))?;
            let path = data.save(&self.output_dir)?;
            info!("{} 分割を保存しました: {} 件 -> {}", split, data.len(), path.display());
            Some(path)
        };

        Ok(SplitSummary {
            split,
            samples: data.len(),
            clean: data.count(Label::Clean),
            stego: data.count(Label::Stego),
            skipped,
            saved_to,
        })
    }

    /// 1分割分の特徴量を抽出する（保存はしない）
    ///
    /// 戻り値は (分割データ, スキップした画像数)。
    /// クラスディレクトリはパス順、各ディレクトリ内の画像もパス順に処理する。
    pub fn collect_split(
        &self,
        split: Split,
        progress: &mut dyn FnMut(&BuildProgress),
    ) -> Result<(SplitData, usize)> {
        let split_dir = self.split_dir(split);
        let mut data = SplitData::new(split);

        if !split_dir.is_dir() {
            warn!("分割ディレクトリが存在しません: {}", split_dir.display());
            return Ok((data, 0));
        }

        let class_dirs = scan_class_dirs(&split_dir)?;
        let total: usize = class_dirs.iter().map(|c| c.images.len()).sum();
        let mut processed = 0;
        let mut skipped = 0;

        for class_dir in &class_dirs {
            debug!(
                "{}/{}: {} 枚 ({:?})",
                split,
                class_dir.name,
                class_dir.images.len(),
                class_dir.label
            );

            for (path, result) in class_dir.images.iter().zip(extract_all(&class_dir.images)) {
                match result {
                    Ok(features) => data.push(features, class_dir.label),
                    Err(e) if e.is_recoverable() => {
                        warn!("スキップ {}: {}", path.display(), e);
                        skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            processed += class_dir.images.len();
            progress(&BuildProgress {
                split,
                class_dir: &class_dir.name,
                processed,
                total,
            });
        }

        Ok((data, skipped))
    }
}

/// クラスディレクトリと画像ファイルを列挙（いずれもパス順）
fn scan_class_dirs(split_dir: &Path) -> Result<Vec<ClassDir>> {
    let dirs = sorted_entries(split_dir)?
        .into_iter()
        .filter(|path| path.is_dir());

    dirs
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let images = sorted_entries(&path)?
                .into_iter()
                .filter(|p| p.is_file() && is_supported_image(p))
                .collect();

            Ok(ClassDir {
                label: Label::from_class_dir(&name),
                name,
                images,
            })
        })
        .collect()
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| StegError::io(dir, e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StegError::io(dir, e))?;
        paths.push(entry.path());
    }
    paths.sort();

    Ok(paths)
}

/// 画像リストの特徴量を入力順のまま抽出
#[cfg(feature = "parallel")]
fn extract_all(paths: &[PathBuf]) -> Vec<Result<FeatureVector>> {
    paths.par_iter().map(|p| extract_from_path(p)).collect()
}

#[cfg(not(feature = "parallel"))]
fn extract_all(paths: &[PathBuf]) -> Vec<Result<FeatureVector>> {
    paths.iter().map(|p| extract_from_path(p)).collect()
}
