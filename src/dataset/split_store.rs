//! 分割ごとの特徴量ファイルの保存・読み込み
//!
//! `<dir>/<split>_data.bin` に gzip 圧縮した bincode で保存します。
//! 中身は (特徴量行列, ラベル列) の組で、行数は常に一致します。

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{Result, StegError};
use crate::features::FeatureVector;
use crate::model::model_storage::write_atomic;
use crate::types::{Label, Split, FEATURE_LEN};

/// 1分割分の特徴量とラベル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitData {
    pub split: Split,
    pub feature_len: usize,
    pub features: Vec<FeatureVector>,
    pub labels: Vec<Label>,
}

impl SplitData {
    pub fn new(split: Split) -> Self {
        Self {
            split,
            feature_len: FEATURE_LEN,
            features: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn push(&mut self, features: FeatureVector, label: Label) {
        self.features.push(features);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn count(&self, label: Label) -> usize {
        self.labels.iter().filter(|l| **l == label).count()
    }

    /// 分類器に渡すクラスインデックス列
    pub fn label_indices(&self) -> Vec<usize> {
        self.labels.iter().map(|l| l.index()).collect()
    }

    /// 行数と次元数の整合性を確認
    pub fn validate(&self) -> Result<()> {
        if self.features.len() != self.labels.len() {
            return Err(StegError::dataset(format!(
                "{}: 特徴量 {} 行に対してラベルが {} 件あります",
                self.split,
                self.features.len(),
                self.labels.len()
            )));
        }
        if self.feature_len != FEATURE_LEN {
            return Err(StegError::dataset(format!(
                "{}: 特徴量の次元数 {} は {} と一致しません",
                self.split, self.feature_len, FEATURE_LEN
            )));
        }
        if let Some((row, features)) = self
            .features
            .iter()
            .enumerate()
            .find(|(_, f)| f.len() != self.feature_len)
        {
            return Err(StegError::dataset(format!(
                "{}: {} 行目の次元数が {} です（期待: {}）",
                self.split,
                row,
                features.len(),
                self.feature_len
            )));
        }
        Ok(())
    }

    /// `dir` 配下に保存し、保存先のパスを返す（既存ファイルは上書き）
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        self.validate()?;
        let path = split_path(dir, self.split);

        write_atomic(&path, |file| {
            let mut encoder = GzEncoder::new(file, Compression::default());
            bincode::serialize_into(&mut encoder, self).map_err(std::io::Error::other)?;
            encoder.finish()?;
            Ok(())
        })?;

        Ok(path)
    }

    /// `dir` から分割データを読み込む
    ///
    /// ファイルの欠落・破損・不整合はすべて `DatasetConfiguration` エラー。
    pub fn load(dir: &Path, split: Split) -> Result<Self> {
        let path = split_path(dir, split);

        let file = File::open(&path).map_err(|e| {
            StegError::dataset(format!("データファイルを開けません {}: {}", path.display(), e))
        })?;

        let decoder = GzDecoder::new(BufReader::new(file));
        let data: SplitData = bincode::deserialize_from(decoder).map_err(|e| {
            StegError::dataset(format!("データファイルが壊れています {}: {}", path.display(), e))
        })?;

        if data.split != split {
            return Err(StegError::dataset(format!(
                "{} には {} 分割ではなく {} 分割が保存されています",
                path.display(),
                split,
                data.split
            )));
        }
        data.validate()?;

        Ok(data)
    }
}

/// 分割データファイルのパス
pub fn split_path(dir: &Path, split: Split) -> PathBuf {
    dir.join(split.data_file_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_split(split: Split) -> SplitData {
        let mut data = SplitData::new(split);
        data.push(FeatureVector::from(vec![0.25; FEATURE_LEN]), Label::Clean);
        data.push(FeatureVector::from(vec![0.75; FEATURE_LEN]), Label::Stego);
        data
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample_split(Split::Val);

        let path = data.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("val_data.bin"));

        let loaded = SplitData::load(dir.path(), Split::Val).unwrap();
        assert_eq!(loaded, data);
        assert_eq!(loaded.label_indices(), vec![0, 1]);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        sample_split(Split::Train).save(dir.path()).unwrap();

        let mut smaller = SplitData::new(Split::Train);
        smaller.push(FeatureVector::from(vec![0.5; FEATURE_LEN]), Label::Stego);
        smaller.save(dir.path()).unwrap();

        assert_eq!(SplitData::load(dir.path(), Split::Train).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SplitData::load(dir.path(), Split::Test).unwrap_err();
        assert!(matches!(err, StegError::DatasetConfiguration(_)));
    }

    #[test]
    fn test_corrupt_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(split_path(dir.path(), Split::Train), b"garbage").unwrap();
        let err = SplitData::load(dir.path(), Split::Train).unwrap_err();
        assert!(matches!(err, StegError::DatasetConfiguration(_)));
    }

    #[test]
    fn test_mismatched_rows_rejected() {
        let mut data = sample_split(Split::Train);
        data.labels.pop();
        assert!(matches!(
            data.validate(),
            Err(StegError::DatasetConfiguration(_))
        ));

        let mut ragged = sample_split(Split::Train);
        ragged.features[1] = FeatureVector::from(vec![0.0; 10]);
        assert!(ragged.validate().is_err());
    }

    #[test]
    fn test_wrong_split_in_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        sample_split(Split::Val).save(dir.path()).unwrap();
        std::fs::rename(
            split_path(dir.path(), Split::Val),
            split_path(dir.path(), Split::Test),
        )
        .unwrap();

        assert!(SplitData::load(dir.path(), Split::Test).is_err());
    }
}
