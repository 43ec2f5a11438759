//! カラーヒストグラム特徴量の抽出
//!
//! 画像をRGBの3チャンネルに分け、チャンネルごとに256ビンのヒストグラムを作り、
//! チャンネル単位で min-max 正規化してから R, G, B の順に連結します。
//! 学習時と推論時で同じベクトルになる必要があるため、順序と正規化方法は変更不可です。

use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

use crate::error::{Result, StegError};
use crate::types::{FEATURE_LEN, HIST_BINS, NUM_CHANNELS};

/// ヒストグラムの正規化方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// チャンネルごとに (h - min) / (max - min)
    MinMax,
}

/// 特徴量のレイアウト（モデルメタデータに記録して推論時に照合する）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    pub bins: usize,
    pub channels: usize,
    pub normalization: Normalization,
}

impl FeatureLayout {
    /// このビルドが生成する特徴量のレイアウト
    pub const CURRENT: FeatureLayout = FeatureLayout {
        bins: HIST_BINS,
        channels: NUM_CHANNELS,
        normalization: Normalization::MinMax,
    };

    pub fn feature_len(&self) -> usize {
        self.bins * self.channels
    }
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// 768次元の特徴ベクトル（R 0..255, G 0..255, B 0..255）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// チャンネル `channel` の256ビン部分
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.0[channel * HIST_BINS..(channel + 1) * HIST_BINS]
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// 画像ファイルから特徴量を抽出
///
/// ファイルが存在しない・読めない・デコードできない場合は `InvalidImage`。
/// 拡張子ではなくファイルの中身からフォーマットを判定します。
pub fn extract_from_path(path: &Path) -> Result<FeatureVector> {
    let display = path.display().to_string();

    if !path.is_file() {
        return Err(StegError::invalid_image(display, "ファイルが存在しません"));
    }

    let img = ImageReader::open(path)
        .map_err(|e| StegError::invalid_image(display.clone(), e))?
        .with_guessed_format()
        .map_err(|e| StegError::invalid_image(display.clone(), e))?
        .decode()
        .map_err(|e| StegError::invalid_image(display, e))?;

    Ok(extract_from_image(&img))
}

/// メモリ上の画像バイト列から特徴量を抽出
pub fn extract_from_bytes(bytes: &[u8]) -> Result<FeatureVector> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| StegError::invalid_image("<memory>", e))?
        .decode()
        .map_err(|e| StegError::invalid_image("<memory>", e))?;

    Ok(extract_from_image(&img))
}

/// デコード済み画像から特徴量を抽出
///
/// グレースケールはRGBに複製され、アルファチャンネルは捨てられます。
pub fn extract_from_image(img: &DynamicImage) -> FeatureVector {
    let rgb = img.to_rgb8();

    let mut counts = [[0u64; HIST_BINS]; NUM_CHANNELS];
    for pixel in rgb.pixels() {
        for (channel, hist) in counts.iter_mut().enumerate() {
            hist[pixel[channel] as usize] += 1;
        }
    }

    let mut features = Vec::with_capacity(FEATURE_LEN);
    for hist in &counts {
        normalize_min_max(hist, &mut features);
    }

    FeatureVector(features)
}

/// 1チャンネル分のヒストグラムを [0, 1] に正規化して `out` に追加
///
/// max == min の場合は全ビン 0 になる。
fn normalize_min_max(hist: &[u64; HIST_BINS], out: &mut Vec<f32>) {
    let min = hist.iter().copied().min().unwrap_or(0);
    let max = hist.iter().copied().max().unwrap_or(0);

    if max == min {
        out.extend(std::iter::repeat(0.0f32).take(HIST_BINS));
        return;
    }

    let range = (max - min) as f64;
    out.extend(hist.iter().map(|&count| ((count - min) as f64 / range) as f32));
}
