//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（クラス名、ハイパーパラメータなど）
//! - model.bin       - 学習済みフォレスト（bincode）
//!
//! 書き込みは同じディレクトリの一時ファイルに書いてから rename するため、
//! 途中で失敗しても既存のモデルは壊れません。

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use tempfile::NamedTempFile;

use crate::error::StegError;
use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// 保存先のパスを `.tar.gz` に揃える
///
/// すでに `.gz` で終わっている場合はそのまま。
pub fn artifact_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

/// 一時ファイルに書き込んでから `path` に置き換える
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> std::result::Result<(), StegError>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| StegError::io(&parent, e))?;

    let mut temp = NamedTempFile::new_in(&parent).map_err(|e| StegError::io(&parent, e))?;
    write(temp.as_file_mut()).map_err(|e| StegError::io(path, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StegError::io(path, e))?;
    temp.persist(path).map_err(|e| StegError::io(path, e.error))?;

    Ok(())
}

/// メタデータと共にモデルをTar.gz形式で保存し、保存先を返す
///
/// 既存のファイルは上書きされる。
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> std::result::Result<PathBuf, StegError> {
    let tar_gz_path = artifact_path(output_path);

    let json = metadata
        .to_json_string()
        .map_err(|e| StegError::io(&tar_gz_path, std::io::Error::other(e.to_string())))?;

    write_atomic(&tar_gz_path, |file| {
        let encoder = GzEncoder::new(file, Compression::default());
        let mut tar_builder = Builder::new(encoder);

        append_entry(&mut tar_builder, METADATA_ENTRY, json.as_bytes())?;
        append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

        tar_builder.into_inner()?.finish()?;
        Ok(())
    })?;

    Ok(tar_gz_path)
}

fn append_entry<W: std::io::Write>(
    builder: &mut Builder<W>,
    name: &str,
    bytes: &[u8],
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, bytes)
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let (metadata, _) = read_entries(tar_gz_path, false)?;
    metadata.ok_or_else(|| anyhow::anyhow!("metadata.json not found in tar.gz archive"))
}

/// Tar.gzからモデルバイナリを読み込む
pub fn load_model_binary(tar_gz_path: &Path) -> Result<Vec<u8>> {
    let (_, binary) = read_entries(tar_gz_path, true)?;
    binary.ok_or_else(|| anyhow::anyhow!("model.bin not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    match read_entries(tar_gz_path, true)? {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(anyhow::anyhow!("metadata.json not found in tar.gz archive")),
        (_, None) => Err(anyhow::anyhow!("model.bin not found in tar.gz archive")),
    }
}

fn read_entries(
    tar_gz_path: &Path,
    want_binary: bool,
) -> Result<(Option<ModelMetadata>, Option<Vec<u8>>)> {
    let tar_gz_file = File::open(tar_gz_path)
        .context(format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;

    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    let mut metadata = None;
    let mut binary = None;

    for entry in archive.entries().context("Failed to read tar.gz archive")? {
        let mut entry = entry.context("Failed to read tar.gz entry")?;
        let path = entry.path()?.to_path_buf();

        match path.to_str() {
            Some(METADATA_ENTRY) => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata = Some(ModelMetadata::from_json_string(&json_str)?);
                if !want_binary {
                    break;
                }
            }
            Some(MODEL_ENTRY) if want_binary => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                binary = Some(buffer);
            }
            _ => {}
        }
    }

    Ok((metadata, binary))
}

/// メタデータをコンソールに表示
pub fn print_metadata_info(metadata: &ModelMetadata) {
    let params = &metadata.hyperparameters;
    println!("\n=== モデルメタデータ ===");
    println!("モデル名: {}", metadata.model_name);
    println!("スキーマバージョン: {}", metadata.schema_version);
    println!("クラス名: {}", metadata.class_names.join(", "));
    println!("決定木の本数: {}", params.n_estimators);
    println!("乱数シード: {}", params.random_state);
    println!("分岐ごとの特徴量数: {}", params.max_features);
    match params.max_depth {
        Some(depth) => println!("最大深さ: {}", depth),
        None => println!("最大深さ: 制限なし"),
    }
    println!(
        "特徴量: {}ビン x {}チャンネル ({:?})",
        metadata.feature_layout.bins, metadata.feature_layout.channels, metadata.feature_layout.normalization
    );
    for score in &metadata.evaluation {
        println!(
            "  {} 正解率: {:.4} ({} 件)",
            score.split.display_name(),
            score.accuracy,
            score.samples
        );
    }
    println!("学習日時: {}", metadata.trained_at);
    println!("========================");
}
