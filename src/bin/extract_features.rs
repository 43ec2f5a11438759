//! ラベル付き画像ディレクトリから分割ごとの特徴量ファイルを作成する
//!
//! ```text
//! extract_features --dataset-root archive --output-dir extracted_data
//! extract_features --split test
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use stegguard_lib::dataset::DatasetBuilder;
use stegguard_lib::model::AppConfig;
use stegguard_lib::Split;

#[derive(Parser)]
#[command(name = "extract_features")]
#[command(about = "Extract color-histogram features for each dataset split", long_about = None)]
struct Args {
    /// 設定ファイル
    #[arg(long)]
    config: Option<PathBuf>,

    /// `<root>/<split>/<split>/<クラス名>/` の `<root>`
    #[arg(long)]
    dataset_root: Option<PathBuf>,

    /// `{split}_data.bin` の出力先
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// 処理する分割（複数指定可、省略時は設定ファイルの値）
    #[arg(long = "split")]
    splits: Vec<Split>,
}

fn main() -> Result<()> {
    stegguard_lib::init_tracing()?;

    let args = Args::parse();
    let config = AppConfig::load_or_default(args.config.as_deref());

    let root = args.dataset_root.unwrap_or(config.paths.dataset_root);
    let output_dir = args.output_dir.unwrap_or(config.paths.extracted_data_dir);
    let splits = if args.splits.is_empty() {
        config.splits
    } else {
        args.splits
    };

    println!("=== 特徴量抽出 ===");
    println!("データセット: {}", root.display());
    println!("出力先: {}", output_dir.display());

    let builder = DatasetBuilder::new(&root, &output_dir);
    let summaries = builder
        .build_with_progress(&splits, |progress| {
            println!(
                "  [{}] {}: {}/{}",
                progress.split,
                progress.class_dir,
                progress.processed,
                progress.total
            );
        })
        .context("特徴量の抽出に失敗しました")?;

    println!("\n=== 結果 ===");
    for summary in &summaries {
        match &summary.saved_to {
            Some(path) => println!(
                "{}: {} 件 (Clean {}, Stego {}, スキップ {}) -> {}",
                summary.split.display_name(),
                summary.samples,
                summary.clean,
                summary.stego,
                summary.skipped,
                path.display()
            ),
            None => println!(
                "{}: データなし (スキップ {})",
                summary.split.display_name(),
                summary.skipped
            ),
        }
    }

    Ok(())
}
