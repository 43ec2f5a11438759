//! StegGuard 検出ツール
//!
//! # コマンド
//!
//! - `stegguard detect <画像>...` - 画像を解析して Clean / Stego を判定
//! - `stegguard inspect` - モデルのメタデータを表示
//! - `stegguard guide` - 使い方を表示
//! - `stegguard init-config` - デフォルト設定ファイルを書き出す

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stegguard_lib::model::{load_metadata, print_metadata_info, AppConfig, InferenceConfig};
use stegguard_lib::session::HELP_TEXT;
use stegguard_lib::DetectionSession;

#[derive(Parser)]
#[command(name = "stegguard")]
#[command(about = "Histogram-based steganography detection", long_about = None)]
#[command(version)]
struct Cli {
    /// 設定ファイル（省略時は stegguard.json があれば使用）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 画像を解析する
    Detect {
        /// 解析する画像（png, jpg, jpeg）
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// 学習済みモデル（tar.gz）
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// モデルのメタデータを表示する
    Inspect {
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// 使い方を表示する
    Guide,

    /// 現在の設定をファイルに書き出す
    InitConfig {
        /// 出力先（省略時は --config または stegguard.json）
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    stegguard_lib::init_tracing()?;

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref());

    match cli.command {
        Commands::Detect { images, model } => {
            let model_path = model.unwrap_or_else(|| config.paths.model_path.clone());
            let mut session = DetectionSession::open(&model_path)
                .context("モデルを読み込めないため検出を実行できません")?;

            let mut failures = 0;
            for image in &images {
                if let Err(e) = session.upload(image) {
                    eprintln!("✗ {}", e);
                    failures += 1;
                    continue;
                }
                match session.spawn_detect().await? {
                    Ok(prediction) => {
                        println!("{}", image.display());
                        println!("{}\n", prediction.summary());
                    }
                    Err(e) => {
                        eprintln!("✗ {}", e);
                        failures += 1;
                    }
                }
            }

            if failures > 0 {
                anyhow::bail!("{} / {} 枚の画像を解析できませんでした", failures, images.len());
            }
        }
        Commands::Inspect { model } => {
            let model_path = model.unwrap_or_else(|| config.paths.model_path.clone());
            let metadata = load_metadata(&model_path)
                .with_context(|| format!("メタデータを読み込めません: {}", model_path.display()))?;
            print_metadata_info(&metadata);
            InferenceConfig::from_metadata(&metadata).print_info();
            if let Err(reason) = metadata.check_compatible() {
                eprintln!("✗ このモデルは推論に使用できません: {}", reason);
            }
        }
        Commands::Guide => {
            println!("{}", HELP_TEXT);
        }
        Commands::InitConfig { output } => {
            let path = output
                .or(cli.config)
                .unwrap_or_else(AppConfig::default_path);
            config.save(&path)?;
            config.display();
            println!("設定ファイルを保存しました: {}", path.display());
        }
    }

    Ok(())
}
