//! 抽出済みの特徴量からランダムフォレストを学習し、評価結果を表示してモデルを保存する

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use stegguard_lib::ml::{train_model, MaxFeatures, TrainerConfig};
use stegguard_lib::model::AppConfig;

#[derive(Parser)]
#[command(name = "train_model")]
#[command(about = "Train the random forest on extracted histogram features", long_about = None)]
struct Args {
    /// 設定ファイル
    #[arg(long)]
    config: Option<PathBuf>,

    /// `{split}_data.bin` があるディレクトリ
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// モデルの保存先（.tar.gz）
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// 決定木の本数
    #[arg(long)]
    n_estimators: Option<usize>,

    /// 乱数シード
    #[arg(long)]
    random_state: Option<u64>,

    /// 分岐ごとに検討する特徴量数（整数で指定、省略時は設定値）
    #[arg(long)]
    max_features: Option<usize>,

    /// 木の最大深さ
    #[arg(long)]
    max_depth: Option<usize>,
}

fn main() -> Result<()> {
    stegguard_lib::init_tracing()?;

    let args = Args::parse();
    let app_config = AppConfig::load_or_default(args.config.as_deref());

    let mut config = TrainerConfig::from_app_config(&app_config);
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(path) = args.model_path {
        config.model_path = path;
    }
    if let Some(n) = args.n_estimators {
        config.params.n_estimators = n;
    }
    if let Some(seed) = args.random_state {
        config.params.random_state = seed;
    }
    if let Some(n) = args.max_features {
        config.params.max_features = MaxFeatures::Fixed(n);
    }
    if args.max_depth.is_some() {
        config.params.max_depth = args.max_depth;
    }

    let report = train_model(&config).context("モデルの学習に失敗しました")?;

    for evaluation in report.evaluations() {
        println!("{}\n", evaluation);
    }
    println!("Model saved to {}", report.model_path.display());

    Ok(())
}
