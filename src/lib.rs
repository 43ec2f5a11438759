//! StegGuard: カラーヒストグラムとランダムフォレストによる画像ステガノグラフィ検出
//!
//! - [`features`]: 画像から768次元のヒストグラム特徴量を抽出
//! - [`dataset`]: `<root>/<split>/<split>/<クラス名>/` の画像から分割ごとの特徴量ファイルを作成
//! - [`ml`]: ランダムフォレストの学習・評価・推論
//! - [`model`]: モデルファイル（tar.gz）と設定ファイルの読み書き
//! - [`session`]: 画像の選択と検出を行うセッション

pub mod error;
pub mod types;
pub mod features;
pub mod dataset;
pub mod ml;
pub mod model;
pub mod session;

pub use error::{Result, StegError};
pub use ml::{InferenceEngine, Prediction};
pub use session::DetectionSession;
pub use types::{Label, Split};

/// バイナリ共通のログ初期化
///
/// `RUST_LOG` が指定されていない場合は `stegguard=info` を使う。
/// （ライブラリのターゲット `stegguard_lib` も前方一致で含まれる）
pub fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("stegguard=info"))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init()?;
    Ok(())
}
