use serde::{Deserialize, Serialize};
use std::path::Path;

/// 1チャンネルあたりのヒストグラムのビン数
pub const HIST_BINS: usize = 256;

/// カラーチャンネル数
pub const NUM_CHANNELS: usize = 3;

/// 特徴ベクトルの長さ (256ビン x 3チャンネル)
pub const FEATURE_LEN: usize = HIST_BINS * NUM_CHANNELS;

/// 対応している画像拡張子（小文字）
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// デフォルトのクラス名（ラベル0, 1の順）
pub const DEFAULT_CLASS_NAMES: [&str; 2] = ["Clean", "Stego"];

/// 拡張子が png/jpg/jpeg か（大文字小文字は区別しない）
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// 二値ラベル
///
/// クラスディレクトリ名から決まる。`clean`（大文字小文字無視）だけが Clean で、
/// それ以外の名前はすべて Stego になる（`Clean2` も Stego）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Clean,
    Stego,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Clean, Label::Stego];

    /// クラスディレクトリ名からラベルを決定
    pub fn from_class_dir(name: &str) -> Self {
        if name.eq_ignore_ascii_case("clean") {
            Label::Clean
        } else {
            Label::Stego
        }
    }

    /// 分類器上のクラスインデックス
    pub fn index(self) -> usize {
        match self {
            Label::Clean => 0,
            Label::Stego => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Label::Clean),
            1 => Some(Label::Stego),
            _ => None,
        }
    }
}

/// データセット分割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }

    /// レポート表示用の名前
    pub fn display_name(self) -> &'static str {
        match self {
            Split::Train => "Training",
            Split::Val => "Validation",
            Split::Test => "Testing",
        }
    }

    /// 特徴量ファイル名（例: `train_data.bin`）
    pub fn data_file_name(self) -> String {
        format!("{}_data.bin", self.as_str())
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "val" | "valid" | "validation" => Ok(Split::Val),
            "test" => Ok(Split::Test),
            other => Err(format!("Unknown split: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from_class_dir() {
        assert_eq!(Label::from_class_dir("clean"), Label::Clean);
        assert_eq!(Label::from_class_dir("Clean"), Label::Clean);
        assert_eq!(Label::from_class_dir("CLEAN"), Label::Clean);
        assert_eq!(Label::from_class_dir("Clean2"), Label::Stego);
        assert_eq!(Label::from_class_dir("stego"), Label::Stego);
        assert_eq!(Label::from_class_dir("lsb"), Label::Stego);
    }

    #[test]
    fn test_label_index() {
        for label in Label::ALL {
            assert_eq!(Label::from_index(label.index()), Some(label));
        }
        assert_eq!(Label::from_index(2), None);
    }

    #[test]
    fn test_supported_image() {
        assert!(is_supported_image(Path::new("a.png")));
        assert!(is_supported_image(Path::new("a.JPG")));
        assert!(is_supported_image(Path::new("dir/a.Jpeg")));
        assert!(!is_supported_image(Path::new("a.gif")));
        assert!(!is_supported_image(Path::new("png")));
    }

    #[test]
    fn test_split_parse() {
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("VAL".parse::<Split>().unwrap(), Split::Val);
        assert!("holdout".parse::<Split>().is_err());
        assert_eq!(Split::Test.data_file_name(), "test_data.bin");
    }
}
