pub mod histogram;

pub use histogram::{
    extract_from_bytes, extract_from_image, extract_from_path, FeatureLayout, FeatureVector,
    Normalization,
};
