pub mod builder;
pub mod split_store;

pub use builder::{BuildProgress, DatasetBuilder, SplitSummary};
pub use split_store::{split_path, SplitData};
