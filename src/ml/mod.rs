pub mod tree;
pub mod forest;
pub mod metrics;
pub mod training;
pub mod inference;

pub use forest::{ForestParams, MaxFeatures, RandomForest};
pub use metrics::{ClassificationReport, ConfusionMatrix};
pub use training::{evaluate, train_model, Evaluation, TrainerConfig, TrainingReport};
pub use inference::{InferenceEngine, Prediction};
