//! Configuration loading and validation.

mod settings;

pub use settings::{
    BudgeterSettings, CandidateSettings, Config, PromotionSettings, StorageSettings,
};
