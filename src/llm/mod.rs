pub mod analyzer;
pub mod client;
pub mod model;

pub use analyzer::{scores_or_reload, Analyzer};
pub use client::OpenRouterClient;
pub use model::LlmConfig;
