pub mod block;
pub mod config;
pub mod country_pool;
pub mod driver_pool;
pub mod extractor;
pub mod geo;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod session;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use orchestrator::CrawlOrchestrator;
pub use utils::error::{AppError, SessionError};

pub type Result<T> = std::result::Result<T, AppError>;
