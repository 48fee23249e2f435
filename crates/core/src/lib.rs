pub mod config;
pub mod error;
pub mod options;
pub mod result;

pub use config::{load_dotenv, HealthThresholds, QueueConfig};
pub use error::*;
pub use options::*;
pub use result::ProcessingResult;
