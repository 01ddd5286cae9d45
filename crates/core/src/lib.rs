pub mod config;
pub mod error;
pub mod types;

pub use config::SdkConfig;
pub use error::{SdkError, SdkResult};
