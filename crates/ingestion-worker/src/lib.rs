pub mod config;
pub mod document;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use utils::error::WorkerError;
