pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hasher;
pub mod librarian;
pub mod models;
pub mod platform;
pub mod progress;
pub mod scanner;

pub use config::AppConfig;
pub use engine::{PlanEngine, PlanReport};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
