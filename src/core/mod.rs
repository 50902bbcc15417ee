pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::ParserConfig;
pub use error::{PipelineError, Result};
pub use types::{Clock, ManualClock, SystemClock, Timestamp};
