mod classifier;
mod metrics;
mod openrouter;
mod prompt;
mod rate_limiter;
mod retry;

pub use classifier::*;
pub use metrics::*;
pub use openrouter::*;
pub use prompt::*;
pub use rate_limiter::*;
pub use retry::*;
