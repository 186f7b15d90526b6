mod audit;
mod badge;
mod engine;
mod service;
mod topics;
mod trigger;

pub use audit::*;
pub use badge::*;
pub use engine::*;
pub use service::*;
pub use topics::*;
pub use trigger::*;
