pub mod config;
pub mod retry;
pub mod runner;
pub mod specialization;

pub use config::LoopConfig;
pub use retry::{RetryPhase, RetryPolicy};
pub use runner::AgentLoop;
pub use specialization::{GeneralSpecialization, Specialization};
