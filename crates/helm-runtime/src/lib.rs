pub mod handlers;
pub mod processor;
pub mod system;

pub use handlers::{DefaultSystemHandler, SystemHandler};
pub use processor::StreamingProcessor;
pub use system::{SteeringStatus, SteeringSystem};
