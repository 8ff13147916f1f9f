pub mod engine;
pub mod tools;

pub use engine::{BuiltinToolEngine, SharedTool, Tool, ToolEngine, ToolError};
pub use tools::{CalculateTool, ReadFileTool, SearchTool, WriteFileTool};
