pub mod builtin;
pub mod profiles;
pub mod registry;
pub mod schema;
pub mod traits;

use std::sync::Arc;

pub use builtin::{EchoTool, ShellTool, SumTool};
pub use profiles::{ToolGroup, ToolProfile};
pub use registry::ToolRegistry;
pub use traits::{Tool, ToolInfo, ToolResult};

use crate::memory::SummarizeTool;
use crate::security::SecurityPolicy;

/// Register the built-in demonstration tools, the summariser tool, and the
/// `shell` tool gated by `policy`.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    summarize_tool: Arc<SummarizeTool>,
    policy: Arc<SecurityPolicy>,
) {
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(SumTool));
    registry.register(summarize_tool);
    registry.register(Arc::new(ShellTool::new(policy)));
}
