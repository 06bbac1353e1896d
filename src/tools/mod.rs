//! 工具箱：能力接口、注册表、执行器、结果解释策略与内置研究工具（search_web / read_url / write_report）

pub mod executor;
pub mod interpret;
pub mod registry;
pub mod report_writer;
pub mod result;
pub mod schema;
pub mod search;
pub mod url_reader;

pub use executor::ToolExecutor;
pub use interpret::{ResultInterpreter, ToolKind};
pub use registry::{Tool, ToolRegistry, ToolSchema};
pub use report_writer::ReportWriterTool;
pub use result::{Severity, ToolError, ToolResult};
pub use search::WebSearchTool;
pub use url_reader::UrlReaderTool;
