//! 可观测性：tracing 订阅器初始化
//!
//! EnvFilter 以 RUST_LOG 为准，未设置时使用配置中的 app.log_level。工具审计日志由 ToolExecutor 以 JSON 字段输出。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复初始化（例如测试中）时忽略错误
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
