//! 测试基础设施
//!
//! 提供在不依赖真实 Mem0 服务的情况下测试各组件的工具。
//!
//! | 类型 | 用途 |
//! |------|------|
//! | [`MockMemoryApi`] | 替代 [`HttpMemoryApi`](crate::api::HttpMemoryApi)，测试重试、批量上传与检索 |
//!
//! - **零网络请求**：完全在内存中运行
//! - **可脚本化**：`with_response()` / `with_error()` / `with_failures()` 控制返回值
//! - **可观测**：`call_count()` / `all_requests()` / `peak_concurrency()` 检查调用情况

mod mock_api;

pub use mock_api::MockMemoryApi;
