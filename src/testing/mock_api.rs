//! Mock 记忆 API，用于在不发起真实 HTTP 请求的情况下测试上传 / 检索组件。
//!
//! # 示例
//!
//! ```rust
//! use mem0_client::testing::MockMemoryApi;
//! use mem0_client::api::MemoryApi;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mock = Arc::new(
//!     MockMemoryApi::new()
//!         .with_failures(2, "503 Service Unavailable")
//!         .with_response(serde_json::json!({"results": []}))
//! );
//! assert_eq!(mock.remaining(), 3);
//! assert_eq!(mock.call_count(), 0);
//! # }
//! ```

use crate::api::MemoryApi;
use crate::api::types::{ListRequest, MemoryRecord, SearchRequest, UploadRequest};
use crate::error::{ApiError, ClientError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 预设的 `add` 响应
enum MockAddResponse {
    Ok(Value),
    Err(ApiError),
}

type LatencyFn = dyn Fn(&UploadRequest) -> Duration + Send + Sync;

/// 可脚本化的 Mock 记忆 API。
///
/// `add` 按顺序返回预设响应；队列耗尽后返回默认成功响应
/// （可用 [`with_default_response`](MockMemoryApi::with_default_response) 修改）。
/// `search` / `get_all` 同样按队列返回，耗尽后返回空列表。
pub struct MockMemoryApi {
    add_responses: Mutex<VecDeque<MockAddResponse>>,
    default_response: Value,
    search_results: Mutex<VecDeque<Vec<MemoryRecord>>>,
    list_results: Mutex<VecDeque<Vec<MemoryRecord>>>,
    /// 每次 `add` 收到的请求，按完成顺序记录
    add_calls: Mutex<Vec<UploadRequest>>,
    search_calls: Mutex<Vec<SearchRequest>>,
    list_calls: Mutex<Vec<ListRequest>>,
    latency: Option<Box<LatencyFn>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl Default for MockMemoryApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMemoryApi {
    pub fn new() -> Self {
        Self {
            add_responses: Mutex::new(VecDeque::new()),
            default_response: json!({"results": [], "status": "ok"}),
            search_results: Mutex::new(VecDeque::new()),
            list_results: Mutex::new(VecDeque::new()),
            add_calls: Mutex::new(Vec::new()),
            search_calls: Mutex::new(Vec::new()),
            list_calls: Mutex::new(Vec::new()),
            latency: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 追加一条成功响应
    pub fn with_response(self, value: Value) -> Self {
        self.add_responses
            .lock()
            .unwrap()
            .push_back(MockAddResponse::Ok(value));
        self
    }

    /// 追加一条错误响应
    pub fn with_error(self, err: ApiError) -> Self {
        self.add_responses
            .lock()
            .unwrap()
            .push_back(MockAddResponse::Err(err));
        self
    }

    /// 追加 `times` 条相同消息的瞬时错误
    pub fn with_failures(self, times: usize, message: &str) -> Self {
        {
            let mut q = self.add_responses.lock().unwrap();
            for _ in 0..times {
                q.push_back(MockAddResponse::Err(ApiError::Transient(message.to_string())));
            }
        }
        self
    }

    /// 队列耗尽后的成功响应
    pub fn with_default_response(mut self, value: Value) -> Self {
        self.default_response = value;
        self
    }

    pub fn with_search_results(self, records: Vec<MemoryRecord>) -> Self {
        self.search_results.lock().unwrap().push_back(records);
        self
    }

    pub fn with_list_results(self, records: Vec<MemoryRecord>) -> Self {
        self.list_results.lock().unwrap().push_back(records);
        self
    }

    /// 为每次 `add` 模拟网络延迟
    pub fn with_latency(
        mut self,
        latency: impl Fn(&UploadRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.latency = Some(Box::new(latency));
        self
    }

    /// 已发生的 `add` 调用次数
    pub fn call_count(&self) -> usize {
        self.add_calls.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<UploadRequest> {
        self.add_calls.lock().unwrap().last().cloned()
    }

    pub fn all_requests(&self) -> Vec<UploadRequest> {
        self.add_calls.lock().unwrap().clone()
    }

    pub fn search_requests(&self) -> Vec<SearchRequest> {
        self.search_calls.lock().unwrap().clone()
    }

    pub fn list_requests(&self) -> Vec<ListRequest> {
        self.list_calls.lock().unwrap().clone()
    }

    /// 剩余未消费的 `add` 预设响应数量
    pub fn remaining(&self) -> usize {
        self.add_responses.lock().unwrap().len()
    }

    /// 同时进行中的 `add` 调用数峰值
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemoryApi for MockMemoryApi {
    async fn add(&self, request: &UploadRequest) -> Result<Value> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(request)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.add_calls.lock().unwrap().push(request.clone());

        let next = self.add_responses.lock().unwrap().pop_front();
        match next {
            Some(MockAddResponse::Ok(value)) => Ok(value),
            Some(MockAddResponse::Err(e)) => Err(ClientError::Api(e)),
            None => Ok(self.default_response.clone()),
        }
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<MemoryRecord>> {
        self.search_calls.lock().unwrap().push(request.clone());
        let next = self.search_results.lock().unwrap().pop_front();
        Ok(next.unwrap_or_default())
    }

    async fn get_all(&self, request: &ListRequest) -> Result<Vec<MemoryRecord>> {
        self.list_calls.lock().unwrap().push(request.clone());
        let next = self.list_results.lock().unwrap().pop_front();
        Ok(next.unwrap_or_default())
    }
}
