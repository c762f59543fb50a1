mod client;
pub mod types;

use crate::api::client::post;
use crate::api::types::{ListRequest, MemoryListResponse, MemoryRecord, SearchRequest, UploadRequest};
use crate::config::Mem0Config;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::time::Duration;

pub fn assemble_req_header(api_key: &str) -> Result<HeaderMap> {
    let mut header_map = HeaderMap::new();

    header_map.insert(
        "Authorization",
        format!("Token {}", api_key)
            .parse()
            .map_err(|e| ClientError::Other(format!("Invalid Authorization header: {}", e)))?,
    );
    header_map.insert(
        "Content-Type",
        "application/json"
            .parse()
            .map_err(|e| ClientError::Other(format!("Invalid Content-Type header: {}", e)))?,
    );
    Ok(header_map)
}

/// 托管记忆服务的调用接口，上传 / 检索组件都只依赖此 trait
#[async_trait]
pub trait MemoryApi: Send + Sync {
    /// 写入一组消息，返回服务端的原始结果
    async fn add(&self, request: &UploadRequest) -> Result<Value>;

    /// 语义检索
    async fn search(&self, request: &SearchRequest) -> Result<Vec<MemoryRecord>>;

    /// 按过滤条件列出记忆
    async fn get_all(&self, request: &ListRequest) -> Result<Vec<MemoryRecord>>;
}

/// 基于 reqwest 的 Mem0 REST 实现
pub struct HttpMemoryApi {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

impl HttpMemoryApi {
    pub fn new(config: &Mem0Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Other(format!("构建 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            headers: assemble_req_header(&config.api_key)?,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl MemoryApi for HttpMemoryApi {
    async fn add(&self, request: &UploadRequest) -> Result<Value> {
        post(
            &self.client,
            &self.endpoint("/v1/memories/"),
            self.headers.clone(),
            request,
        )
        .await
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<MemoryRecord>> {
        let response: MemoryListResponse = post(
            &self.client,
            &self.endpoint("/v2/memories/search/"),
            self.headers.clone(),
            request,
        )
        .await?;
        Ok(response.into_records())
    }

    async fn get_all(&self, request: &ListRequest) -> Result<Vec<MemoryRecord>> {
        let response: MemoryListResponse = post(
            &self.client,
            &self.endpoint("/v2/memories/"),
            self.headers.clone(),
            request,
        )
        .await?;
        Ok(response.into_records())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_uses_token_scheme() {
        let headers = assemble_req_header("m0-abc").unwrap();
        assert_eq!(headers.get("Authorization").unwrap(), "Token m0-abc");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = Mem0Config {
            api_key: "k".to_string(),
            base_url: "https://api.mem0.ai/".to_string(),
            timeout_secs: 5,
        };
        let api = HttpMemoryApi::new(&config).unwrap();
        assert_eq!(api.endpoint("/v1/memories/"), "https://api.mem0.ai/v1/memories/");
    }
}
