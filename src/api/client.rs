use crate::error::{ApiError, Result};
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

pub async fn post<B, R>(client: &Client, url: &str, headers: HeaderMap, body: &B) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = client
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(ApiError::from)?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ApiError::from_status(status, &error_text).into());
    }

    let parsed = response
        .json::<R>()
        .await
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

    debug!(url, status = status.as_u16(), "Mem0 响应成功");

    Ok(parsed)
}
