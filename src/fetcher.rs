//! # 拉取模块
//!
//! ## 设计思路
//!
//! 协调器只看到 `Fetcher` 契约：`url → (状态码, 字节)`，外加 `cancel_all()`。
//! 非 2xx 不在拉取层报错，而是原样返回状态码，由协调器统一判定为拉取失败。
//!
//! ## 实现思路
//!
//! 默认实现 `HttpFetcher` 基于 reqwest：
//! - 仅允许 http / https
//! - 首包与分块读取分别套超时，流式累积并限制总大小
//! - 408 / 429 / 5xx 与瞬时网络错误按指数退避 + 抖动重试，尊重 `Retry-After`
//! - `cancel_all()` 递增代数，进行中的拉取在下一个检查点返回 `Cancelled`

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::PicFlyConfig;
use crate::error::ImageError;

const NETWORK_RETRY_BASE_DELAY_MS: u64 = 180;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

/// 单次拉取的超时参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 15_000,
            read_timeout_ms: 20_000,
        }
    }
}

impl FetchOptions {
    pub fn from_config(config: &PicFlyConfig) -> Self {
        Self {
            connect_timeout_ms: config.connect_timeout_ms,
            read_timeout_ms: config.read_timeout_ms,
        }
    }
}

/// 拉取结果：状态码 + 完整响应体。
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 可注入的网络拉取契约。
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, ImageError>;

    /// 取消所有进行中的拉取。
    fn cancel_all(&self);
}

/// 基于 reqwest 的默认拉取实现。
pub struct HttpFetcher {
    clients: Mutex<HashMap<u64, reqwest::Client>>,
    max_file_size: u64,
    max_redirects: usize,
    retry_attempts: u8,
    generation: AtomicU64,
}

impl HttpFetcher {
    pub fn new(config: &PicFlyConfig) -> Result<Self, ImageError> {
        let fetcher = Self {
            clients: Mutex::new(HashMap::new()),
            max_file_size: config.max_file_size,
            max_redirects: config.max_redirects,
            retry_attempts: config.network_retry_attempts.max(1),
            generation: AtomicU64::new(0),
        };
        // 提前构建默认超时的客户端，配置错误尽早暴露
        fetcher.client_for(config.connect_timeout_ms)?;
        Ok(fetcher)
    }

    fn client_for(&self, connect_timeout_ms: u64) -> Result<reqwest::Client, ImageError> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| ImageError::ResourceLimit("HTTP 客户端表锁已中毒".to_string()))?;

        if let Some(client) = clients.get(&connect_timeout_ms) {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(connect_timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects))
            .build()
            .map_err(|e| ImageError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;
        clients.insert(connect_timeout_ms, client.clone());
        Ok(client)
    }

    async fn send_with_retry(
        &self,
        client: &reqwest::Client,
        url: &reqwest::Url,
        options: &FetchOptions,
        generation: u64,
    ) -> Result<reqwest::Response, ImageError> {
        let header_timeout = Duration::from_millis(options.read_timeout_ms);
        let mut attempt: u8 = 1;

        loop {
            self.ensure_not_cancelled(generation)?;

            let send = client
                .get(url.clone())
                .header(
                    reqwest::header::ACCEPT,
                    "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
                )
                .send();

            let outcome = match tokio::time::timeout(header_timeout, send).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(err)) => Err(err),
                Err(_) => {
                    if attempt >= self.retry_attempts {
                        return Err(ImageError::Timeout(format!(
                            "等待响应头超时（{}ms）",
                            options.read_timeout_ms
                        )));
                    }
                    let delay_ms = compute_retry_delay_with_jitter(attempt, None);
                    log::warn!(
                        "⚠️ 等待响应超时（第 {}/{} 次，可重试）；{}ms 后重试",
                        attempt,
                        self.retry_attempts,
                        delay_ms
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt = attempt.saturating_add(1);
                    continue;
                }
            };

            match outcome {
                Ok(response) => {
                    if attempt < self.retry_attempts && is_retryable_http_status(response.status()) {
                        let delay_ms = compute_retry_delay_with_jitter(
                            attempt,
                            retry_after_hint_ms(response.headers()),
                        );
                        log::warn!(
                            "⚠️ HTTP {}（第 {}/{} 次，可重试）；{}ms 后重试",
                            response.status().as_u16(),
                            attempt,
                            self.retry_attempts,
                            delay_ms
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if attempt >= self.retry_attempts || !is_retryable_network_error(&err) {
                        return Err(map_reqwest_error(err, url.as_str(), options));
                    }
                    let delay_ms = compute_retry_delay_with_jitter(attempt, None);
                    log::warn!(
                        "⚠️ 网络请求失败（第 {}/{} 次，可重试）：{}；{}ms 后重试",
                        attempt,
                        self.retry_attempts,
                        sanitize_error_message(&err.to_string(), url.as_str()),
                        delay_ms
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn read_body(
        &self,
        mut response: reqwest::Response,
        options: &FetchOptions,
        generation: u64,
    ) -> Result<Bytes, ImageError> {
        let declared_len = response.content_length();
        if let Some(len) = declared_len {
            if len > self.max_file_size {
                return Err(ImageError::ResourceLimit(format!(
                    "文件过大：{:.2} MB（限制：{:.2} MB）",
                    len as f64 / 1024.0 / 1024.0,
                    self.max_file_size as f64 / 1024.0 / 1024.0
                )));
            }
        }

        let initial_capacity = declared_len
            .map(|len| len.min(self.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let read_timeout = Duration::from_millis(options.read_timeout_ms);
        let mut received_first_chunk = false;

        loop {
            let next = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        ImageError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        ImageError::Timeout("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next.map_err(|e| ImageError::Network(format!("下载失败：{}", e)))?
            else {
                break;
            };
            received_first_chunk = true;

            self.ensure_not_cancelled(generation)?;

            if (buffer.len() as u64).saturating_add(chunk.len() as u64) > self.max_file_size {
                return Err(ImageError::ResourceLimit("下载内容超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(Bytes::from(buffer))
    }

    fn ensure_not_cancelled(&self, generation: u64) -> Result<(), ImageError> {
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(ImageError::Cancelled("图片下载已取消".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, ImageError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let started = Instant::now();

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ImageError::InvalidArgument(format!("URL 格式错误：{}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ImageError::InvalidArgument(format!(
                "仅支持 HTTP/HTTPS：{}",
                parsed.scheme()
            )));
        }

        log::debug!("🌐 开始拉取：{}", redact_url_for_log(url));

        let client = self.client_for(options.connect_timeout_ms)?;
        let response = self.send_with_retry(&client, &parsed, options, generation).await?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            log::warn!(
                "⚠️ 拉取返回非成功状态：HTTP {} - {}",
                status,
                redact_url_for_log(url)
            );
            return Ok(FetchResponse {
                status,
                body: Bytes::new(),
            });
        }

        let body = self.read_body(response, options, generation).await?;

        log::debug!(
            "✅ 拉取完成：{} bytes，{}ms - {}",
            body.len(),
            started.elapsed().as_millis(),
            redact_url_for_log(url)
        );

        Ok(FetchResponse { status, body })
    }

    fn cancel_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        log::info!("🛑 已取消所有进行中的拉取");
    }
}

fn retry_after_hint_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?;
    let secs = value.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(secs.saturating_mul(1000))
}

fn compute_retry_delay_with_jitter(attempt: u8, server_hint_ms: Option<u64>) -> u64 {
    let exp = NETWORK_RETRY_BASE_DELAY_MS.saturating_mul(1_u64 << (attempt.saturating_sub(1) as u32).min(16));
    let base = server_hint_ms.unwrap_or(exp);
    let jitter_bound = (base / 2).max(1);
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    base.saturating_add(seed % (jitter_bound + 1))
}

fn is_retryable_http_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn is_retryable_network_error(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }

    let msg = error.to_string().to_lowercase();
    msg.contains("connection reset")
        || msg.contains("connection closed before message completed")
        || msg.contains("peer closed connection")
}

fn map_reqwest_error(error: reqwest::Error, url: &str, options: &FetchOptions) -> ImageError {
    let msg = sanitize_error_message(&error.to_string(), url);
    if error.is_timeout() {
        ImageError::Timeout(format!("连接超时（{}ms）", options.connect_timeout_ms))
    } else if error.is_connect() {
        ImageError::Network(format!("无法连接：{}", msg))
    } else {
        ImageError::Network(format!("请求失败：{}", msg))
    }
}

fn sanitize_error_message(error_msg: &str, url: &str) -> String {
    error_msg.replace(url, &redact_url_for_log(url))
}

/// 日志用 URL：去掉 query 与 fragment。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}
