//! 工具共享的出站 HTTP 客户端
//!
//! 同一适配器的所有调用共用一个 reqwest::Client；close 之后新的调用直接返回错误，
//! 已经发出的请求不受影响（各自持有 Client 的克隆）。

use std::sync::RwLock;
use std::time::Duration;

use reqwest::Client;

pub struct OutboundClient {
    inner: RwLock<Option<Client>>,
}

impl OutboundClient {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            inner: RwLock::new(Some(client)),
        }
    }

    /// 取得客户端；已关闭时返回带工具名的错误
    pub fn get(&self, tool: &str) -> Result<Client, String> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| format!("{tool} is closed"))
    }

    pub fn close(&self) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.take();
    }

    pub fn is_closed(&self) -> bool {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.is_none()
    }
}
