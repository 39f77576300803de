use anyhow::Result;
use async_trait::async_trait;

/// Persistent key/value needs of the reader: an expiring response cache and
/// plain settings.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_cache(&self, key: &str, now: i64) -> Result<Option<String>>;
    async fn put_cache(&self, key: &str, payload: &str, expires_at: i64) -> Result<()>;
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;
    async fn put_setting(&self, key: &str, value: &str) -> Result<()>;
}
