pub mod supabase;

use async_trait::async_trait;

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Stores `bytes` at `path` inside `bucket` and returns the stored path.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<String>;

    /// Time-limited URL for reading a private object.
    async fn signed_url(&self, bucket: &str, path: &str, expires_in: u64)
        -> anyhow::Result<String>;
}
