use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::BlobStorage;

/// Object storage behind the Supabase storage REST API.
pub struct SupabaseStorage {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl SupabaseStorage {
    pub fn new(base_url: String, service_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            client: reqwest::Client::new(),
        }
    }

    /// Each segment of `bucket` and `path` is percent-encoded on its own, so
    /// `#` or `?` in an object name stays part of the key.
    fn object_url(&self, action: &str, bucket: &str, path: &str) -> anyhow::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid storage url {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("storage url cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(["storage", "v1", "object"])
            .extend(Some(action).filter(|a| !a.is_empty()))
            .push(bucket)
            .extend(path.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl BlobStorage for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(self.object_url("", bucket, path)?)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .context("failed to call storage upload")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("storage upload error ({status}): {body}");
        }

        Ok(path.to_string())
    }

    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: u64,
    ) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(self.object_url("sign", bucket, path)?)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&json!({ "expiresIn": expires_in }))
            .send()
            .await
            .context("failed to call storage sign")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse storage sign response")?;

        if !status.is_success() {
            anyhow::bail!("storage sign error ({status}): {data}");
        }

        // The returned path is relative to the storage API root.
        let signed = data["signedURL"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing signedURL in storage response"))?;
        Ok(format!("{}/storage/v1{signed}", self.base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_urls() {
        let storage = SupabaseStorage::new("http://localhost:54321/".into(), "key".into());
        assert_eq!(
            storage
                .object_url("", "police-reports", "u1/reports/Ada/1-r.pdf")
                .unwrap()
                .as_str(),
            "http://localhost:54321/storage/v1/object/police-reports/u1/reports/Ada/1-r.pdf"
        );
        assert_eq!(
            storage.object_url("sign", "police-reports", "a.pdf").unwrap().as_str(),
            "http://localhost:54321/storage/v1/object/sign/police-reports/a.pdf"
        );
    }

    #[test]
    fn test_object_url_keeps_reserved_characters_in_key() {
        let storage = SupabaseStorage::new("http://localhost:54321".into(), "key".into());
        let url = storage
            .object_url("", "police-reports", "u1/reports/Jo#n/5-report?v2.pdf")
            .unwrap();
        assert_eq!(
            url.path(),
            "/storage/v1/object/police-reports/u1/reports/Jo%23n/5-report%3Fv2.pdf"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_object_url_rejects_bad_base() {
        let storage = SupabaseStorage::new("not a url".into(), "key".into());
        assert!(storage.object_url("", "bucket", "a.pdf").is_err());
    }
}
