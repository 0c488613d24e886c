//! Blob store adapter.
//!
//! Reads go through the storage API endpoint, not the public CDN URL, so
//! they bypass the edge cache; writes carry per-object cache-control.
//! Public URLs are what gets handed to the messaging platform.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;

use crate::error::{BotError, Result};

const GCS_API: &str = "https://storage.googleapis.com";

/// Encode everything except unreserved characters, like the storage SDK.
const OBJECT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: Option<&str>,
    ) -> Result<()>;
    async fn get(&self, path: &str) -> Result<Vec<u8>>;
    async fn exists(&self, path: &str) -> Result<bool>;
    async fn delete(&self, path: &str) -> Result<()>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    /// Newest object under `prefix` by creation time, optionally filtered
    /// to names ending in `suffix`.
    async fn latest_by_creation(&self, prefix: &str, suffix: Option<&str>)
        -> Result<Option<String>>;
    fn public_url(&self, path: &str) -> String;

    async fn get_text(&self, path: &str) -> Result<String> {
        let bytes = self.get(path).await?;
        String::from_utf8(bytes).map_err(|e| BotError::Store(format!("not utf-8: {e}")))
    }
}

/// Percent-encode each path segment, keeping the slashes.
pub fn encode_object_path(path: &str) -> String {
    path.split('/')
        .map(|part| utf8_percent_encode(part, OBJECT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// GCS over the JSON API
// ---------------------------------------------------------------------------

pub struct GcsStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListItem {
    name: String,
    #[serde(rename = "timeCreated", default)]
    time_created: String,
}

impl GcsStore {
    pub fn new(bucket: &str, endpoint: Option<&str>, token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| BotError::Store(e.to_string()))?;
        Ok(GcsStore {
            client,
            endpoint: endpoint.unwrap_or(GCS_API).trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token: token.map(str::to_string),
        })
    }

    fn object_url(&self, path: &str) -> String {
        let enc = utf8_percent_encode(path, OBJECT_ENCODE_SET);
        format!("{}/storage/v1/b/{}/o/{}", self.endpoint, self.bucket, enc)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl BlobStore for GcsStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: Option<&str>,
    ) -> Result<()> {
        // Multipart upload: the metadata part carries cacheControl so it is
        // set atomically with the object.
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=multipart",
            self.endpoint, self.bucket
        );
        let mut metadata = serde_json::json!({
            "name": path,
            "contentType": content_type,
        });
        if let Some(cc) = cache_control {
            metadata["cacheControl"] = serde_json::Value::String(cc.to_string());
        }

        let boundary = "blob-part-boundary";
        let mut body: Vec<u8> = Vec::with_capacity(bytes.len() + 512);
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Type: {content_type}\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(&bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let resp = self
            .authed(self.client.post(&url))
            .header(
                "content-type",
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| BotError::Store(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BotError::Store(format!(
                "upload of {path} failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}?alt=media", self.object_url(path));
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| BotError::Store(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BotError::NotFound(path.to_string()));
        }
        if !resp.status().is_success() {
            return Err(BotError::Store(format!(
                "read of {path} failed: {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BotError::Store(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let resp = self
            .authed(self.client.get(self.object_url(path)))
            .send()
            .await
            .map_err(|e| BotError::Store(e.to_string()))?;
        Ok(resp.status().is_success())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let resp = self
            .authed(self.client.delete(self.object_url(path)))
            .send()
            .await
            .map_err(|e| BotError::Store(e.to_string()))?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(BotError::Store(format!(
                "delete of {path} failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self.list_items(prefix).await?.into_iter().map(|i| i.name).collect())
    }

    async fn latest_by_creation(
        &self,
        prefix: &str,
        suffix: Option<&str>,
    ) -> Result<Option<String>> {
        let items = self.list_items(prefix).await?;
        Ok(items
            .into_iter()
            .filter(|i| suffix.is_none_or(|s| i.name.ends_with(s)))
            .max_by(|a, b| a.time_created.cmp(&b.time_created))
            .map(|i| i.name))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{GCS_API}/{}/{}", self.bucket, encode_object_path(path))
    }
}

impl GcsStore {
    async fn list_items(&self, prefix: &str) -> Result<Vec<ListItem>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = format!("{}/storage/v1/b/{}/o", self.endpoint, self.bucket);
            let mut req = self.client.get(&url).query(&[("prefix", prefix)]);
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let resp = self
                .authed(req)
                .send()
                .await
                .map_err(|e| BotError::Store(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(BotError::Store(format!(
                    "list of {prefix} failed: {}",
                    resp.status()
                )));
            }
            let page: ListResponse = resp
                .json()
                .await
                .map_err(|e| BotError::Store(e.to_string()))?;
            items.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// In-memory store (tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, u64)>>,
    counter: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
        _cache_control: Option<&str>,
    ) -> Result<()> {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        let seq = *counter;
        let mut objects = self.objects.lock().unwrap();
        // Creation order survives overwrites, like object generations do.
        let seq = match objects.get(path) {
            Some(&(_, existing)) => existing,
            None => seq,
        };
        objects.insert(path.to_string(), (bytes, seq));
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| BotError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn latest_by_creation(
        &self,
        prefix: &str,
        suffix: Option<&str>,
    ) -> Result<Option<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| {
                k.starts_with(prefix) && suffix.is_none_or(|s| k.ends_with(s))
            })
            .max_by_key(|(_, (_, seq))| *seq)
            .map(|(k, _)| k.clone()))
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://blobs.test/{}", encode_object_path(path))
    }
}
