#![doc = "Object store integration: implements the core `ObjectStore` trait against the Google Cloud Storage JSON API."]
//
//! # Bucket client
//!
//! [`GcsStore`] talks to the GCS JSON API with a bearer token
//! (`GCS_ACCESS_TOKEN`). The endpoint can be overridden with `GCS_ENDPOINT`, which
//! is how the relay is pointed at a local storage emulator.
//!
//! - Listings are paginated through `nextPageToken`.
//! - Object names are percent-encoded as a single path segment (`/` becomes `%2F`).
//! - `exists` maps 404 to `false`; `delete` treats 404 as already deleted.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use bucket_relay_core::contract::{BoxError, ObjectDescriptor, ObjectStore};

pub struct GcsStore {
    client: Client,
    endpoint: String,
    bucket: String,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    items: Vec<ListedObject>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    /// GCS reports sizes as decimal strings.
    #[serde(default)]
    size: Option<String>,
}

impl ListedObject {
    fn into_descriptor(self) -> ObjectDescriptor {
        let size = self
            .size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        ObjectDescriptor::new(self.name, size)
    }
}

impl GcsStore {
    pub fn new(endpoint: &str, bucket: &str, token: &str) -> Self {
        tracing::info!(
            endpoint = endpoint,
            bucket = bucket,
            token_set = !token.is_empty(),
            "Initialized GcsStore"
        );
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token: token.to_string(),
        }
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o[/{segments}...]`
    fn objects_url(&self, segments: &[&str]) -> Result<Url, BoxError> {
        let mut url = Url::parse(&self.endpoint)?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| format!("GCS endpoint {} cannot be a base URL", self.endpoint))?;
            path.pop_if_empty()
                .extend(["storage", "v1", "b", self.bucket.as_str(), "o"])
                .extend(segments);
        }
        Ok(url)
    }

    fn copy_url(&self, key: &str, new_key: &str) -> Result<Url, BoxError> {
        self.objects_url(&[key, "copyTo", "b", self.bucket.as_str(), "o", new_key])
    }

    async fn list_page(
        &self,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, BoxError> {
        let url = self.objects_url(&[])?;
        let mut query: Vec<(&str, &str)> = vec![
            ("prefix", prefix),
            ("fields", "items(name,size),nextPageToken"),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await?;
        let page = ensure_success(resp, "list").await?.json::<ListPage>().await?;
        Ok(page)
    }
}

/// Turn a non-2xx response into an error carrying the status and body.
async fn ensure_success(resp: Response, operation: &str) -> Result<Response, BoxError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::error!(operation, status = %status, body = %body, "GCS request failed");
    Err(format!("GCS {operation} failed with {status}: {body}").into())
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectDescriptor>, BoxError> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(prefix, page_token.as_deref()).await?;
            objects.extend(page.items.into_iter().map(ListedObject::into_descriptor));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        tracing::info!(prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn download(&self, key: &str, destination: &Path) -> Result<(), BoxError> {
        let mut url = self.objects_url(&[key])?;
        url.query_pairs_mut().append_pair("alt", "media");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let resp = ensure_success(resp, "download").await?;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = resp.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        tracing::debug!(
            key,
            path = %destination.display(),
            bytes = written,
            "Downloaded object"
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BoxError> {
        let mut url = self.objects_url(&[key])?;
        url.query_pairs_mut().append_pair("fields", "name");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(resp, "exists").await?;
        Ok(true)
    }

    async fn copy(&self, key: &str, new_key: &str) -> Result<(), BoxError> {
        let url = self.copy_url(key, new_key)?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await?;
        ensure_success(resp, "copy").await?;
        tracing::info!(key, new_key, "Copied object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BoxError> {
        let url = self.objects_url(&[key])?;
        let resp = self
            .client
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            tracing::warn!(key, "Object already absent on delete");
            return Ok(());
        }
        ensure_success(resp, "delete").await?;
        tracing::info!(key, "Deleted object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_are_encoded_as_one_segment() {
        let store = GcsStore::new("https://storage.googleapis.com/", "media", "t");
        let url = store.objects_url(&["source/alpha/a b.jpg"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/media/o/source%2Falpha%2Fa%20b.jpg"
        );
    }

    #[test]
    fn copy_url_targets_the_same_bucket() {
        let store = GcsStore::new("http://localhost:4443", "media", "t");
        let url = store.copy_url("source/a.jpg", "sent/a.jpg").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4443/storage/v1/b/media/o/source%2Fa.jpg/copyTo/b/media/o/sent%2Fa.jpg"
        );
    }

    #[test]
    fn list_page_parses_string_sizes() {
        let page: ListPage = serde_json::from_str(
            r#"{"items":[{"name":"source/alpha/a.jpg","size":"2048"},{"name":"source/alpha/"}],"nextPageToken":"abc"}"#,
        )
        .unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
        let descriptors: Vec<_> = page
            .items
            .into_iter()
            .map(ListedObject::into_descriptor)
            .collect();
        assert_eq!(
            descriptors,
            vec![
                ObjectDescriptor::new("source/alpha/a.jpg", 2048),
                ObjectDescriptor::new("source/alpha/", 0),
            ]
        );
    }

    #[test]
    fn empty_listing_has_no_items() {
        let page: ListPage = serde_json::from_str("{}").unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
