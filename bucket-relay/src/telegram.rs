#![doc = "Delivery channel integration: implements the core `DeliveryChannel` trait with the Telegram Bot API."]
//
//! [`TelegramChannel`] uploads the staged file as multipart form data to
//! `sendPhoto`, `sendVideo` or `sendDocument`. A response with `ok: false` is an
//! error even when the HTTP status is 200; a `retry_after` hint is kept in the
//! error message so it shows up in retry logs.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;

use bucket_relay_core::contract::{BoxError, DeliveryChannel};

pub struct TelegramChannel {
    client: Client,
    api_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl ApiResponse {
    fn into_result(self, method: &str) -> Result<(), BoxError> {
        if self.ok {
            return Ok(());
        }
        let mut message = format!(
            "Telegram {method} rejected ({}): {}",
            self.error_code.map_or_else(|| "no code".to_string(), |c| c.to_string()),
            self.description.as_deref().unwrap_or("no description")
        );
        if let Some(retry_after) = self.parameters.and_then(|p| p.retry_after) {
            message.push_str(&format!(" (retry after {retry_after}s)"));
        }
        Err(message.into())
    }
}

impl TelegramChannel {
    pub fn new(api_url: &str, token: &str) -> Self {
        tracing::info!(
            api_url = api_url,
            token_set = !token.is_empty(),
            "Initialized TelegramChannel"
        );
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// The token is part of the path, so request errors are stripped of their URL
    /// before they leave this module.
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn send_file(
        &self,
        method: &str,
        field: &str,
        target: &str,
        path: &Path,
        caption: &str,
    ) -> Result<(), BoxError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| field.to_string());
        let size = bytes.len();
        let part = Part::bytes(bytes).file_name(file_name.clone());
        let mut form = Form::new()
            .text("chat_id", target.to_string())
            .text("caption", caption.to_string())
            .part(field.to_string(), part);
        if method == "sendVideo" {
            form = form.text("supports_streaming", "true");
        }

        tracing::info!(
            method,
            target,
            file = %file_name,
            bytes = size,
            "Uploading file to Telegram"
        );
        let resp = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| e.without_url())?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| e.without_url())?;
        let parsed: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(method, status = %status, error = ?e, "Unparseable Telegram response");
            format!("Telegram {method} returned {status} with unparseable body: {e}")
        })?;
        match parsed.into_result(method) {
            Ok(()) => {
                tracing::info!(method, target, file = %file_name, "Telegram accepted upload");
                Ok(())
            }
            Err(e) => {
                tracing::error!(method, target, status = %status, error = %e, "Telegram rejected upload");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send_photo(&self, target: &str, path: &Path, caption: &str) -> Result<(), BoxError> {
        self.send_file("sendPhoto", "photo", target, path, caption)
            .await
    }

    async fn send_video(&self, target: &str, path: &Path, caption: &str) -> Result<(), BoxError> {
        self.send_file("sendVideo", "video", target, path, caption)
            .await
    }

    async fn send_document(
        &self,
        target: &str,
        path: &Path,
        caption: &str,
    ) -> Result<(), BoxError> {
        self.send_file("sendDocument", "document", target, path, caption)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_embeds_token() {
        let channel = TelegramChannel::new("https://api.telegram.org/", "123:abc");
        assert_eq!(
            channel.method_url("sendPhoto"),
            "https://api.telegram.org/bot123:abc/sendPhoto"
        );
    }

    #[tokio::test]
    async fn transport_error_does_not_leak_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let channel = TelegramChannel::new("http://127.0.0.1:9", "123456:SECRET_TOKEN");
        let err = channel
            .send_photo("@chan", &path, "caption")
            .await
            .unwrap_err()
            .to_string();
        assert!(!err.contains("SECRET_TOKEN"), "token leaked: {err}");
    }

    #[test]
    fn ok_response_is_success() {
        let resp: ApiResponse = serde_json::from_str(r#"{"ok":true,"result":{}}"#).unwrap();
        assert!(resp.into_result("sendPhoto").is_ok());
    }

    #[test]
    fn rejected_response_carries_description_and_retry_hint() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":35}}"#,
        )
        .unwrap();
        let err = resp.into_result("sendVideo").unwrap_err().to_string();
        assert!(err.contains("429"));
        assert!(err.contains("Too Many Requests"));
        assert!(err.contains("retry after 35s"));
    }
}
