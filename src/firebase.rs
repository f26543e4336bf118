//! Firebase Realtime Database client
//!
//! Talks to the database REST surface (`<url>/<path>.json`), authenticated with
//! the legacy database secret passed as the `auth` query parameter.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::config::FirebaseConfig;
use crate::error::{AppError, AppResult};
use crate::store::RemoteMirror;

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct FirebaseClient {
    client: Client,
    database_url: String,
    secret: Option<String>,
    /// Node under which all site content lives
    root: String,
}

impl FirebaseClient {
    pub fn new(config: &FirebaseConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            database_url: config.database_url.trim_end_matches('/').to_string(),
            secret: config.secret.clone(),
            root: "portfolio".to_string(),
        })
    }

    /// Full REST URL of `path`
    pub fn url_for(&self, path: &str) -> String {
        let segments: Vec<String> = self
            .root
            .split('/')
            .chain(path.split('/'))
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();

        let mut url = format!("{}/{}.json", self.database_url, segments.join("/"));
        if let Some(secret) = &self.secret {
            url.push_str("?auth=");
            url.push_str(&urlencoding::encode(secret));
        }
        url
    }

    pub async fn get(&self, path: &str) -> AppResult<Option<Value>> {
        debug!("Firebase GET {}", path);
        let response = self.client.get(self.url_for(path)).send().await?;
        let response = check_status(response).await?;
        let value: Value = response.json().await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    pub async fn put(&self, path: &str, value: &Value) -> AppResult<()> {
        debug!("Firebase PUT {}", path);
        let response = self.client.put(self.url_for(path)).json(value).send().await?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> AppResult<()> {
        debug!("Firebase DELETE {}", path);
        let response = self.client.delete(self.url_for(path)).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AppError::Upstream(format!("Firebase rejected credentials ({status})"))
        }
        _ => AppError::Upstream(format!("Firebase returned {status}: {body}")),
    })
}

#[async_trait]
impl RemoteMirror for FirebaseClient {
    async fn fetch(&self, name: &str) -> AppResult<Option<Value>> {
        self.get(name).await
    }

    async fn publish(&self, name: &str, value: &Value) -> AppResult<()> {
        // An empty object would be stored as null; delete explicitly instead
        if value.as_object().is_some_and(|o| o.is_empty()) {
            return self.delete(name).await;
        }
        self.put(name, value).await
    }
}
