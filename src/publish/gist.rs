// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! GitHub Gist REST client.
//!
//! Speaks just enough of the Gist API to read a target's files and to patch
//! them in one request. File content travels as plain text everywhere else in
//! the crate; the `{"content": ...}` object shape the API expects is produced
//! here and nowhere else.

use crate::{
    config::ApiSettings,
    plan::{RemoteFile, RemoteSnapshot},
    publish::{ApiError, GistApi, GistMetadata, GistUpdate},
};

use async_trait::async_trait;
use reqwest::{
    header::{ACCEPT, ETAG, IF_MATCH},
    Client, RequestBuilder, Response,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::{collections::BTreeMap, time::Duration};
use tracing::{debug, instrument};

const MEDIA_TYPE: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// Gist API client over HTTPS.
#[derive(Debug, Clone)]
pub struct GistClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GistClient {
    /// Construct new client authenticating with bearer token.
    ///
    /// # Errors
    ///
    /// - Return [`ApiError::Transport`] if HTTP client cannot be built.
    pub fn new(settings: &ApiSettings, token: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn endpoint(&self, target: &str) -> String {
        format!("{}/gists/{target}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(ACCEPT, MEDIA_TYPE)
            .header("X-GitHub-Api-Version", API_VERSION)
    }
}

#[async_trait]
impl GistApi for GistClient {
    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, target: &str) -> Result<RemoteSnapshot, ApiError> {
        let response = self
            .authorized(self.client.get(self.endpoint(target)))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await?;
        debug!("fetched {} byte(s) from {target}", body.len());

        decode_snapshot(&body, etag)
    }

    #[instrument(skip(self, update), level = "debug")]
    async fn update(&self, target: &str, update: &GistUpdate) -> Result<GistMetadata, ApiError> {
        let mut request = self
            .authorized(self.client.patch(self.endpoint(target)))
            .json(&encode_update(update));
        if let Some(etag) = &update.if_match {
            request = request.header(IF_MATCH, etag);
        }

        let response = ensure_success(request.send().await?).await?;
        let body = response.text().await?;

        Ok(serde_json::from_str(&body)?)
    }
}

async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, Deserialize)]
struct GistBody {
    #[serde(default)]
    files: BTreeMap<String, GistFileBody>,
}

#[derive(Debug, Deserialize)]
struct GistFileBody {
    #[serde(default)]
    content: Option<String>,

    #[serde(default)]
    truncated: bool,
}

/// Decode Gist response body into snapshot.
pub(crate) fn decode_snapshot(body: &str, etag: Option<String>) -> Result<RemoteSnapshot, ApiError> {
    let gist: GistBody = serde_json::from_str(body)?;
    let files = gist
        .files
        .into_iter()
        .map(|(name, file)| {
            let file = RemoteFile {
                content: file.content,
                truncated: file.truncated,
            };
            (name, file)
        })
        .collect();

    Ok(RemoteSnapshot { files, etag })
}

/// Encode update into Gist patch body.
pub(crate) fn encode_update(update: &GistUpdate) -> Value {
    let files = update
        .files
        .iter()
        .map(|(name, content)| (name.clone(), json!({ "content": content })))
        .collect::<Map<String, Value>>();

    json!({
        "description": update.description,
        "files": files,
    })
}
