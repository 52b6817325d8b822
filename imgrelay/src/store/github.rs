//! GitHub contents API implementation of [`ContentStore`].

use super::{ContentStore, FileMetadata, Result, StoreError};
use crate::config::{GithubConfig, GithubCredentials};
use async_trait::async_trait;
use axum::http::StatusCode;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, RequestBuilder, Response, header};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

#[derive(Debug, Serialize)]
struct PutFileBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteFileBody<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

/// Stores files as commits on a branch of a GitHub repository.
pub struct GithubContentStore {
    client: Client,
    api_url: Url,
    raw_url: Url,
    token: String,
    owner: String,
    repo: String,
    branch: String,
}

impl GithubContentStore {
    pub fn new(credentials: GithubCredentials, config: &GithubConfig) -> Result<Self> {
        crate::install_crypto_provider();

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            raw_url: config.raw_url.clone(),
            token: credentials.token,
            owner: credentials.owner,
            repo: credentials.repo,
            branch: config.branch.clone(),
        })
    }

    /// `<api_url>/repos/<owner>/<repo>/contents/<path>`, with each path segment escaped.
    fn contents_url(&self, path: &str) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"])
            .extend(path.split('/'));
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(header::ACCEPT, GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }
}

/// Read a response body as JSON. Bodies that are not JSON are kept as a JSON string so that
/// they can still be relayed.
async fn read_body(response: Response) -> Result<(StatusCode, Value)> {
    let status = response.status();
    let text = response.text().await?;
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    Ok((status, body))
}

async fn expect_success(response: Response) -> Result<Value> {
    let (status, body) = read_body(response).await?;
    if !status.is_success() {
        return Err(StoreError::Upstream { status, body });
    }
    Ok(body)
}

#[async_trait]
impl ContentStore for GithubContentStore {
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    async fn put_file(&self, path: &str, content: &[u8], message: &str) -> Result<()> {
        let url = self.contents_url(path)?;
        let body = PutFileBody {
            message,
            content: STANDARD.encode(content),
            branch: &self.branch,
        };

        let response = self.authorized(self.client.put(url)).json(&body).send().await?;
        let body = expect_success(response).await?;

        // The commit exists at this point; the body is only used for diagnostics.
        if let Some(commit) = body.pointer("/commit/sha").and_then(Value::as_str) {
            debug!(commit, "created commit");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_file(&self, path: &str) -> Result<FileMetadata> {
        let mut url = self.contents_url(path)?;
        url.query_pairs_mut().append_pair("ref", &self.branch);
        let response = self.authorized(self.client.get(url)).send().await?;

        match expect_success(response).await? {
            Value::Object(info) => {
                let sha = info
                    .get("sha")
                    .and_then(Value::as_str)
                    .ok_or_else(|| StoreError::Decode("missing `sha` in content metadata".to_string()))?;
                Ok(FileMetadata {
                    path: path.to_string(),
                    sha: sha.to_string(),
                })
            }
            // Directory listings come back as arrays
            Value::Array(_) => Err(StoreError::NotAFile { path: path.to_string() }),
            other => Err(StoreError::Decode(format!("unexpected content metadata: {other}"))),
        }
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, path: &str, sha: &str, message: &str) -> Result<()> {
        let url = self.contents_url(path)?;
        let body = DeleteFileBody {
            message,
            sha,
            branch: &self.branch,
        };

        let response = self.authorized(self.client.delete(url)).json(&body).send().await?;
        expect_success(response).await?;
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_url.as_str().trim_end_matches('/'),
            self.owner,
            self.repo,
            self.branch,
            path
        )
    }
}
