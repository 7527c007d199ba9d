use anyhow::{anyhow, bail, Context, Result};
use area::config::HttpConfig;
use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::config::{ACCEPT, API_VERSION, BASE_URL};

/// GitHub commit, as listed by `GET /repos/{repo}/commits`.
///
/// `commit` is kept as raw JSON; it becomes the fired event's payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub commit: Map<String, Value>,
}

impl GitHubCommit {
    pub fn author_name(&self) -> &str {
        self.commit
            .get("author")
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }

    pub fn message(&self) -> &str {
        self.commit.get("message").and_then(Value::as_str).unwrap_or("")
    }
}

/// Author of an issue or pull request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubUser {
    pub login: String,
}

/// GitHub issue. The issues endpoint also lists pull requests; those carry a
/// `pull_request` key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubIssue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub user: Option<GitHubUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<Value>,
}

impl GitHubIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// GitHub pull request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubPullRequest {
    pub id: u64,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub user: Option<GitHubUser>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BranchCommit {
    pub sha: String,
}

/// GitHub branch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubBranch {
    pub name: String,
    pub commit: BranchCommit,
    #[serde(default)]
    pub protected: bool,
}

/// Result of `POST /user/repos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoCreation {
    Created,
    AlreadyExists,
}

#[derive(Deserialize)]
struct ContentsEntry {
    sha: String,
}

#[derive(Serialize)]
struct PutFileBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

/// HTTP client for the GitHub REST API.
///
/// Shared by every trigger and reaction of the connector; the access token is
/// passed per call since each automation runs on behalf of a different user.
pub struct GitHubClient {
    http_client: Client,
    base_url: String,
}

impl GitHubClient {
    /// Create a client using the default GitHub API base URL.
    pub fn new(http: &HttpConfig) -> Result<Self> {
        Self::with_base_url(http, BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(http: &HttpConfig, base_url: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(http.user_agent.as_str())
            .timeout(http.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Underlying HTTP client, also used for the OAuth token exchange.
    pub fn http(&self) -> &Client {
        &self.http_client
    }

    fn request(&self, method: reqwest::Method, token: &str, path: &str) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header("Accept", ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Most recent commit of the default branch first.
    pub async fn list_commits(&self, token: &str, repo: &str) -> Result<Vec<GitHubCommit>> {
        let path = format!("/repos/{}/commits?per_page=1", repo_path(repo)?);
        let response = self
            .request(reqwest::Method::GET, token, &path)
            .send()
            .await
            .context("Failed to send list_commits request")?;

        check_response_status(&response)?;
        response
            .json::<Vec<GitHubCommit>>()
            .await
            .context("Failed to parse commits response")
    }

    /// Issues of any state, newest first, pull requests filtered out.
    pub async fn list_issues(&self, token: &str, repo: &str) -> Result<Vec<GitHubIssue>> {
        let path = format!(
            "/repos/{}/issues?state=all&sort=created&direction=desc&per_page=30",
            repo_path(repo)?
        );
        let response = self
            .request(reqwest::Method::GET, token, &path)
            .send()
            .await
            .context("Failed to send list_issues request")?;

        check_response_status(&response)?;
        let issues = response
            .json::<Vec<GitHubIssue>>()
            .await
            .context("Failed to parse issues response")?;
        Ok(issues.into_iter().filter(|i| !i.is_pull_request()).collect())
    }

    /// Pull requests of any state, newest first.
    pub async fn list_pulls(&self, token: &str, repo: &str) -> Result<Vec<GitHubPullRequest>> {
        let path = format!(
            "/repos/{}/pulls?state=all&sort=created&direction=desc&per_page=30",
            repo_path(repo)?
        );
        let response = self
            .request(reqwest::Method::GET, token, &path)
            .send()
            .await
            .context("Failed to send list_pulls request")?;

        check_response_status(&response)?;
        response
            .json::<Vec<GitHubPullRequest>>()
            .await
            .context("Failed to parse pull requests response")
    }

    pub async fn list_branches(&self, token: &str, repo: &str) -> Result<Vec<GitHubBranch>> {
        let path = format!("/repos/{}/branches?per_page=100", repo_path(repo)?);
        let response = self
            .request(reqwest::Method::GET, token, &path)
            .send()
            .await
            .context("Failed to send list_branches request")?;

        check_response_status(&response)?;
        response
            .json::<Vec<GitHubBranch>>()
            .await
            .context("Failed to parse branches response")
    }

    /// Creates a repository in the authenticated user's account.
    ///
    /// GitHub answers 422 when the name is taken; that is not an error here.
    pub async fn create_repository(&self, token: &str, name: &str) -> Result<RepoCreation> {
        let response = self
            .request(reqwest::Method::POST, token, "/user/repos")
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .context("Failed to send create_repository request")?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            return Ok(RepoCreation::AlreadyExists);
        }
        check_response_status(&response)?;
        Ok(RepoCreation::Created)
    }

    /// Opens an issue and returns its number.
    pub async fn create_issue(&self, token: &str, repo: &str, title: &str) -> Result<u64> {
        #[derive(Deserialize)]
        struct Created {
            number: u64,
        }

        let path = format!("/repos/{}/issues", repo_path(repo)?);
        let response = self
            .request(reqwest::Method::POST, token, &path)
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await
            .context("Failed to send create_issue request")?;

        check_response_status(&response)?;
        let created = response
            .json::<Created>()
            .await
            .context("Failed to parse created issue")?;
        Ok(created.number)
    }

    /// Blob sha of an existing file, `None` when the file does not exist.
    pub async fn file_sha(&self, token: &str, repo: &str, filename: &str) -> Result<Option<String>> {
        let path = format!("/repos/{}/contents/{}", repo_path(repo)?, file_path(filename)?);
        let response = self
            .request(reqwest::Method::GET, token, &path)
            .send()
            .await
            .context("Failed to send file_sha request")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_response_status(&response)?;
        let entry = response
            .json::<ContentsEntry>()
            .await
            .with_context(|| format!("'{}' is not a file", filename))?;
        Ok(Some(entry.sha))
    }

    /// Creates or replaces a file. `sha` must be the current blob sha when
    /// replacing.
    pub async fn put_file(
        &self,
        token: &str,
        repo: &str,
        filename: &str,
        message: &str,
        content: &str,
        sha: Option<&str>,
    ) -> Result<()> {
        let path = format!("/repos/{}/contents/{}", repo_path(repo)?, file_path(filename)?);
        let body = PutFileBody {
            message,
            content: base64::engine::general_purpose::STANDARD.encode(content),
            sha,
        };
        let response = self
            .request(reqwest::Method::PUT, token, &path)
            .json(&body)
            .send()
            .await
            .context("Failed to send put_file request")?;

        check_response_status(&response)
    }
}

/// Validates an `owner/name` repository reference and encodes its segments.
fn repo_path(repo: &str) -> Result<String> {
    let repo = repo.trim();
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => Ok(
            format!("{}/{}", urlencoding::encode(owner), urlencoding::encode(name)),
        ),
        _ => bail!("repository must be in the form 'owner/name', got '{}'", repo),
    }
}

fn file_path(filename: &str) -> Result<String> {
    let segments: Vec<&str> = filename.trim().trim_matches('/').split('/').collect();
    if segments.iter().any(|s| s.is_empty() || *s == "." || *s == "..") {
        bail!("invalid file path '{}'", filename);
    }
    Ok(segments
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Check the response status and map known error codes to descriptive errors.
///
/// - 401 → auth error (token expired or invalid)
/// - 403 → rate limit (reports X-RateLimit-Remaining)
/// - Other non-2xx → generic API error
fn check_response_status(response: &reqwest::Response) -> Result<()> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(anyhow!("GitHub auth error: token expired or invalid")),
        StatusCode::FORBIDDEN => {
            let remaining = response
                .headers()
                .get("X-RateLimit-Remaining")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            Err(anyhow!(
                "GitHub rate limit exceeded (X-RateLimit-Remaining: {})",
                remaining
            ))
        }
        s if !s.is_success() => Err(anyhow!("GitHub API error: {}", s)),
        _ => Ok(()),
    }
}
