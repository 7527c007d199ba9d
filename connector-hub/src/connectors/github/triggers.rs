//! GitHub triggers.
//!
//! Every trigger watches one repository (`repository_name`, `owner/name`) and
//! keeps just enough state in its checkpoint to tell "new" from "seen":
//!
//! | id | trigger          | checkpoint                         |
//! |----|------------------|------------------------------------|
//! | 1  | New commit       | `{"lastCommitSha": "..."}`         |
//! | 2  | New issue        | `{"lastIssueId": 123}`             |
//! | 3  | New pull request | `{"lastPullRequestId": 123}`       |
//! | 4  | New branch       | `{"knownBranches": ["main", ...]}` |

use anyhow::{bail, Context, Result};
use area::{CheckContext, CheckOutcome, FieldSpec, FiredEvent, Trigger};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::api::GitHubClient;

#[derive(Deserialize)]
struct RepoParams {
    #[serde(default)]
    repository_name: String,
}

/// The watched repository, rejected when empty.
fn repository(ctx: &CheckContext<'_>) -> Result<String> {
    let params: RepoParams = ctx.params_as()?;
    let repo = params.repository_name.trim();
    if repo.is_empty() {
        bail!("repository_name is required");
    }
    Ok(repo.to_string())
}

fn repository_field() -> Vec<FieldSpec> {
    vec![FieldSpec::text("repository_name", "Repository", "The repository to watch")]
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CommitCheckpoint {
    #[serde(rename = "lastCommitSha")]
    last_commit_sha: Option<String>,
}

/// Fires on the newest commit of the default branch when its sha differs
/// from the last one seen.
pub struct NewCommit {
    client: Arc<GitHubClient>,
    fields: Vec<FieldSpec>,
}

impl NewCommit {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self {
            client,
            fields: repository_field(),
        }
    }
}

#[async_trait]
impl Trigger for NewCommit {
    fn id(&self) -> u32 {
        1
    }

    fn name(&self) -> &str {
        "New commit"
    }

    fn description(&self) -> &str {
        "Triggers when a new commit is pushed to a repository"
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let repo = repository(ctx)?;
        let seen: CommitCheckpoint = ctx.checkpoint_as()?;

        let commits = self.client.list_commits(&ctx.token.access_token, &repo).await?;
        let Some(latest) = commits.into_iter().next() else {
            return Ok(CheckOutcome::idle());
        };
        if seen.last_commit_sha.as_deref() == Some(latest.sha.as_str()) {
            return Ok(CheckOutcome::idle());
        }

        let text = format!(
            "New commit from {} in the repository {}: `{}`",
            latest.author_name(),
            repo,
            latest.message()
        );
        let mut data = latest.commit;
        data.insert("sha".to_string(), Value::String(latest.sha.clone()));

        CheckOutcome::fire(
            CommitCheckpoint {
                last_commit_sha: Some(latest.sha),
            },
            FiredEvent::new(text, Value::Object(data)),
        )
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct IssueCheckpoint {
    #[serde(rename = "lastIssueId")]
    last_issue_id: Option<u64>,
}

/// Fires on the most recently created issue when its id is above the last
/// one seen. Ids only grow, so a deleted issue never re-fires an older one.
pub struct NewIssue {
    client: Arc<GitHubClient>,
    fields: Vec<FieldSpec>,
}

impl NewIssue {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self {
            client,
            fields: repository_field(),
        }
    }
}

#[async_trait]
impl Trigger for NewIssue {
    fn id(&self) -> u32 {
        2
    }

    fn name(&self) -> &str {
        "New issue"
    }

    fn description(&self) -> &str {
        "Triggers when a new issue is created"
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let repo = repository(ctx)?;
        let seen: IssueCheckpoint = ctx.checkpoint_as()?;

        let issues = self.client.list_issues(&ctx.token.access_token, &repo).await?;
        let Some(latest) = issues.into_iter().next() else {
            return Ok(CheckOutcome::idle());
        };
        if seen.last_issue_id.is_some_and(|last| latest.id <= last) {
            return Ok(CheckOutcome::idle());
        }

        let author = latest.user.as_ref().map(|u| u.login.as_str()).unwrap_or("unknown");
        let text = format!(
            "New issue #{} from {} in the repository {}: `{}`",
            latest.number, author, repo, latest.title
        );
        let data = serde_json::to_value(&latest).context("Failed to encode issue")?;

        CheckOutcome::fire(
            IssueCheckpoint {
                last_issue_id: Some(latest.id),
            },
            FiredEvent::new(text, data),
        )
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PullRequestCheckpoint {
    #[serde(rename = "lastPullRequestId")]
    last_pull_request_id: Option<u64>,
}

/// Fires on the most recently opened pull request when its id is above the
/// last one seen.
pub struct NewPullRequest {
    client: Arc<GitHubClient>,
    fields: Vec<FieldSpec>,
}

impl NewPullRequest {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self {
            client,
            fields: repository_field(),
        }
    }
}

#[async_trait]
impl Trigger for NewPullRequest {
    fn id(&self) -> u32 {
        3
    }

    fn name(&self) -> &str {
        "New pull request"
    }

    fn description(&self) -> &str {
        "Triggers when a new pull request is created"
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let repo = repository(ctx)?;
        let seen: PullRequestCheckpoint = ctx.checkpoint_as()?;

        let pulls = self.client.list_pulls(&ctx.token.access_token, &repo).await?;
        let Some(latest) = pulls.into_iter().next() else {
            return Ok(CheckOutcome::idle());
        };
        if seen.last_pull_request_id.is_some_and(|last| latest.id <= last) {
            return Ok(CheckOutcome::idle());
        }

        let author = latest.user.as_ref().map(|u| u.login.as_str()).unwrap_or("unknown");
        let text = format!(
            "New pull request #{} from {} in the repository {}: `{}`",
            latest.number, author, repo, latest.title
        );
        let data = serde_json::to_value(&latest).context("Failed to encode pull request")?;

        CheckOutcome::fire(
            PullRequestCheckpoint {
                last_pull_request_id: Some(latest.id),
            },
            FiredEvent::new(text, data),
        )
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct BranchCheckpoint {
    #[serde(rename = "knownBranches")]
    known_branches: Vec<String>,
}

/// Fires once per check for the first branch not yet known.
///
/// Every unknown branch is recorded at once, so several branches created
/// between two ticks fire a single event.
pub struct NewBranch {
    client: Arc<GitHubClient>,
    fields: Vec<FieldSpec>,
}

impl NewBranch {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self {
            client,
            fields: repository_field(),
        }
    }
}

#[async_trait]
impl Trigger for NewBranch {
    fn id(&self) -> u32 {
        4
    }

    fn name(&self) -> &str {
        "New branch"
    }

    fn description(&self) -> &str {
        "Triggers when a new branch is created to a repository"
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let repo = repository(ctx)?;
        let mut seen: BranchCheckpoint = ctx.checkpoint_as()?;

        let branches = self.client.list_branches(&ctx.token.access_token, &repo).await?;
        let unknown: Vec<_> = branches
            .into_iter()
            .filter(|b| !seen.known_branches.contains(&b.name))
            .collect();
        let Some(first) = unknown.first().cloned() else {
            return Ok(CheckOutcome::idle());
        };
        seen.known_branches.extend(unknown.into_iter().map(|b| b.name));

        let text = format!("New branch created: {} in the repository {}", first.name, repo);
        let data = serde_json::to_value(&first).context("Failed to encode branch")?;
        CheckOutcome::fire(seen, FiredEvent::new(text, data))
    }
}
