//! GitHub reactions.

use anyhow::{bail, Result};
use area::{FieldFallback, FieldSpec, Reaction, ReactionContext};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::api::{GitHubClient, RepoCreation};

fn required(ctx: &ReactionContext<'_>, id: &str) -> Result<String> {
    let value = ctx.param_or_fallback(id);
    let value = value.trim();
    if value.is_empty() {
        bail!("{} is required", id);
    }
    Ok(value.to_string())
}

/// Creates a repository in the user's personal account. A name that is
/// already taken is not a failure.
pub struct CreateRepository {
    client: Arc<GitHubClient>,
    fields: Vec<FieldSpec>,
}

impl CreateRepository {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self {
            client,
            fields: vec![FieldSpec::text(
                "name",
                "Name",
                "The name of the repository to create",
            )],
        }
    }
}

#[async_trait]
impl Reaction for CreateRepository {
    fn id(&self) -> u32 {
        1
    }

    fn name(&self) -> &str {
        "Create repository"
    }

    fn description(&self) -> &str {
        "Creates a new repository in your personal account"
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    async fn execute(&self, ctx: &ReactionContext<'_>) -> Result<()> {
        let name = required(ctx, "name")?;
        match self
            .client
            .create_repository(&ctx.token.access_token, &name)
            .await?
        {
            RepoCreation::Created => info!(user_id = %ctx.user.id, repository = %name, "Repository created"),
            RepoCreation::AlreadyExists => {
                info!(user_id = %ctx.user.id, repository = %name, "Repository already exists")
            }
        }
        Ok(())
    }
}

/// Opens an issue; an empty title falls back to the event text.
pub struct CreateIssue {
    client: Arc<GitHubClient>,
    fields: Vec<FieldSpec>,
}

impl CreateIssue {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self {
            client,
            fields: vec![
                FieldSpec::text(
                    "repository_name",
                    "Repository",
                    "The repository to create the issue in",
                ),
                FieldSpec::text("title", "Title", "The title of the issue")
                    .with_fallback(FieldFallback::EventText),
            ],
        }
    }
}

#[async_trait]
impl Reaction for CreateIssue {
    fn id(&self) -> u32 {
        2
    }

    fn name(&self) -> &str {
        "Create issue"
    }

    fn description(&self) -> &str {
        "Creates a new issue in a repository"
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    async fn execute(&self, ctx: &ReactionContext<'_>) -> Result<()> {
        let repo = required(ctx, "repository_name")?;
        let title = required(ctx, "title")?;
        let number = self
            .client
            .create_issue(&ctx.token.access_token, &repo, &title)
            .await?;
        info!(user_id = %ctx.user.id, repository = %repo, number, "Issue created");
        Ok(())
    }
}

/// Creates or replaces a file; an empty body falls back to the event text.
pub struct WriteFile {
    client: Arc<GitHubClient>,
    fields: Vec<FieldSpec>,
}

impl WriteFile {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self {
            client,
            fields: vec![
                FieldSpec::text(
                    "repository_name",
                    "Repository",
                    "The repository to create the file in",
                ),
                FieldSpec::text(
                    "commit_msg",
                    "Commit message",
                    "The message of the commit that will create or update the file",
                ),
                FieldSpec::text("filename", "Filename", "The name of the file"),
                FieldSpec::text("body", "Body", "The content of the file")
                    .with_fallback(FieldFallback::EventText),
            ],
        }
    }
}

#[async_trait]
impl Reaction for WriteFile {
    fn id(&self) -> u32 {
        3
    }

    fn name(&self) -> &str {
        "Write file"
    }

    fn description(&self) -> &str {
        "Creates or update file in a repository"
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    async fn execute(&self, ctx: &ReactionContext<'_>) -> Result<()> {
        let repo = required(ctx, "repository_name")?;
        let message = required(ctx, "commit_msg")?;
        let filename = required(ctx, "filename")?;
        // File content is written verbatim, surrounding whitespace included.
        let body = ctx.param_or_fallback("body");

        let token = &ctx.token.access_token;
        let sha = self.client.file_sha(token, &repo, &filename).await?;
        let replaced = sha.is_some();
        self.client
            .put_file(token, &repo, &filename, &message, &body, sha.as_deref())
            .await?;

        info!(
            user_id = %ctx.user.id,
            repository = %repo,
            filename = %filename,
            replaced,
            "File written"
        );
        Ok(())
    }
}
