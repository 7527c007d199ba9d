pub mod api;
pub mod config;
pub mod reactions;
pub mod triggers;

use anyhow::Result;
use area::config::AreaConfig;
use area::oauth::OAuthProvider;
use area::{AreaError, OAuthToken, Reaction, ServiceConnector, ServiceInfo, Trigger, UserId};
use async_trait::async_trait;
use std::sync::Arc;

use self::api::GitHubClient;
use self::reactions::{CreateIssue, CreateRepository, WriteFile};
use self::triggers::{NewBranch, NewCommit, NewIssue, NewPullRequest};

/// GitHub connector: commit, issue, pull request and branch triggers;
/// repository, issue and file reactions.
pub struct GitHubConnector {
    info: ServiceInfo,
    provider: OAuthProvider,
    client: Arc<GitHubClient>,
    triggers: Vec<Arc<dyn Trigger>>,
    reactions: Vec<Arc<dyn Reaction>>,
}

impl GitHubConnector {
    /// Create a connector using the real GitHub API base URL and OAuth
    /// credentials from the environment.
    pub fn new(area_config: &AreaConfig) -> Result<Self> {
        let client = GitHubClient::new(&area_config.http)?;
        let provider = config::oauth_provider(&area_config.oauth.public_url);
        Ok(Self::with_parts(provider, client))
    }

    /// Create a connector from an explicit provider and API client (for
    /// testing with a mock server).
    pub fn with_parts(provider: OAuthProvider, client: GitHubClient) -> Self {
        let client = Arc::new(client);
        let triggers: Vec<Arc<dyn Trigger>> = vec![
            Arc::new(NewCommit::new(Arc::clone(&client))),
            Arc::new(NewIssue::new(Arc::clone(&client))),
            Arc::new(NewPullRequest::new(Arc::clone(&client))),
            Arc::new(NewBranch::new(Arc::clone(&client))),
        ];
        let reactions: Vec<Arc<dyn Reaction>> = vec![
            Arc::new(CreateRepository::new(Arc::clone(&client))),
            Arc::new(CreateIssue::new(Arc::clone(&client))),
            Arc::new(WriteFile::new(Arc::clone(&client))),
        ];
        Self {
            info: ServiceInfo {
                id: config::SERVICE_ID.to_string(),
                name: "Github".to_string(),
                description: "Github service".to_string(),
                color: "#999999".to_string(),
                icon: "/github.png".to_string(),
            },
            provider,
            client,
            triggers,
            reactions,
        }
    }
}

#[async_trait]
impl ServiceConnector for GitHubConnector {
    fn info(&self) -> &ServiceInfo {
        &self.info
    }

    fn triggers(&self) -> &[Arc<dyn Trigger>] {
        &self.triggers
    }

    fn reactions(&self) -> &[Arc<dyn Reaction>] {
        &self.reactions
    }

    async fn connect(&self, user_id: UserId) -> Result<String, AreaError> {
        self.provider.authorize_url(user_id)
    }

    async fn callback(&self, code: &str) -> Result<OAuthToken, AreaError> {
        self.provider.exchange(self.client.http(), code).await
    }
}
