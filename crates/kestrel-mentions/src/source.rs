use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use kestrel_core::{KestrelError, Result};

pub const TWITTER_API_BASE: &str = "https://api.twitter.com";

/// One item returned by a mention source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    /// Upstream id. Items without one are skipped by the poller.
    pub id: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Mention {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, username: impl Into<String>) -> Self {
        self.author_username = Some(username.into());
        self
    }
}

/// Where mentions come from.
#[async_trait]
pub trait MentionSource: Send + Sync {
    /// Label used in logs and `ExternalFetch` errors.
    fn name(&self) -> &str;

    /// Fetch up to `limit` mentions newer than `since` (no lower bound when
    /// `None`), newest first as the upstream returns them.
    async fn fetch(&self, since: Option<&str>, limit: u32) -> Result<Vec<Mention>>;
}

/// Twitter v2 `GET /2/users/{id}/mentions` client.
pub struct HttpMentionSource {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
    user_id: String,
}

impl HttpMentionSource {
    pub fn new(bearer_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: TWITTER_API_BASE.to_string(),
            bearer_token: bearer_token.into(),
            user_id: user_id.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/2/users/{}/mentions", self.base_url, self.user_id)
    }

    fn fetch_err(&self, reason: impl ToString) -> KestrelError {
        KestrelError::ExternalFetch {
            source_name: self.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl MentionSource for HttpMentionSource {
    fn name(&self) -> &str {
        "twitter"
    }

    async fn fetch(&self, since: Option<&str>, limit: u32) -> Result<Vec<Mention>> {
        // The endpoint rejects page sizes outside 5..=100.
        let mut query = vec![
            ("max_results", limit.clamp(5, 100).to_string()),
            (
                "tweet.fields",
                "author_id,conversation_id,created_at".to_string(),
            ),
            ("expansions", "author_id".to_string()),
            ("user.fields", "username".to_string()),
        ];
        if let Some(since) = since {
            query.push(("since_id", since.to_string()));
        }

        let response = self
            .client
            .get(self.endpoint())
            .bearer_auth(&self.bearer_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| self.fetch_err(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.fetch_err(e))?;
        if !status.is_success() {
            return Err(self.fetch_err(format!("HTTP {status}: {body}")));
        }

        let mentions = parse_page(&body).map_err(|e| self.fetch_err(e))?;
        debug!(count = mentions.len(), ?since, "fetched mentions");
        Ok(mentions)
    }
}

#[derive(Deserialize)]
struct MentionsPage {
    #[serde(default)]
    data: Vec<RawTweet>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Deserialize)]
struct RawTweet {
    id: Option<String>,
    #[serde(default)]
    text: String,
    author_id: Option<String>,
    conversation_id: Option<String>,
    created_at: Option<String>,
}

#[derive(Deserialize, Default)]
struct Includes {
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    username: String,
}

/// Decode a mentions page, resolving author usernames from `includes`.
pub(crate) fn parse_page(body: &str) -> serde_json::Result<Vec<Mention>> {
    let page: MentionsPage = serde_json::from_str(body)?;
    let usernames: HashMap<String, String> = page
        .includes
        .users
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();

    Ok(page
        .data
        .into_iter()
        .map(|t| Mention {
            author_username: t
                .author_id
                .as_ref()
                .and_then(|id| usernames.get(id).cloned()),
            id: t.id,
            text: t.text,
            author_id: t.author_id,
            conversation_id: t.conversation_id,
            created_at: t.created_at,
        })
        .collect())
}
