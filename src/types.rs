//! Symbiont - Type Definitions
//!
//! Shared types for the autonomous social-agent runtime: agent
//! configuration, feed snapshots, generation contexts, watermarks, and the
//! capability traits the engine is written against.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// ─── Identity ────────────────────────────────────────────────────

/// Who the agent is on the network. Immutable for the process lifetime
/// except `credential`, which may be replaced by a token request.
#[derive(Clone, Debug)]
pub struct AgentIdentity {
    pub name: String,
    pub username: String,
    pub credential: String,
}

// ─── Configuration ───────────────────────────────────────────────

/// Which provider family a generation backend speaks.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    Openai,
    Anthropic,
    Gemini,
}

/// Generation backend selection for one agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub provider: BackendProvider,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

/// Full per-agent configuration. Supplied at construction, immutable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub name: String,
    pub username: String,
    /// Opaque bearer token for the Protocol. Empty means the engine
    /// requests one at startup.
    #[serde(default)]
    pub credential: String,
    /// Self-introduction sent with a token request.
    #[serde(default)]
    pub introduction: String,
    pub backend: BackendConfig,
    /// Persona prompt that shapes everything the agent writes.
    pub system_prompt: String,
    /// Keywords whose presence in a comment counts as a mention.
    pub mention_keywords: Vec<String>,
    #[serde(default = "default_cycle_interval_minutes")]
    pub cycle_interval_minutes: u64,
    #[serde(default = "default_jitter_minutes")]
    pub jitter_minutes: u64,
    /// Floor for the jittered delay so an agent can never busy-loop.
    #[serde(default = "default_min_interval_minutes")]
    pub min_interval_minutes: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Probability of choosing observation over freeform when the feed
    /// has new posts.
    #[serde(default = "default_observation_bias")]
    pub observation_bias: f64,
    /// Probability of liking one recently observed post per cycle.
    #[serde(default = "default_like_probability")]
    pub like_probability: f64,
    /// When set, reply prompts also carry recent feed lines.
    #[serde(default)]
    pub reply_with_feed_context: bool,
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
}

fn default_cycle_interval_minutes() -> u64 {
    60
}
fn default_jitter_minutes() -> u64 {
    5
}
fn default_min_interval_minutes() -> u64 {
    5
}
fn default_temperature() -> f64 {
    0.8
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_observation_bias() -> f64 {
    0.5
}
fn default_like_probability() -> f64 {
    0.4
}
fn default_generation_timeout_secs() -> u64 {
    600
}

impl AgentConfig {
    /// The identity this configuration describes.
    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity {
            name: self.name.clone(),
            username: self.username.clone(),
            credential: self.credential.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

// ─── Feed Snapshots ──────────────────────────────────────────────

/// Account that authored a post or comment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub is_ai: bool,
}

/// A top-level post as returned by the feed. Immutable snapshot data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<Author>,
}

impl Post {
    /// Title when present, otherwise a short content snippet. Used for
    /// feed summaries in prompts.
    pub fn headline(&self) -> String {
        match &self.title {
            Some(t) if !t.is_empty() => t.clone(),
            _ => self.content.chars().take(80).collect(),
        }
    }
}

/// Parent post embedded in a comment row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParentPost {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
}

/// A comment as returned by the feed, with its parent post inlined.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub post_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub post: Option<ParentPost>,
}

// ─── Publishing ──────────────────────────────────────────────────

/// Where a publication threads. Absent entirely for a new top-level post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThreadRef {
    /// A direct reply under a post.
    Post { post_id: String },
    /// A nested reply to a comment under that comment's post.
    Comment {
        post_id: String,
        parent_comment_id: String,
    },
}

impl ThreadRef {
    pub fn post_id(&self) -> &str {
        match self {
            ThreadRef::Post { post_id } => post_id,
            ThreadRef::Comment { post_id, .. } => post_id,
        }
    }

    pub fn parent_comment_id(&self) -> Option<&str> {
        match self {
            ThreadRef::Post { .. } => None,
            ThreadRef::Comment {
                parent_comment_id, ..
            } => Some(parent_comment_id),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishKind {
    Post,
    Comment,
}

/// What the Protocol acknowledged after a publish.
#[derive(Clone, Debug)]
pub struct PublishReceipt {
    pub id: String,
    pub kind: PublishKind,
}

// ─── Generation ──────────────────────────────────────────────────

/// Input to one generation call. Discarded after use.
#[derive(Clone, Debug)]
pub enum GenerationContext {
    /// Somebody addressed the agent; `feed` is empty unless the agent is
    /// configured to carry recent posts into reply prompts.
    Reply { comment: Comment, feed: Vec<Post> },
    /// React to recent community activity.
    Observation { posts: Vec<Post> },
    /// Persona alone, no external context.
    Freeform,
}

impl GenerationContext {
    pub fn mode(&self) -> &'static str {
        match self {
            GenerationContext::Reply { .. } => "reply",
            GenerationContext::Observation { .. } => "observation",
            GenerationContext::Freeform => "freeform",
        }
    }
}

/// System/user prompt pair. Kept separate because providers place the
/// persona in different request fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Clone, Copy, Debug)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

// ─── Watermarks ──────────────────────────────────────────────────

/// Timestamp boundaries separating processed from unprocessed feed items,
/// plus the cycle counter. Lives exactly as long as the owning engine.
#[derive(Clone, Debug)]
pub struct WatermarkState {
    pub last_post_seen_at: DateTime<Utc>,
    pub last_mention_seen_at: DateTime<Utc>,
    pub cycle_count: u64,
}

impl WatermarkState {
    /// Fresh state looking back `hours` so a newly started agent has
    /// immediate context.
    pub fn with_lookback(hours: i64) -> Self {
        let start = Utc::now() - Duration::hours(hours);
        Self {
            last_post_seen_at: start,
            last_mention_seen_at: start,
            cycle_count: 0,
        }
    }

    /// Advance the post watermark. Never rewinds.
    pub fn observe_post(&mut self, seen: DateTime<Utc>) {
        if seen > self.last_post_seen_at {
            self.last_post_seen_at = seen;
        }
    }

    /// Advance the mention watermark. Never rewinds.
    pub fn observe_mention(&mut self, seen: DateTime<Utc>) {
        if seen > self.last_mention_seen_at {
            self.last_mention_seen_at = seen;
        }
    }
}

// ─── Cycle Reporting ─────────────────────────────────────────────

/// Which branch a cycle took.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleBranch {
    Reply {
        comment_id: String,
        post_id: String,
    },
    Observation {
        posts_seen: usize,
    },
    Freeform {
        feed_was_quiet: bool,
    },
}

/// How the action phase of a cycle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Published(PublishKind),
    /// Generation produced nothing usable; publish was skipped.
    NothingToSay,
    /// The server reported the desired state already holds.
    AlreadyDone,
    /// Credential rejected; action skipped without retry.
    Unauthorized,
    Failed,
}

/// One-line structured trace of a completed cycle.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub branch: CycleBranch,
    pub outcome: CycleOutcome,
}

// ─── Capability Traits ───────────────────────────────────────────

/// The operations the engine needs from the Protocol.
#[async_trait]
pub trait ProtocolHandle: Send + Sync {
    /// Request a fresh credential for `name`. Used once at startup when
    /// no static credential is configured.
    async fn request_token(
        &self,
        name: &str,
        model: &str,
        introduction: &str,
    ) -> Result<String, ProtocolError>;

    /// Posts strictly newer than `since`, newest-first.
    async fn recent_posts(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Post>, ProtocolError>;

    /// Comments strictly newer than `since`, newest-first. Mention
    /// filtering happens in the engine, not the server.
    async fn recent_comments(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Comment>, ProtocolError>;

    /// Publish `content` as a new post (`thread` absent, `title` set) or
    /// as a reply threaded per `thread`.
    async fn publish(
        &self,
        credential: &str,
        content: &str,
        title: Option<&str>,
        thread: Option<&ThreadRef>,
    ) -> Result<PublishReceipt, ProtocolError>;

    /// Like a post. A duplicate like surfaces as `ProtocolError::Conflict`.
    async fn like_post(&self, credential: &str, post_id: &str) -> Result<(), ProtocolError>;
}

/// A language-model completion endpoint. One implementation per provider
/// family; selected once at agent construction.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Returns `Ok(None)` when the provider answered but produced no
    /// usable text. Errors cover transport and provider failures.
    async fn complete(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> anyhow::Result<Option<String>>;

    /// Model identifier, for traces and token requests.
    fn model(&self) -> &str;
}
