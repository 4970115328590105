//! The Agent Engine
//!
//! The core cycle: listen for mentions, fall back to watching the feed,
//! think, speak, rest. Owns the per-agent watermarks and the jitter
//! policy. Nothing that goes wrong inside one cycle may prevent the next
//! one from being scheduled.

use std::cmp::max;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::error::ProtocolError;
use crate::generate::ContentGenerator;
use crate::runner::ShutdownSignal;
use crate::types::{
    AgentConfig, AgentIdentity, Comment, CycleBranch, CycleOutcome, CycleReport,
    GenerationContext, Post, ProtocolHandle, ThreadRef, WatermarkState,
};

/// How many comments one mention poll asks for.
const MENTION_POLL_LIMIT: u32 = 20;

/// How many posts one feed poll asks for.
const POST_POLL_LIMIT: u32 = 10;

/// A fresh engine looks this far back so it has immediate context.
const LOOKBACK_HOURS: i64 = 1;

/// One autonomous agent. Cycles run strictly sequentially; the only
/// suspension points are network calls and the inter-cycle rest.
pub struct Engine {
    identity: AgentIdentity,
    config: AgentConfig,
    protocol: Arc<dyn ProtocolHandle>,
    generator: ContentGenerator,
    watermarks: WatermarkState,
}

impl Engine {
    pub fn new(
        config: AgentConfig,
        protocol: Arc<dyn ProtocolHandle>,
        generator: ContentGenerator,
    ) -> Self {
        Self {
            identity: config.identity(),
            config,
            protocol,
            generator,
            watermarks: WatermarkState::with_lookback(LOOKBACK_HOURS),
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn watermarks(&self) -> &WatermarkState {
        &self.watermarks
    }

    /// Obtain a credential if none was configured. A failure here is
    /// fatal for this engine alone.
    pub async fn ensure_credential(&mut self) -> Result<()> {
        if !self.identity.credential.is_empty() {
            return Ok(());
        }

        info!(agent = %self.identity.name, "no static credential; requesting one");
        let token = self
            .protocol
            .request_token(
                &self.identity.name,
                self.generator.model(),
                &self.config.introduction,
            )
            .await
            .context("Failed to obtain a credential")?;
        self.identity.credential = token;
        info!(agent = %self.identity.name, "credential obtained");
        Ok(())
    }

    /// Run until shutdown. The rest period is interruptible; an in-flight
    /// cycle always finishes, but its completion never schedules another
    /// one once shutdown has been signalled.
    pub async fn run(mut self, shutdown: Arc<ShutdownSignal>) {
        if let Err(err) = self.ensure_credential().await {
            error!(
                agent = %self.identity.name,
                error = %err,
                "no credential obtainable; engine stopped"
            );
            return;
        }

        info!(
            agent = %self.identity.name,
            model = self.generator.model(),
            interval_minutes = self.config.cycle_interval_minutes,
            "engine started"
        );

        loop {
            if shutdown.is_triggered() {
                break;
            }

            self.run_cycle().await;

            if shutdown.is_triggered() {
                break;
            }

            let delay = self.next_delay();
            debug!(
                agent = %self.identity.name,
                rest_secs = delay.as_secs(),
                "resting"
            );
            if shutdown.wait_interrupted(delay).await {
                break;
            }
        }

        info!(agent = %self.identity.name, "engine stopped");
    }

    /// One full perception-decision-action pass.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.watermarks.cycle_count += 1;
        let cycle = self.watermarks.cycle_count;

        // Phase 1: listen. A qualifying mention dominates everything else.
        let mention = self.poll_mentions().await;

        let mut observed_posts: Vec<Post> = Vec::new();
        let (branch, context) = match mention {
            Some(comment) => {
                let feed = if self.config.reply_with_feed_context {
                    let feed = self.poll_posts().await;
                    observed_posts = feed.clone();
                    feed
                } else {
                    Vec::new()
                };
                let branch = CycleBranch::Reply {
                    comment_id: comment.id.clone(),
                    post_id: comment.post_id.clone(),
                };
                (branch, GenerationContext::Reply { comment, feed })
            }
            None => {
                // Phase 2: watch the feed and decide.
                let posts = self.poll_posts().await;
                observed_posts = posts.clone();
                if posts.is_empty() {
                    // A quiet network never stalls the agent.
                    (
                        CycleBranch::Freeform {
                            feed_was_quiet: true,
                        },
                        GenerationContext::Freeform,
                    )
                } else if rand::thread_rng()
                    .gen_bool(self.config.observation_bias.clamp(0.0, 1.0))
                {
                    (
                        CycleBranch::Observation {
                            posts_seen: posts.len(),
                        },
                        GenerationContext::Observation { posts },
                    )
                } else {
                    (
                        CycleBranch::Freeform {
                            feed_was_quiet: false,
                        },
                        GenerationContext::Freeform,
                    )
                }
            }
        };

        // Phase 3: think. Nothing usable means nothing gets published
        // this cycle; the watermarks are already advanced, so a poisoned
        // item is never reprocessed.
        let outcome = match self.generator.generate(&context).await {
            None => CycleOutcome::NothingToSay,
            Some(text) => self.publish_for(&branch, &text).await,
        };

        // Interlude: occasionally appreciate somebody else's post.
        self.maybe_like(&observed_posts).await;

        let report = CycleReport {
            cycle,
            branch,
            outcome,
        };
        info!(
            agent = %self.identity.name,
            cycle = report.cycle,
            branch = ?report.branch,
            outcome = ?report.outcome,
            "cycle complete"
        );
        report
    }

    /// Poll for new comments and pick the most recent qualifying mention.
    /// The watermark advances on every successful poll, mention or not.
    async fn poll_mentions(&mut self) -> Option<Comment> {
        let comments = match self
            .protocol
            .recent_comments(self.watermarks.last_mention_seen_at, MENTION_POLL_LIMIT)
            .await
        {
            Ok(comments) => comments,
            Err(err) => {
                warn!(agent = %self.identity.name, error = %err, "mention poll failed");
                return None;
            }
        };

        if let Some(newest) = comments.iter().map(|c| c.created_at).max() {
            self.watermarks.observe_mention(newest);
        }

        select_mention(
            &self.identity.username,
            &self.config.mention_keywords,
            comments,
        )
    }

    /// Poll for new posts, advancing the post watermark. Empty on error;
    /// the next scheduled cycle re-reads the same window.
    async fn poll_posts(&mut self) -> Vec<Post> {
        let posts = match self
            .protocol
            .recent_posts(self.watermarks.last_post_seen_at, POST_POLL_LIMIT)
            .await
        {
            Ok(posts) => posts,
            Err(err) => {
                warn!(agent = %self.identity.name, error = %err, "post poll failed");
                return Vec::new();
            }
        };

        if let Some(newest) = posts.iter().map(|p| p.created_at).max() {
            self.watermarks.observe_post(newest);
        }

        posts
    }

    /// Publish `text` where the branch dictates. Failures are absorbed:
    /// conflicts count as success, a rejected credential is skipped, and
    /// everything else waits for the next cycle.
    async fn publish_for(&self, branch: &CycleBranch, text: &str) -> CycleOutcome {
        let (title, thread) = match branch {
            CycleBranch::Reply {
                comment_id,
                post_id,
            } => (
                None,
                Some(ThreadRef::Comment {
                    post_id: post_id.clone(),
                    parent_comment_id: comment_id.clone(),
                }),
            ),
            _ => (Some(self.post_title()), None),
        };

        match self
            .protocol
            .publish(
                &self.identity.credential,
                text,
                title.as_deref(),
                thread.as_ref(),
            )
            .await
        {
            Ok(receipt) => {
                info!(
                    agent = %self.identity.name,
                    item = %receipt.id,
                    kind = ?receipt.kind,
                    "published"
                );
                CycleOutcome::Published(receipt.kind)
            }
            Err(err) if err.is_success_equivalent() => {
                info!(agent = %self.identity.name, "publish already in desired state");
                CycleOutcome::AlreadyDone
            }
            Err(ProtocolError::InvalidCredential) => {
                warn!(
                    agent = %self.identity.name,
                    "credential rejected; skipping publish this cycle"
                );
                CycleOutcome::Unauthorized
            }
            Err(err) => {
                warn!(agent = %self.identity.name, error = %err, "publish failed");
                CycleOutcome::Failed
            }
        }
    }

    /// With configured probability, like one post observed this cycle
    /// that somebody else wrote. Best-effort; a duplicate is success.
    async fn maybe_like(&self, posts: &[Post]) {
        let probability = self.config.like_probability.clamp(0.0, 1.0);
        if posts.is_empty() || probability <= 0.0 {
            return;
        }
        if !rand::thread_rng().gen_bool(probability) {
            return;
        }

        let candidates: Vec<&Post> = posts
            .iter()
            .filter(|p| {
                p.author
                    .as_ref()
                    .map(|a| !a.username.eq_ignore_ascii_case(&self.identity.username))
                    .unwrap_or(true)
            })
            .collect();
        let Some(pick) = candidates.choose(&mut rand::thread_rng()) else {
            return;
        };

        match self
            .protocol
            .like_post(&self.identity.credential, &pick.id)
            .await
        {
            Ok(()) => debug!(agent = %self.identity.name, post = %pick.id, "liked"),
            Err(err) if err.is_success_equivalent() => {
                debug!(agent = %self.identity.name, post = %pick.id, "already liked")
            }
            Err(err) => warn!(agent = %self.identity.name, error = %err, "like failed"),
        }
    }

    fn post_title(&self) -> String {
        format!(
            "{}'s thought - {}",
            self.identity.name,
            Utc::now().format("%Y-%m-%d %H:%M"),
        )
    }

    fn next_delay(&self) -> Duration {
        let minutes = jittered_minutes(
            self.config.cycle_interval_minutes,
            self.config.jitter_minutes,
            self.config.min_interval_minutes,
            &mut rand::thread_rng(),
        );
        Duration::from_secs(minutes * 60)
    }
}

/// Filter comments down to qualifying mentions and pick the most recent:
/// never the agent's own words, and only content carrying a configured
/// keyword, case-insensitively.
fn select_mention(
    own_username: &str,
    keywords: &[String],
    comments: Vec<Comment>,
) -> Option<Comment> {
    comments
        .into_iter()
        .filter(|c| {
            c.author
                .as_ref()
                .map(|a| !a.username.eq_ignore_ascii_case(own_username))
                .unwrap_or(true)
        })
        .filter(|c| {
            let content = c.content.to_lowercase();
            keywords
                .iter()
                .any(|k| content.contains(&k.to_lowercase()))
        })
        .max_by_key(|c| c.created_at)
}

/// Uniform random delay in `[max(floor, interval - jitter), interval + jitter]`
/// minutes. The floor keeps agents from ever busy-looping; the spread
/// keeps a fleet from posting in lockstep.
fn jittered_minutes(interval: u64, jitter: u64, floor: u64, rng: &mut impl Rng) -> u64 {
    let low = max(floor, interval.saturating_sub(jitter));
    let high = max(low, interval.saturating_add(jitter));
    rng.gen_range(low..=high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Author, GenerationBackend, GenerationParams, Prompt, PublishKind, PublishReceipt,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // -- fakes ------------------------------------------------------------

    #[derive(Debug)]
    struct PublishCall {
        content: String,
        title: Option<String>,
        thread: Option<ThreadRef>,
    }

    #[derive(Default)]
    struct FakeProtocol {
        comment_script: Mutex<VecDeque<Result<Vec<Comment>, ProtocolError>>>,
        post_script: Mutex<VecDeque<Result<Vec<Post>, ProtocolError>>>,
        publish_script: Mutex<VecDeque<Result<PublishReceipt, ProtocolError>>>,
        post_polls: Mutex<u32>,
        published: Mutex<Vec<PublishCall>>,
        liked: Mutex<Vec<String>>,
        token: Mutex<Option<Result<String, ProtocolError>>>,
    }

    impl FakeProtocol {
        fn queue_comments(&self, result: Result<Vec<Comment>, ProtocolError>) {
            self.comment_script.lock().unwrap().push_back(result);
        }

        fn queue_posts(&self, result: Result<Vec<Post>, ProtocolError>) {
            self.post_script.lock().unwrap().push_back(result);
        }

        fn queue_publish(&self, result: Result<PublishReceipt, ProtocolError>) {
            self.publish_script.lock().unwrap().push_back(result);
        }
    }

    #[async_trait]
    impl ProtocolHandle for FakeProtocol {
        async fn request_token(
            &self,
            _name: &str,
            _model: &str,
            _introduction: &str,
        ) -> Result<String, ProtocolError> {
            self.token
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok("granted_token".into()))
        }

        async fn recent_posts(
            &self,
            _since: DateTime<Utc>,
            _limit: u32,
        ) -> Result<Vec<Post>, ProtocolError> {
            *self.post_polls.lock().unwrap() += 1;
            self.post_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Vec::new()))
        }

        async fn recent_comments(
            &self,
            _since: DateTime<Utc>,
            _limit: u32,
        ) -> Result<Vec<Comment>, ProtocolError> {
            self.comment_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Vec::new()))
        }

        async fn publish(
            &self,
            _credential: &str,
            content: &str,
            title: Option<&str>,
            thread: Option<&ThreadRef>,
        ) -> Result<PublishReceipt, ProtocolError> {
            self.published.lock().unwrap().push(PublishCall {
                content: content.to_string(),
                title: title.map(|t| t.to_string()),
                thread: thread.cloned(),
            });
            self.publish_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(PublishReceipt {
                    id: "item".into(),
                    kind: PublishKind::Post,
                }))
        }

        async fn like_post(
            &self,
            _credential: &str,
            post_id: &str,
        ) -> Result<(), ProtocolError> {
            self.liked.lock().unwrap().push(post_id.to_string());
            Ok(())
        }
    }

    struct FakeBackend {
        reply: Mutex<Option<String>>,
        prompts: Mutex<Vec<Prompt>>,
    }

    impl FakeBackend {
        fn saying(text: &str) -> Self {
            Self {
                reply: Mutex::new(Some(text.to_string())),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn silent() -> Self {
            Self {
                reply: Mutex::new(None),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for FakeBackend {
        async fn complete(
            &self,
            prompt: &Prompt,
            _params: &GenerationParams,
        ) -> anyhow::Result<Option<String>> {
            self.prompts.lock().unwrap().push(prompt.clone());
            Ok(self.reply.lock().unwrap().clone())
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    // -- scaffolding ------------------------------------------------------

    fn config() -> AgentConfig {
        serde_json::from_value(serde_json::json!({
            "name": "Kimi (Agent)",
            "username": "kimi",
            "credential": "tok",
            "backend": {
                "provider": "openai",
                "apiUrl": "http://unused",
                "apiKey": "k",
                "model": "fake-model"
            },
            "systemPrompt": "You are Kimi.",
            "mentionKeywords": ["Kimi"],
            "likeProbability": 0.0
        }))
        .unwrap()
    }

    fn engine_with(
        config: AgentConfig,
        protocol: Arc<FakeProtocol>,
        backend: Arc<FakeBackend>,
    ) -> Engine {
        let generator = ContentGenerator::new(
            backend,
            config.system_prompt.clone(),
            GenerationParams {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
            Duration::from_secs(5),
        );
        Engine::new(config, protocol, generator)
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 12, minute, 0).unwrap()
    }

    fn comment_from(id: &str, username: &str, content: &str, created: DateTime<Utc>) -> Comment {
        Comment {
            id: id.into(),
            content: content.into(),
            created_at: created,
            post_id: "p1".into(),
            parent_id: None,
            author: Some(Author {
                id: format!("u_{username}"),
                username: username.into(),
                display_name: username.into(),
                is_ai: false,
            }),
            post: Some(crate::types::ParentPost {
                id: "p1".into(),
                title: None,
                content: "original post".into(),
            }),
        }
    }

    fn post_from(id: &str, username: &str, created: DateTime<Utc>) -> Post {
        Post {
            id: id.into(),
            title: Some(format!("post {id}")),
            content: "body".into(),
            created_at: created,
            author: Some(Author {
                id: format!("u_{username}"),
                username: username.into(),
                display_name: username.into(),
                is_ai: true,
            }),
        }
    }

    // -- tests ------------------------------------------------------------

    #[tokio::test]
    async fn test_mention_dominates_origination() {
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_comments(Ok(vec![comment_from(
            "c1",
            "alice",
            "Hey @Kimi what do you think?",
            at(2),
        )]));
        protocol.queue_posts(Ok(vec![post_from("p9", "bob", at(3))]));
        let backend = Arc::new(FakeBackend::saying("glad you asked"));

        let mut engine = engine_with(config(), Arc::clone(&protocol), backend);
        let report = engine.run_cycle().await;

        assert!(matches!(report.branch, CycleBranch::Reply { .. }));
        let published = protocol.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].thread,
            Some(ThreadRef::Comment {
                post_id: "p1".into(),
                parent_comment_id: "c1".into(),
            })
        );
        assert_eq!(published[0].content, "glad you asked");
        assert!(published[0].title.is_none());
        assert_eq!(engine.watermarks().last_mention_seen_at, at(2));
        // With feed context off, a replying cycle never even reads posts.
        assert_eq!(*protocol.post_polls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_own_comments_never_count_as_mentions() {
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_comments(Ok(vec![comment_from(
            "c2",
            "kimi",
            "I, Kimi, talk about Kimi a lot",
            at(5),
        )]));
        let backend = Arc::new(FakeBackend::saying("a thought"));

        let mut engine = engine_with(config(), Arc::clone(&protocol), backend);
        let report = engine.run_cycle().await;

        assert!(matches!(
            report.branch,
            CycleBranch::Freeform {
                feed_was_quiet: true
            }
        ));
        // Still consumed: the self-comment advanced the mention watermark.
        assert_eq!(engine.watermarks().last_mention_seen_at, at(5));
    }

    #[tokio::test]
    async fn test_keyword_match_is_case_insensitive() {
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_comments(Ok(vec![comment_from("c3", "bob", "hello KIMI", at(1))]));
        let backend = Arc::new(FakeBackend::saying("hello bob"));

        let mut engine = engine_with(config(), Arc::clone(&protocol), backend);
        let report = engine.run_cycle().await;

        assert!(matches!(report.branch, CycleBranch::Reply { .. }));
    }

    #[tokio::test]
    async fn test_most_recent_mention_wins() {
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_comments(Ok(vec![
            comment_from("c_old", "alice", "Kimi?", at(1)),
            comment_from("c_new", "bob", "Kimi!", at(4)),
        ]));
        let backend = Arc::new(FakeBackend::saying("answering"));

        let mut engine = engine_with(config(), Arc::clone(&protocol), backend);
        let report = engine.run_cycle().await;

        match report.branch {
            CycleBranch::Reply { comment_id, .. } => assert_eq!(comment_id, "c_new"),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_quiet_network_falls_back_to_freeform() {
        let protocol = Arc::new(FakeProtocol::default());
        let backend = Arc::new(FakeBackend::saying("spontaneous musing"));

        let mut engine = engine_with(config(), Arc::clone(&protocol), Arc::clone(&backend));
        let report = engine.run_cycle().await;

        assert!(matches!(
            report.branch,
            CycleBranch::Freeform {
                feed_was_quiet: true
            }
        ));
        assert_eq!(report.outcome, CycleOutcome::Published(PublishKind::Post));

        // Generation ran in freeform mode: persona only, no feed lines.
        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].user.contains("spontaneous"));

        // And the result went out as a titled top-level post.
        let published = protocol.published.lock().unwrap();
        assert!(published[0].thread.is_none());
        assert!(published[0].title.is_some());
    }

    #[tokio::test]
    async fn test_null_generation_skips_publish_but_advances_watermark() {
        let mut cfg = config();
        cfg.observation_bias = 1.0;
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_posts(Ok(vec![
            post_from("p5", "alice", at(5)),
            post_from("p4", "bob", at(4)),
        ]));
        let backend = Arc::new(FakeBackend::silent());

        let mut engine = engine_with(cfg, Arc::clone(&protocol), backend);
        let report = engine.run_cycle().await;

        assert!(matches!(
            report.branch,
            CycleBranch::Observation { posts_seen: 2 }
        ));
        assert_eq!(report.outcome, CycleOutcome::NothingToSay);
        assert!(protocol.published.lock().unwrap().is_empty());
        assert_eq!(engine.watermarks().last_post_seen_at, at(5));
    }

    #[tokio::test]
    async fn test_observation_branch_publishes_top_level() {
        let mut cfg = config();
        cfg.observation_bias = 1.0;
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_posts(Ok(vec![post_from("p5", "alice", at(5))]));
        let backend = Arc::new(FakeBackend::saying("what a day on the network"));

        let mut engine = engine_with(cfg, Arc::clone(&protocol), backend);
        let report = engine.run_cycle().await;

        assert!(matches!(report.branch, CycleBranch::Observation { .. }));
        assert_eq!(report.outcome, CycleOutcome::Published(PublishKind::Post));
    }

    #[tokio::test]
    async fn test_zero_bias_always_freeforms_even_with_posts() {
        let mut cfg = config();
        cfg.observation_bias = 0.0;
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_posts(Ok(vec![post_from("p5", "alice", at(5))]));
        let backend = Arc::new(FakeBackend::saying("musing"));

        let mut engine = engine_with(cfg, Arc::clone(&protocol), backend);
        let report = engine.run_cycle().await;

        assert!(matches!(
            report.branch,
            CycleBranch::Freeform {
                feed_was_quiet: false
            }
        ));
        // The poll still advanced the watermark.
        assert_eq!(engine.watermarks().last_post_seen_at, at(5));
    }

    #[tokio::test]
    async fn test_publish_conflict_counts_as_success() {
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_publish(Err(ProtocolError::Conflict("duplicate".into())));
        let backend = Arc::new(FakeBackend::saying("text"));

        let mut engine = engine_with(config(), Arc::clone(&protocol), backend);
        let report = engine.run_cycle().await;

        assert_eq!(report.outcome, CycleOutcome::AlreadyDone);
    }

    #[tokio::test]
    async fn test_rejected_credential_is_skipped_not_retried() {
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_publish(Err(ProtocolError::InvalidCredential));
        let backend = Arc::new(FakeBackend::saying("text"));

        let mut engine = engine_with(config(), Arc::clone(&protocol), backend);
        let report = engine.run_cycle().await;

        assert_eq!(report.outcome, CycleOutcome::Unauthorized);
        assert_eq!(protocol.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_publish_failure_does_not_stop_the_engine() {
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_publish(Err(ProtocolError::Transient("gateway down".into())));
        let backend = Arc::new(FakeBackend::saying("text"));

        let mut engine = engine_with(config(), Arc::clone(&protocol), backend);
        let first = engine.run_cycle().await;
        assert_eq!(first.outcome, CycleOutcome::Failed);

        // The next cycle proceeds normally; no inline retry happened.
        let second = engine.run_cycle().await;
        assert_eq!(second.outcome, CycleOutcome::Published(PublishKind::Post));
        assert_eq!(protocol.published.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_watermark_is_monotonic_across_cycles() {
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_comments(Ok(vec![comment_from("c1", "alice", "Kimi hi", at(10))]));
        // A later poll returning only older items must not rewind anything.
        protocol.queue_comments(Ok(vec![comment_from("c0", "bob", "Kimi yo", at(3))]));
        let backend = Arc::new(FakeBackend::saying("hi"));

        let mut engine = engine_with(config(), Arc::clone(&protocol), backend);
        engine.run_cycle().await;
        let after_first = engine.watermarks().last_mention_seen_at;
        engine.run_cycle().await;
        let after_second = engine.watermarks().last_mention_seen_at;

        assert_eq!(after_first, at(10));
        assert!(after_second >= after_first);
    }

    #[tokio::test]
    async fn test_transient_mention_poll_falls_through_to_feed() {
        let mut cfg = config();
        cfg.observation_bias = 1.0;
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_comments(Err(ProtocolError::Transient("gateway sneezed".into())));
        protocol.queue_posts(Ok(vec![post_from("p5", "alice", at(5))]));
        let backend = Arc::new(FakeBackend::saying("still here"));

        let mut engine = engine_with(cfg, Arc::clone(&protocol), backend);
        let report = engine.run_cycle().await;

        assert!(matches!(report.branch, CycleBranch::Observation { .. }));
        assert_eq!(report.outcome, CycleOutcome::Published(PublishKind::Post));
    }

    #[tokio::test]
    async fn test_like_interlude_never_targets_own_posts() {
        let mut cfg = config();
        cfg.like_probability = 1.0;
        cfg.observation_bias = 1.0;
        let protocol = Arc::new(FakeProtocol::default());
        protocol.queue_posts(Ok(vec![
            post_from("p_own", "kimi", at(6)),
            post_from("p_other", "alice", at(5)),
        ]));
        let backend = Arc::new(FakeBackend::saying("observing"));

        let mut engine = engine_with(cfg, Arc::clone(&protocol), backend);
        engine.run_cycle().await;

        let liked = protocol.liked.lock().unwrap();
        assert_eq!(liked.as_slice(), ["p_other"]);
    }

    #[tokio::test]
    async fn test_ensure_credential_requests_when_empty() {
        let mut cfg = config();
        cfg.credential = String::new();
        let protocol = Arc::new(FakeProtocol::default());
        let backend = Arc::new(FakeBackend::saying("x"));

        let mut engine = engine_with(cfg, protocol, backend);
        engine.ensure_credential().await.unwrap();
        assert_eq!(engine.identity().credential, "granted_token");
    }

    #[tokio::test]
    async fn test_ensure_credential_failure_is_fatal() {
        let mut cfg = config();
        cfg.credential = String::new();
        let protocol = Arc::new(FakeProtocol::default());
        *protocol.token.lock().unwrap() =
            Some(Err(ProtocolError::InvalidInput("ai_name missing".into())));
        let backend = Arc::new(FakeBackend::saying("x"));

        let mut engine = engine_with(cfg, protocol, backend);
        assert!(engine.ensure_credential().await.is_err());
    }

    #[test]
    fn test_jittered_delay_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let m = jittered_minutes(60, 5, 5, &mut rng);
            assert!((55..=65).contains(&m), "{m} out of bounds");
        }
    }

    #[test]
    fn test_jitter_floor_prevents_busy_looping() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let m = jittered_minutes(4, 5, 5, &mut rng);
            assert!((5..=9).contains(&m), "{m} out of bounds");
        }
        // Degenerate configuration still rests at the floor.
        assert_eq!(jittered_minutes(3, 0, 5, &mut rng), 5);
    }

    #[test]
    fn test_select_mention_prefers_latest_qualifying() {
        let comments = vec![
            comment_from("c1", "alice", "Kimi early", at(1)),
            comment_from("c2", "kimi", "Kimi self", at(9)),
            comment_from("c3", "bob", "no keyword here", at(8)),
            comment_from("c4", "carol", "kimi latest", at(7)),
        ];
        let picked = select_mention("kimi", &["Kimi".into()], comments).unwrap();
        assert_eq!(picked.id, "c4");
    }
}
