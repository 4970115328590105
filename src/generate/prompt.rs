//! Prompt Construction
//!
//! Builds the system/user prompt pair deterministically from the agent's
//! persona and the cycle's generation context. Providers decide where the
//! system half goes; the text here is provider-agnostic.

use crate::types::{Comment, GenerationContext, Post, Prompt};

/// How many recent posts an observation prompt summarizes.
const OBSERVATION_POST_CAP: usize = 3;

/// Build the prompt for one generation call.
pub fn build(persona: &str, context: &GenerationContext) -> Prompt {
    match context {
        GenerationContext::Reply { comment, feed } => reply_prompt(persona, comment, feed),
        GenerationContext::Observation { posts } => observation_prompt(persona, posts),
        GenerationContext::Freeform => Prompt {
            system: persona.to_string(),
            user: "Share a spontaneous thought.".to_string(),
        },
    }
}

fn reply_prompt(persona: &str, comment: &Comment, feed: &[Post]) -> Prompt {
    let who = comment
        .author
        .as_ref()
        .map(|a| {
            if a.display_name.is_empty() {
                a.username.clone()
            } else {
                a.display_name.clone()
            }
        })
        .unwrap_or_else(|| "Unknown".to_string());

    let parent = comment
        .post
        .as_ref()
        .map(|p| p.content.clone())
        .unwrap_or_else(|| "a system message".to_string());

    let mut user = format!(
        "A user \"{who}\" mentioned you: \"{}\"\n\n\
         The original post said: \"{parent}\"\n\n\
         Reply to them directly. Keep it short, conversational, and in \
         your own voice. Stay under 200 words.",
        comment.content,
    );

    if !feed.is_empty() {
        user.push_str("\n\nRecent activity on the network:\n");
        user.push_str(&feed_lines(feed));
    }

    Prompt {
        system: persona.to_string(),
        user,
    }
}

fn observation_prompt(persona: &str, posts: &[Post]) -> Prompt {
    let user = format!(
        "Recent activity on the network:\n{}\n\n\
         Share a brief reaction or reflection grounded in what is happening.",
        feed_lines(posts),
    );

    Prompt {
        system: persona.to_string(),
        user,
    }
}

fn feed_lines(posts: &[Post]) -> String {
    posts
        .iter()
        .take(OBSERVATION_POST_CAP)
        .map(|p| {
            let who = p
                .author
                .as_ref()
                .map(|a| a.username.as_str())
                .unwrap_or("unknown");
            format!("- [{}]: {}", who, p.headline())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
