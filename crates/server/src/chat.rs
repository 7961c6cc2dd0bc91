//! Chat glue: a summary of the user's taste for a conversational model,
//! a session that keeps the conversation, and extraction of the movies the
//! model suggests.
//!
//! No model client ships here. Anything implementing `LanguageModel` can
//! be plugged into a `ChatSession`.

use std::collections::HashMap;
use std::fmt::Write;
use std::future::Future;

use anyhow::Result;
use data_loader::{CandidateMovie, HistoryEntry};
use serde::Serialize;
use sources::{MetadataProvider, UserProfile, lookup_title};
use tracing::{debug, warn};

const TOP_RATED: usize = 5;
const TOP_GENRES: usize = 3;
const MAX_SUGGESTIONS: usize = 5;

const SYSTEM_PROMPT: &str = "You are a movie recommendation assistant. \
When you suggest movies, list them one per line as `Title (Year)` followed by a short reason.";

/// Summary of a user's collection handed to the model
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ChatContext {
    pub collection_size: usize,
    /// `Title (r/10)`, best first
    pub top_rated: Vec<String>,
    /// Most frequent genres in the collection
    pub top_genres: Vec<String>,
    pub avg_rating: Option<f32>,
    /// Movies per month, when the profile knows it
    pub viewing_frequency: Option<f32>,
}

impl ChatContext {
    pub fn build(history: &[HistoryEntry], profile: Option<&UserProfile>) -> Self {
        let mut rated: Vec<(&HistoryEntry, f32)> = history
            .iter()
            .filter_map(|e| e.rating.map(|r| (e, r)))
            .collect();
        rated.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.title.cmp(&b.0.title)));

        let top_rated = rated
            .iter()
            .take(TOP_RATED)
            .map(|(e, r)| format!("{} ({}/10)", e.title, format_rating(*r)))
            .collect();

        let mut genre_counts: HashMap<&str, usize> = HashMap::new();
        for genre in history.iter().flat_map(|e| &e.genres) {
            *genre_counts.entry(genre.as_str()).or_insert(0) += 1;
        }
        let mut genres: Vec<(&str, usize)> = genre_counts.into_iter().collect();
        genres.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let top_genres = genres
            .into_iter()
            .take(TOP_GENRES)
            .map(|(g, _)| g.to_string())
            .collect();

        let avg_rating = match profile {
            Some(profile) => Some(profile.avg_rating),
            None if !rated.is_empty() => {
                Some(rated.iter().map(|(_, r)| r).sum::<f32>() / rated.len() as f32)
            }
            None => None,
        };

        Self {
            collection_size: history.len(),
            top_rated,
            top_genres,
            avg_rating,
            viewing_frequency: profile.map(|p| p.viewing_frequency).filter(|f| *f > 0.0),
        }
    }

    /// Plain-text rendering injected as a system message
    pub fn render(&self) -> String {
        if self.collection_size == 0 {
            return "The user has not added any movies yet.".to_string();
        }

        let mut out = String::from("User's movie profile:\n");
        let _ = writeln!(out, "- Movies watched: {}", self.collection_size);
        if !self.top_rated.is_empty() {
            let _ = writeln!(out, "- Favorite movies: {}", self.top_rated.join(", "));
        }
        if !self.top_genres.is_empty() {
            let _ = writeln!(out, "- Favorite genres: {}", self.top_genres.join(", "));
        }
        if let Some(avg) = self.avg_rating {
            let _ = writeln!(out, "- Average rating: {:.1}/10", avg);
        }
        if let Some(freq) = self.viewing_frequency {
            let _ = writeln!(out, "- Watches about {:.1} movies per month", freq);
        }
        out
    }
}

fn format_rating(rating: f32) -> String {
    if rating.fract() == 0.0 {
        format!("{:.0}", rating)
    } else {
        format!("{:.1}", rating)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A conversational model
pub trait LanguageModel: Send + Sync {
    /// Reply to the conversation so far
    fn complete(&self, messages: &[ChatMessage]) -> impl Future<Output = Result<String>> + Send;
}

/// One user's conversation with a model
pub struct ChatSession<M> {
    model: M,
    messages: Vec<ChatMessage>,
    /// Last context injected, so it is only re-sent when it changes
    injected: Option<String>,
}

impl<M: LanguageModel> ChatSession<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            messages: vec![ChatMessage::system(SYSTEM_PROMPT)],
            injected: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Send a user message and record the reply.
    ///
    /// On failure the conversation is left as it was.
    pub async fn send(&mut self, context: &ChatContext, text: &str) -> Result<String> {
        let before = self.messages.len();
        let rendered = context.render();
        let context_changed = self.injected.as_deref() != Some(rendered.as_str());
        if context_changed {
            debug!("Injecting updated chat context");
            self.messages.push(ChatMessage::system(rendered.clone()));
        }
        self.messages.push(ChatMessage::user(text));

        match self.model.complete(&self.messages).await {
            Ok(reply) => {
                if context_changed {
                    self.injected = Some(rendered);
                }
                self.messages.push(ChatMessage::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                self.messages.truncate(before);
                Err(e)
            }
        }
    }

    /// Start over, keeping only the system prompt
    pub fn reset(&mut self) {
        self.messages.truncate(1);
        self.injected = None;
    }
}

/// A movie named in a model reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub title: String,
    pub year: u16,
}

/// Pull up to five `Title (Year)` suggestions from numbered or bulleted
/// lines of a reply
pub fn extract_suggestions(text: &str) -> Vec<Suggestion> {
    text.lines()
        .filter_map(|line| strip_list_marker(line.trim()))
        .filter_map(parse_title_year)
        .take(MAX_SUGGESTIONS)
        .collect()
}

/// Look every suggestion up with the provider, keeping the best match for
/// title and year. Suggestions the provider cannot place are skipped.
pub fn resolve_suggestions<P>(provider: &P, suggestions: &[Suggestion]) -> Vec<CandidateMovie>
where
    P: MetadataProvider + ?Sized,
{
    suggestions
        .iter()
        .filter_map(|suggestion| {
            match lookup_title(provider, &suggestion.title, Some(suggestion.year)) {
                Ok(found) => {
                    if found.is_none() {
                        debug!("No match for suggestion {} ({})", suggestion.title, suggestion.year);
                    }
                    found
                }
                Err(e) => {
                    warn!("Lookup of suggestion {} failed: {}", suggestion.title, e);
                    None
                }
            }
        })
        .collect()
}

/// The line without its `1.`, `2)`, `-`, `*` or `•` marker; `None` when the
/// line is not a list item
fn strip_list_marker(line: &str) -> Option<&str> {
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return Some(rest.trim_start());
        }
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix('.')
        .or_else(|| rest.strip_prefix(')'))
        .map(str::trim_start)
}

fn parse_title_year(item: &str) -> Option<Suggestion> {
    let bytes = item.as_bytes();
    let open = (0..bytes.len()).find(|&i| {
        bytes[i] == b'('
            && bytes.len() >= i + 6
            && bytes[i + 1..i + 5].iter().all(u8::is_ascii_digit)
            && bytes[i + 5] == b')'
    })?;

    let year: u16 = item[open + 1..open + 5].parse().ok()?;
    let title = item[..open]
        .trim()
        .trim_matches(|c: char| c == '*' || c == '"' || c == '_')
        .trim();
    if title.is_empty() {
        return None;
    }
    Some(Suggestion {
        title: title.to_string(),
        year,
    })
}
