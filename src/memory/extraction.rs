//! Fact extraction (§4.8 write path): ask the model what's worth
//! remembering about a user turn, then upsert/supersede/decay facts.

use crate::error::Result;
use crate::message::ChatMessage;
use crate::request::{ChatRequest, Provider};

use super::{EmbeddingProvider, ExtractedFact, MemoryStore};

/// Cosine-similarity threshold above which an existing fact is considered
/// superseded by a newly extracted one and is deleted.
pub const SUPERSEDES_THRESHOLD: f64 = 0.80;

/// Below this length a user message is never worth extracting facts from.
const MIN_EXTRACTABLE_CHARS: usize = 10;

/// Lowercase greetings/acks that are never worth extracting facts from,
/// regardless of length.
const TRIVIAL_MESSAGES: &[&str] = &["hi", "hello", "hey", "ok", "okay", "thanks", "thank you", "yes", "no", "sure"];

const EXTRACTION_SYSTEM_PROMPT: &str = r#"Extract durable facts about the user from their message, if any.
Respond with a JSON array of objects: [{"fact": "...", "category": "...", "supersedes": "..." }].
"supersedes" is optional: include it only when this fact replaces an earlier one you can describe.
If there is nothing worth remembering, respond with [].
Respond with the JSON array only, no other text."#;

fn is_trivial(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.chars().count() < MIN_EXTRACTABLE_CHARS || TRIVIAL_MESSAGES.contains(&trimmed.to_lowercase().as_str())
}

/// Pull the outermost `[`...`]` substring out of `text`, tolerating
/// markdown-fenced model output (```json [...] ```).
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn parse_facts(text: &str) -> Vec<ExtractedFact> {
    let Some(array) = extract_json_array(text) else {
        return Vec::new();
    };
    serde_json::from_str(array).unwrap_or_default()
}

/// Run the full extraction pipeline for one user turn: skip trivial
/// messages, ask `provider` for candidate facts, resolve `supersedes`
/// against existing facts, and batch-embed + upsert the new ones.
pub async fn extract_and_store(
    provider: &dyn Provider,
    memory_store: &dyn MemoryStore,
    embedding: &dyn EmbeddingProvider,
    user_text: &str,
) -> Result<()> {
    if is_trivial(user_text) {
        return Ok(());
    }

    let request = ChatRequest::new(vec![
        ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
        ChatMessage::user(user_text),
    ]);
    let response = provider.chat(&request).await?;
    let facts = parse_facts(&response.text);
    if facts.is_empty() {
        maybe_decay(memory_store).await?;
        return Ok(());
    }

    for fact in &facts {
        if let Some(supersedes) = &fact.supersedes {
            let vectors = embedding.embed(std::slice::from_ref(supersedes)).await?;
            let Some(query) = vectors.into_iter().next() else {
                continue;
            };
            let matches = memory_store.search_facts(&query, 5).await?;
            for hit in matches.into_iter().filter(|m| m.score >= SUPERSEDES_THRESHOLD) {
                memory_store.delete_fact(&hit.id).await?;
            }
        }
    }

    let texts: Vec<String> = facts.iter().map(|f| f.fact.clone()).collect();
    let vectors = embedding.embed(&texts).await?;
    for (fact, vector) in facts.iter().zip(vectors) {
        memory_store.upsert_fact(&fact.fact, &fact.category, &vector).await?;
    }

    maybe_decay(memory_store).await
}

async fn maybe_decay(memory_store: &dyn MemoryStore) -> Result<()> {
    if fastrand::f64() < 0.05 {
        memory_store.decay_old_facts().await?;
    }
    Ok(())
}
