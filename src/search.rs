//! Site-wide search over the public collections
//!
//! Scoring is plain substring matching on lowercased text:
//! the whole query found in a title scores 10, each token in a title 5,
//! each token in tags 3 and each token in the body 1.

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::AppResult;
use crate::models::{Record, SearchDocument};
use crate::store::{Collection, Store};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 50;
const SNIPPET_CHARS: usize = 160;
const MIN_TOKEN_CHARS: usize = 2;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    /// Restrict results to one collection, e.g. `projects`
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub query: String,
    pub total: usize,
    pub results: Vec<SearchHit>,
}

pub struct SearchService;

impl SearchService {
    pub async fn search(store: &Store, query: &SearchQuery) -> AppResult<SearchResults> {
        let phrase = query.q.trim().to_lowercase();
        let tokens = tokenize(&phrase);
        if tokens.is_empty() {
            return Ok(SearchResults {
                query: query.q.trim().to_string(),
                total: 0,
                results: Vec::new(),
            });
        }

        let wanted = query.kind.as_deref().map(str::trim).filter(|k| !k.is_empty());
        let mut hits = Vec::new();
        collect(&store.projects, wanted, &phrase, &tokens, &mut hits).await;
        collect(&store.case_studies, wanted, &phrase, &tokens, &mut hits).await;
        collect(&store.skills, wanted, &phrase, &tokens, &mut hits).await;
        collect(&store.testimonials, wanted, &phrase, &tokens, &mut hits).await;
        collect(&store.timeline, wanted, &phrase, &tokens, &mut hits).await;

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        });
        let total = hits.len();
        hits.truncate(clamp_limit(query.limit));

        Ok(SearchResults {
            query: query.q.trim().to_string(),
            total,
            results: hits,
        })
    }
}

async fn collect<T: Record>(
    collection: &Collection<T>,
    wanted: Option<&str>,
    phrase: &str,
    tokens: &[String],
    hits: &mut Vec<SearchHit>,
) {
    if wanted.is_some_and(|k| k != T::COLLECTION) {
        return;
    }

    for record in collection.list().await {
        let Some(doc) = record.search_document() else {
            continue;
        };
        let score = score(&doc, phrase, tokens);
        if score == 0 {
            continue;
        }
        hits.push(SearchHit {
            kind: T::COLLECTION.to_string(),
            id: record.id().to_string(),
            snippet: snippet(&doc.body, tokens),
            title: doc.title,
            score,
        });
    }
}

fn clamp_limit(limit: Option<usize>) -> usize {
    match limit {
        Some(0) | None => DEFAULT_LIMIT,
        Some(n) => n.min(MAX_LIMIT),
    }
}

/// Lowercase alphanumeric runs of at least two characters
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

pub fn score(doc: &SearchDocument, phrase: &str, tokens: &[String]) -> u32 {
    let title = doc.title.to_lowercase();
    let tags = doc.tags.join(" ").to_lowercase();
    let body = doc.body.to_lowercase();

    let mut score = 0;
    if !phrase.is_empty() && title.contains(phrase) {
        score += 10;
    }
    for token in tokens {
        if title.contains(token.as_str()) {
            score += 5;
        }
        if tags.contains(token.as_str()) {
            score += 3;
        }
        if body.contains(token.as_str()) {
            score += 1;
        }
    }
    score
}

/// About `SNIPPET_CHARS` characters of `body` around the first token match
pub fn snippet(body: &str, tokens: &[String]) -> String {
    let chars: Vec<char> = body.chars().collect();
    if chars.len() <= SNIPPET_CHARS {
        return body.trim().to_string();
    }

    let lower: Vec<char> = body.to_lowercase().chars().collect();
    // Lowercasing can change lengths for some scripts; fall back to the start
    let first_match = if lower.len() == chars.len() {
        let lower: String = lower.iter().collect();
        tokens
            .iter()
            .filter_map(|t| lower.find(t.as_str()))
            .min()
            .map(|byte| lower[..byte].chars().count())
    } else {
        None
    };

    let center = first_match.unwrap_or(0);
    let start = center.saturating_sub(SNIPPET_CHARS / 4);
    let end = (start + SNIPPET_CHARS).min(chars.len());
    let start = end.saturating_sub(SNIPPET_CHARS);

    let mut out: String = chars[start..end].iter().collect();
    out = out.trim().to_string();
    if start > 0 {
        out.insert(0, '…');
    }
    if end < chars.len() {
        out.push('…');
    }
    out
}

pub async fn handle_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<SearchResults>> {
    Ok(Json(SearchService::search(&state.store, &query).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(title: &str, tags: &[&str], body: &str) -> SearchDocument {
        SearchDocument {
            title: title.to_string(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Rust, a WEB-app!"), vec!["rust", "web", "app"]);
        assert!(tokenize("a b c").is_empty());
        assert!(tokenize("   ").is_empty());
        assert_eq!(tokenize("rust web Rust"), vec!["rust", "web"]);
    }

    #[test]
    fn test_repeated_query_terms_score_once() {
        let d = doc("Rust Web Server", &[], "");
        assert_eq!(
            score(&d, "", &tokenize("rust web rust")),
            score(&d, "", &tokenize("rust web"))
        );
    }

    #[test]
    fn test_score_weights() {
        let d = doc("Rust Web Server", &["rust", "axum"], "A server written in Rust");
        let tokens = tokenize("rust server");
        // phrase miss, rust: 5+3+1, server: 5+0+1
        assert_eq!(score(&d, "rust server", &tokens), 15);
        // phrase hit adds 10
        assert_eq!(score(&d, "web server", &tokenize("web server")), 10 + 5 + 5 + 1);
        assert_eq!(score(&d, "python", &tokenize("python")), 0);
    }

    #[test]
    fn test_snippet_centers_on_match() {
        let body = format!("{} needle {}", "x".repeat(300), "y".repeat(300));
        let s = snippet(&body, &["needle".to_string()]);
        assert!(s.contains("needle"));
        assert!(s.starts_with('…') && s.ends_with('…'));
        assert!(s.chars().count() <= SNIPPET_CHARS + 2);

        assert_eq!(snippet(" short ", &["x".to_string()]), "short");
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(3)), 3);
        assert_eq!(clamp_limit(Some(500)), MAX_LIMIT);
    }

    #[tokio::test]
    async fn test_search_store() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), None).await.unwrap();
        store
            .projects
            .insert(json!({"title": "Rust Portfolio", "technologies": ["Rust"]}))
            .await
            .unwrap();
        store
            .skills
            .insert(json!({"name": "Rust", "category": "Languages"}))
            .await
            .unwrap();
        store
            .projects
            .insert(json!({"title": "Garden Planner", "description": "Python scripts"}))
            .await
            .unwrap();
        store
            .messages
            .insert(json!({"name": "Rust fan", "email": "a@b.co", "message": "rust rust"}))
            .await
            .unwrap();

        let results = SearchService::search(
            &store,
            &SearchQuery {
                q: "rust".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(results.total, 2);
        assert!(results.results.iter().all(|h| h.kind != "messages"));

        let only_skills = SearchService::search(
            &store,
            &SearchQuery {
                q: "rust".into(),
                kind: Some("skills".into()),
                limit: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(only_skills.total, 1);
        assert_eq!(only_skills.results[0].kind, "skills");

        let empty = SearchService::search(&store, &SearchQuery::default()).await.unwrap();
        assert!(empty.results.is_empty());
    }
}
