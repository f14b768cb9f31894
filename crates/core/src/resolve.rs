use crate::error::CollaboratorError;
use crate::models::ResolvedEntity;
use crate::traits::EntityResolver;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// One row of the SEC company/ticker directory file.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryEntry {
    pub ticker: String,
    pub title: String,
    #[serde(default)]
    pub cik_str: Option<u64>,
}

/// Local company-name/ticker resolver backed by the SEC's
/// `company_tickers.json` directory. Matching is heuristic: an explicit
/// ticker symbol in the query wins, then exact or substring name matches,
/// then the entry with the highest name-token overlap.
pub struct TickerDirectory {
    entries: Vec<DirectoryEntry>,
}

impl TickerDirectory {
    pub fn from_entries(entries: Vec<DirectoryEntry>) -> Self {
        Self { entries }
    }

    /// Loads the directory from disk. The file maps arbitrary string keys to
    /// entries, the way the SEC publishes it.
    pub fn load(path: &Path) -> Result<Self, CollaboratorError> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            CollaboratorError::BackendResponse {
                backend: "ticker-directory".to_string(),
                details: format!("{}: {error}", path.display()),
            }
        })?;
        let keyed: HashMap<String, DirectoryEntry> = serde_json::from_str(&raw)?;
        let mut entries: Vec<DirectoryEntry> = keyed.into_values().collect();
        entries.sort_by(|left, right| left.ticker.cmp(&right.ticker));
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entity_for(&self, entry: &DirectoryEntry) -> ResolvedEntity {
        ResolvedEntity {
            ticker: entry.ticker.to_uppercase(),
            canonical_name: entry.title.clone(),
            cik: entry.cik_str.map(|cik| format!("{cik:010}")),
        }
    }

    fn match_ticker_symbol(&self, query: &str) -> Option<&DirectoryEntry> {
        let symbols: Vec<&str> = query
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '.')
            .filter(|token| {
                token.len() >= 2
                    && token
                        .chars()
                        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.')
            })
            .collect();

        self.entries.iter().find(|entry| {
            symbols
                .iter()
                .any(|symbol| entry.ticker.eq_ignore_ascii_case(symbol))
        })
    }

    fn match_company_name(&self, query: &str) -> Option<&DirectoryEntry> {
        let query_tokens = name_tokens(query);
        if query_tokens.is_empty() {
            return None;
        }

        let mut best: Option<&DirectoryEntry> = None;
        let mut best_overlap = 0usize;
        for entry in &self.entries {
            let title = normalize_name(&entry.title);
            let title_tokens = name_tokens(&title);
            if title_tokens.is_empty() {
                continue;
            }

            // Every meaningful word of the company name present in the query
            // is an exact-enough match.
            if title_tokens
                .iter()
                .all(|token| query_tokens.contains(token))
            {
                return Some(entry);
            }

            let overlap = title_tokens
                .iter()
                .filter(|token| query_tokens.contains(*token))
                .count();
            if overlap > best_overlap {
                best_overlap = overlap;
                best = Some(entry);
            }
        }
        best
    }
}

#[async_trait]
impl EntityResolver for TickerDirectory {
    async fn resolve(&self, query: &str) -> Result<Option<ResolvedEntity>, CollaboratorError> {
        if let Some(entry) = self.match_ticker_symbol(query) {
            debug!(ticker = %entry.ticker, "resolved by ticker symbol");
            return Ok(Some(self.entity_for(entry)));
        }
        Ok(self.match_company_name(query).map(|entry| {
            debug!(ticker = %entry.ticker, title = %entry.title, "resolved by name overlap");
            self.entity_for(entry)
        }))
    }
}

fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .replace("inc.", "")
        .replace(", inc", "")
        .replace("corp.", "")
        .trim()
        .to_string()
}

/// Lowercased words worth matching on; question scaffolding and legal-form
/// suffixes are ignored.
fn name_tokens(text: &str) -> Vec<String> {
    const IGNORED: [&str; 22] = [
        "the", "a", "an", "of", "for", "and", "what", "how", "is", "are", "was", "about", "tell",
        "me", "does", "do", "company", "inc", "corp", "ltd", "co", "plc",
    ];
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| {
            !token.is_empty() && (token.len() > 2 || token.chars().all(|c| c.is_ascii_digit()))
        })
        .filter(|token| !IGNORED.contains(token))
        .map(str::to_string)
        .collect()
}
