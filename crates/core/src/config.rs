use crate::models::Intent;
use std::collections::HashMap;
use std::time::Duration;

/// Document type indexed by this engine; part of every namespace key.
pub const ANNUAL_REPORT_DOC_TYPE: &str = "10k";

/// Static intent-to-sections routing. Which filing sections an intent needs
/// is configuration, not something computed per query.
#[derive(Debug, Clone)]
pub struct IntentRoutes {
    sections: HashMap<Intent, Vec<String>>,
    pub default_intent: Intent,
}

impl Default for IntentRoutes {
    fn default() -> Self {
        let mut sections = HashMap::new();
        sections.insert(Intent::FinancialStatus, to_sections(&["7", "8"]));
        sections.insert(Intent::RelationshipGraph, to_sections(&["1", "2"]));
        sections.insert(Intent::RiskAnalysis, to_sections(&["1A"]));
        sections.insert(Intent::GeneralSummary, to_sections(&["1", "7"]));
        Self {
            sections,
            default_intent: Intent::GeneralSummary,
        }
    }
}

impl IntentRoutes {
    pub fn required_sections(&self, intent: Intent) -> &[String] {
        self.sections
            .get(&intent)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn set_sections(&mut self, intent: Intent, sections: Vec<String>) {
        self.sections.insert(intent, sections);
    }
}

fn to_sections(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| (*id).to_string()).collect()
}

/// Knobs for section-filtered nearest-neighbor search. The overfetch factor
/// widens the candidate pool before the section filter is applied; recall is
/// still not guaranteed complete when a section is sparse in the pool.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub overfetch_factor: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { overfetch_factor: 3 }
    }
}

/// Retry-with-backoff policy owned by collaborators that call remote models.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: `base_delay * 2^attempt` for attempt 0, 1, 2, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}
