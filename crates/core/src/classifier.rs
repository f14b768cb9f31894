use crate::error::CollaboratorError;
use crate::models::Intent;
use crate::traits::{CompletionClient, IntentClassifier};
use async_trait::async_trait;
use std::fmt::Write;
use std::sync::Arc;

/// Intent classifier that asks the completion client to pick a destination
/// from the known intent names. An unparseable answer is an error; the
/// orchestrator falls back to its default intent.
pub struct CompletionIntentClassifier {
    completion: Arc<dyn CompletionClient>,
}

impl CompletionIntentClassifier {
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self { completion }
    }

    fn prompt_for(query: &str) -> String {
        let mut destinations = String::new();
        for intent in Intent::ALL {
            let _ = writeln!(destinations, "- {}: good for {}", intent.as_str(), intent.description());
        }
        format!(
            "Select the destination that best fits the question below.\n\
             Destinations:\n{destinations}\n\
             Question: \"{query}\"\n\
             Answer with the destination name only."
        )
    }
}

#[async_trait]
impl IntentClassifier for CompletionIntentClassifier {
    async fn classify(&self, query: &str) -> Result<Intent, CollaboratorError> {
        let answer = self.completion.complete(&Self::prompt_for(query)).await?;
        parse_intent(&answer).ok_or_else(|| CollaboratorError::BackendResponse {
            backend: "classifier".to_string(),
            details: format!("unrecognized destination: {answer}"),
        })
    }
}

/// Accepts an exact destination name, or finds one inside a wordier answer.
fn parse_intent(answer: &str) -> Option<Intent> {
    let normalized = answer.trim().trim_matches('"').to_lowercase();
    if let Some(intent) = Intent::from_name(&normalized) {
        return Some(intent);
    }
    Intent::ALL
        .into_iter()
        .find(|intent| normalized.contains(intent.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedCompletion(&'static str);

    #[async_trait]
    impl CompletionClient for CannedCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn exact_destination_names_classify() {
        let classifier = CompletionIntentClassifier::new(Arc::new(CannedCompletion("risk_analysis")));
        let intent = classifier.classify("what could go wrong?").await.unwrap();
        assert_eq!(intent, Intent::RiskAnalysis);
    }

    #[tokio::test]
    async fn wordy_answers_still_classify() {
        let classifier = CompletionIntentClassifier::new(Arc::new(CannedCompletion(
            "The best destination is \"financial_status\".",
        )));
        let intent = classifier.classify("how profitable is it?").await.unwrap();
        assert_eq!(intent, Intent::FinancialStatus);
    }

    #[tokio::test]
    async fn unrecognized_answers_are_errors() {
        let classifier = CompletionIntentClassifier::new(Arc::new(CannedCompletion("weather_report")));
        let result = classifier.classify("anything").await;
        assert!(result.is_err());
    }

    #[test]
    fn prompt_lists_every_destination() {
        let prompt = CompletionIntentClassifier::prompt_for("how risky is Acme?");
        for intent in Intent::ALL {
            assert!(prompt.contains(intent.as_str()));
        }
    }
}
