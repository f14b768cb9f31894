use crate::error::CollaboratorError;
use crate::models::{FilingRef, ResolvedEntity};
use crate::traits::{FilingLocator, SectionExtractor};
use async_trait::async_trait;
use chrono::DateTime;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};
use url::Url;

const PRIMARY_FORM_TYPE: &str = "10-K";
const USER_AGENT: &str = "filing-insight 0.1";

/// Client for a sec-api.io-style filing service: a query endpoint that lists
/// filings and an `/extractor` endpoint that returns one section as text.
pub struct FilingApiClient {
    base_url: Url,
    api_key: Option<String>,
    client: Client,
    control_chars: Regex,
    blank_runs: Regex,
}

impl FilingApiClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, CollaboratorError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            api_key,
            client: Client::new(),
            control_chars: Regex::new(r"[^\x20-\x7E\n\r\t]")?,
            blank_runs: Regex::new(r"\n{3,}")?,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("User-Agent", USER_AGENT);
        match &self.api_key {
            Some(key) => request.header("Authorization", key),
            None => request,
        }
    }

    fn extractor_url(&self) -> Result<Url, CollaboratorError> {
        Ok(self.base_url.join("extractor")?)
    }

    /// Strips non-printable bytes and collapses blank-line runs left behind
    /// by the extraction service.
    fn clean_section_text(&self, raw: &str) -> String {
        let printable = self.control_chars.replace_all(raw, "");
        self.blank_runs
            .replace_all(&printable, "\n\n")
            .trim()
            .to_string()
    }
}

#[async_trait]
impl FilingLocator for FilingApiClient {
    async fn latest_filing(
        &self,
        entity: &ResolvedEntity,
    ) -> Result<Option<FilingRef>, CollaboratorError> {
        let search = match &entity.cik {
            Some(cik) => format!("formType:\"{PRIMARY_FORM_TYPE}\" AND cik:{}", cik.trim_start_matches('0')),
            None => format!(
                "formType:\"{PRIMARY_FORM_TYPE}\" AND ticker:{}",
                entity.ticker.to_uppercase()
            ),
        };
        let payload = json!({
            "query": search,
            "from": "0",
            "size": "10",
            "sort": [{ "filedAt": { "order": "desc" } }],
        });

        let response = self
            .authorized(self.client.post(self.base_url.clone()))
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CollaboratorError::BackendResponse {
                backend: "filing-api".to_string(),
                details: response.status().to_string(),
            });
        }

        let body: Value = response.json().await?;
        let filing = pick_primary_filing(&body);
        match &filing {
            Some(filing) => info!(period = %filing.period, ticker = %entity.ticker, "located filing"),
            None => warn!(ticker = %entity.ticker, "no primary filing in response"),
        }
        Ok(filing)
    }
}

#[async_trait]
impl SectionExtractor for FilingApiClient {
    async fn extract(
        &self,
        filing_url: &str,
        section: &str,
    ) -> Result<Option<String>, CollaboratorError> {
        let response = self
            .authorized(self.client.get(self.extractor_url()?))
            .query(&[("url", filing_url), ("item", section), ("type", "text")])
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(section, status = %response.status(), "section extraction refused");
            return Ok(None);
        }

        let cleaned = self.clean_section_text(&response.text().await?);
        if cleaned.is_empty() {
            return Ok(None);
        }
        Ok(Some(cleaned))
    }
}

/// Picks the most recent primary filing from a query response, skipping
/// amended variants (`10-K/A`) and entries without a filing URL.
fn pick_primary_filing(body: &Value) -> Option<FilingRef> {
    let filings = body.pointer("/filings").and_then(Value::as_array)?;

    for filing in filings {
        let form_type = filing
            .pointer("/formType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if form_type != PRIMARY_FORM_TYPE {
            continue;
        }

        let url = filing
            .pointer("/linkToFilingDetails")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if url.is_empty() {
            continue;
        }

        let filed_at = filing
            .pointer("/filedAt")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let Some(period) = filing_period(filed_at) else {
            continue;
        };

        return Some(FilingRef {
            url: url.to_string(),
            period,
        });
    }
    None
}

/// Filing period is the year the filing was submitted.
fn filing_period(filed_at: &str) -> Option<String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(filed_at) {
        return Some(timestamp.format("%Y").to_string());
    }
    let year: String = filed_at.chars().take(4).collect();
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        Some(year)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amendments_and_urlless_entries_are_skipped() {
        let body = json!({
            "filings": [
                {
                    "formType": "10-K/A",
                    "filedAt": "2025-02-10T09:00:00-05:00",
                    "linkToFilingDetails": "https://filings.example/amended"
                },
                {
                    "formType": "10-K",
                    "filedAt": "2024-10-30T16:30:21-04:00",
                    "linkToFilingDetails": ""
                },
                {
                    "formType": "10-K",
                    "filedAt": "2023-10-27T16:01:14-04:00",
                    "linkToFilingDetails": "https://filings.example/primary"
                }
            ]
        });

        let filing = pick_primary_filing(&body).expect("primary filing expected");
        assert_eq!(filing.url, "https://filings.example/primary");
        assert_eq!(filing.period, "2023");
    }

    #[test]
    fn empty_or_malformed_responses_yield_none() {
        assert!(pick_primary_filing(&json!({})).is_none());
        assert!(pick_primary_filing(&json!({ "filings": [] })).is_none());
        assert!(pick_primary_filing(&json!({
            "filings": [{ "formType": "10-K", "linkToFilingDetails": "https://x", "filedAt": "soon" }]
        }))
        .is_none());
    }

    #[test]
    fn filing_period_reads_the_year() {
        assert_eq!(
            filing_period("2024-10-30T16:30:21-04:00").as_deref(),
            Some("2024")
        );
        assert_eq!(filing_period("2022-01-05").as_deref(), Some("2022"));
        assert_eq!(filing_period("unknown"), None);
    }

    #[test]
    fn section_text_is_cleaned() {
        let client = FilingApiClient::new("https://api.example", None).unwrap();
        let raw = "Item 1A.\u{00a0}Risk Factors\n\n\n\n\u{feff}Supply risk.\t End.  ";
        assert_eq!(
            client.clean_section_text(raw),
            "Item 1A.Risk Factors\n\nSupply risk.\t End."
        );
    }
}
