//! ESCO search client. A pure read-through to the public ESCO API — no
//! caching, no local ranking beyond the order the endpoint returns.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{CompetencyFramework, FrameworkError, TaxonomyCandidate};
use crate::models::skill::SkillSystem;

const REQUEST_TIMEOUT_SECS: u64 = 30;

// Wire shape of GET {base}/search?full=true responses.

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_embedded")]
    embedded: Embedded,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    results: Vec<EscoResult>,
}

#[derive(Debug, Deserialize)]
struct EscoResult {
    uri: String,
    title: String,
    #[serde(rename = "referenceLanguage", default)]
    reference_language: Vec<String>,
    #[serde(rename = "preferredLabel", default)]
    preferred_label: HashMap<String, String>,
    #[serde(default)]
    description: HashMap<String, DescriptionLiteral>,
    #[serde(rename = "_links", default)]
    links: Value,
}

#[derive(Debug, Deserialize)]
struct DescriptionLiteral {
    literal: String,
}

impl From<EscoResult> for TaxonomyCandidate {
    fn from(result: EscoResult) -> Self {
        TaxonomyCandidate {
            reference_language: result
                .reference_language
                .into_iter()
                .next()
                .unwrap_or_default(),
            description: result
                .description
                .into_iter()
                .map(|(lang, d)| (lang, d.literal))
                .collect(),
            uri: result.uri,
            title: result.title,
            preferred_label: result.preferred_label,
            links: result.links,
        }
    }
}

/// Client for the ESCO taxonomy search endpoint.
#[derive(Clone)]
pub struct EscoClient {
    client: Client,
    base_url: String,
}

impl EscoClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CompetencyFramework for EscoClient {
    async fn search(
        &self,
        query: &str,
        limit: u32,
        language: &str,
    ) -> Result<Vec<TaxonomyCandidate>, FrameworkError> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("text", query),
                ("language", language),
                ("type", "skill"),
                ("limit", &limit.to_string()),
                ("full", "true"),
            ])
            .send()
            .await
            .map_err(|e| FrameworkError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FrameworkError::Unavailable(format!(
                "search returned status {status}"
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| FrameworkError::Decode(e.to_string()))?;

        let candidates: Vec<TaxonomyCandidate> = body
            .embedded
            .results
            .into_iter()
            .map(TaxonomyCandidate::from)
            .collect();

        debug!("ESCO search for {query:?} returned {} candidates", candidates.len());

        Ok(candidates)
    }

    fn system(&self) -> SkillSystem {
        SkillSystem::Esco
    }
}
