// src/services/http.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::services::{
    Embedder, Labeler, SentimentClassifier, ServiceError, Titler, TopicFit, TopicModeler,
};
use crate::topics::TopicModelError;
use crate::utils::env::env_or;

#[derive(Debug, Clone)]
pub struct ModelServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ModelServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
        }
    }
}

impl ModelServiceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_or("MODEL_SERVICE_URL", defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: env_or("MODEL_SERVICE_TIMEOUT_SECS", defaults.timeout_secs),
        }
    }

    pub fn log_config(&self) {
        info!("🤖 Model service: {} (timeout {}s)", self.base_url, self.timeout_secs);
    }
}

#[derive(Serialize)]
struct TextsRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct TopicsRequest<'a> {
    sentences: &'a [String],
}

#[derive(Deserialize)]
struct TopicsResponse {
    topics: Vec<i64>,
    probabilities: Vec<f64>,
    /// Keyed by topic id rendered as a string, as JSON object keys must be.
    #[serde(default)]
    terms: HashMap<String, Vec<String>>,
}

#[derive(Serialize)]
struct LabelRequest<'a> {
    terms: &'a [String],
}

#[derive(Deserialize)]
struct LabelResponse {
    label: String,
}

#[derive(Serialize)]
struct SentimentRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct SentimentResponse {
    label: String,
}

#[derive(Serialize)]
struct TitleRequest<'a> {
    paragraph: &'a str,
}

#[derive(Deserialize)]
struct TitleResponse {
    title: String,
}

/// Client for a JSON model server exposing `/embed`, `/topics`, `/label`,
/// `/sentiment` and `/title`.
pub struct HttpModelClient {
    client: Client,
    base_url: String,
}

impl HttpModelClient {
    pub fn new(config: &ModelServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build model service HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<R>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("{}: {}", path, e)))
    }
}

/// Converts the wire form of topic terms, dropping keys that are not topic ids.
fn parse_topic_terms(raw: HashMap<String, Vec<String>>) -> HashMap<i64, Vec<String>> {
    raw.into_iter()
        .filter_map(|(key, terms)| key.trim().parse::<i64>().ok().map(|id| (id, terms)))
        .collect()
}

#[async_trait]
impl Embedder for HttpModelClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response: EmbedResponse = self.post("/embed", &TextsRequest { texts }).await?;
        Ok(response.embeddings)
    }
}

#[async_trait]
impl TopicModeler for HttpModelClient {
    async fn fit_topics(&self, sentences: &[String]) -> Result<TopicFit, TopicModelError> {
        match self
            .post::<_, TopicsResponse>("/topics", &TopicsRequest { sentences })
            .await
        {
            Ok(response) => Ok(TopicFit {
                topics: response.topics,
                probabilities: response.probabilities,
                terms: parse_topic_terms(response.terms),
            }),
            // The model server answers 422 when it cannot find enough topics.
            Err(ServiceError::Status { status, .. })
                if status == StatusCode::UNPROCESSABLE_ENTITY.as_u16() =>
            {
                Err(TopicModelError::TooFewTopics)
            }
            Err(e) => Err(TopicModelError::ModelFailure(e.to_string())),
        }
    }
}

#[async_trait]
impl Labeler for HttpModelClient {
    async fn label(&self, terms: &[String]) -> Result<String, ServiceError> {
        let response: LabelResponse = self.post("/label", &LabelRequest { terms }).await?;
        Ok(response.label.trim().to_string())
    }
}

#[async_trait]
impl SentimentClassifier for HttpModelClient {
    async fn classify_sentiment(&self, text: &str) -> Result<String, ServiceError> {
        let response: SentimentResponse =
            self.post("/sentiment", &SentimentRequest { text }).await?;
        Ok(response.label)
    }
}

#[async_trait]
impl Titler for HttpModelClient {
    async fn title(&self, summary: &str) -> Result<String, ServiceError> {
        let response: TitleResponse = self
            .post("/title", &TitleRequest { paragraph: summary })
            .await?;
        let title = response.title.trim();
        if title.is_empty() {
            return Err(ServiceError::InvalidResponse("/title: empty title".to_string()));
        }
        Ok(title.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_from_env() {
        env::set_var("MODEL_SERVICE_URL", "http://models:9000/");
        env::set_var("MODEL_SERVICE_TIMEOUT_SECS", "15");
        let config = ModelServiceConfig::from_env();
        assert_eq!(config.base_url, "http://models:9000");
        assert_eq!(config.timeout_secs, 15);
        env::remove_var("MODEL_SERVICE_URL");
        env::remove_var("MODEL_SERVICE_TIMEOUT_SECS");
    }

    #[test]
    fn test_topics_response_parsing() {
        let raw = r#"{"topics":[0,-1,1],"probabilities":[0.9,0.0,0.7],
                      "terms":{"0":["water","river"],"1":["jobs"],"x":["junk"]}}"#;
        let response: TopicsResponse = serde_json::from_str(raw).unwrap();
        let terms = parse_topic_terms(response.terms);
        assert_eq!(response.topics, vec![0, -1, 1]);
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[&0], vec!["water".to_string(), "river".to_string()]);
    }

    #[test]
    fn test_title_wire_format() {
        let request = serde_json::to_value(TitleRequest { paragraph: "The agency proposes..." }).unwrap();
        assert_eq!(request, serde_json::json!({"paragraph": "The agency proposes..."}));
        let response: TitleResponse = serde_json::from_str(r#"{"title":" Cleaner Rivers "}"#).unwrap();
        assert_eq!(response.title, " Cleaner Rivers ");
    }
}
