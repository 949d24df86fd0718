//! Optional free-text enrichment from an external summariser.

use std::{fmt::Write as _, time::Duration};

use async_trait::async_trait;
use bullpen_types::{
    config::InsightConfig,
    matchup::{MatchupComponent, MatchupResult},
    BullpenError, Result,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a baseball analytics expert focusing on sabermetrics.";

#[async_trait]
pub trait InsightProvider: Send + Sync {
    async fn summarize(&self, matchup: &MatchupResult) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

/// Client for any OpenAI-compatible chat-completions endpoint.
pub struct ChatInsightProvider {
    http: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatInsightProvider {
    /// Build from config, reading the key from the configured environment variable.
    pub fn from_config(config: &InsightConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            BullpenError::Configuration(format!(
                "insight api key variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &InsightConfig, api_key: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| {
                BullpenError::Configuration(format!("failed to build insight client: {err}"))
            })?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl InsightProvider for ChatInsightProvider {
    async fn summarize(&self, matchup: &MatchupResult) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt(matchup),
                },
            ],
            max_tokens: 300,
            temperature: 0.7,
        };
        debug!(
            batter_id = matchup.batter_id,
            pitcher_id = matchup.pitcher_id,
            "requesting matchup insight"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| BullpenError::Ops(format!("insight request failed: {err}")))?;
        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, "insight endpoint rejected request");
            return Err(BullpenError::Ops(format!("insight endpoint returned {status}")));
        }
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|err| BullpenError::Ops(format!("unreadable insight response: {err}")))?;
        first_reply(body)
    }
}

fn first_reply(body: ChatResponse) -> Result<String> {
    body.choices
        .into_iter()
        .map(|choice| choice.message.content.trim().to_string())
        .find(|content| !content.is_empty())
        .ok_or_else(|| BullpenError::Ops("insight response had no content".into()))
}

fn provenance(component: &MatchupComponent) -> String {
    format!("{:?}", component.tier)
}

/// User prompt describing the resolved matchup.
pub fn prompt(matchup: &MatchupResult) -> String {
    let d = &matchup.derived;
    let mut text = String::new();
    let _ = writeln!(
        text,
        "Based on the sabermetric data of the current pitcher and batter, please generate matchup insights."
    );
    let _ = writeln!(text);
    let _ = writeln!(
        text,
        "PITCHER {} (data: {})",
        matchup.pitcher_id,
        provenance(&matchup.pitcher_season)
    );
    let _ = writeln!(text, "- FIP: {}", d.fip);
    let _ = writeln!(text, "- FIP-: {}", d.fip_minus);
    let _ = writeln!(text, "- WAR: {}", d.pitcher_war);
    let _ = writeln!(text);
    let _ = writeln!(
        text,
        "BATTER {} (data: {})",
        matchup.batter_id,
        provenance(&matchup.batter_season)
    );
    let _ = writeln!(text, "- wOBA: {}", d.woba);
    let _ = writeln!(text, "- wRC+: {}", d.wrc_plus);
    let _ = writeln!(text, "- WAR: {}", d.batter_war);
    let _ = writeln!(text, "- BABIP: {}", d.babip);
    let _ = writeln!(
        text,
        "- Recent OPS: {} (data: {})",
        d.recent_ops,
        provenance(&matchup.recent_form)
    );
    let _ = writeln!(
        text,
        "- OPS vs this pitcher: {} (data: {})",
        d.head_to_head_ops,
        provenance(&matchup.head_to_head)
    );
    let _ = writeln!(text);
    let _ = write!(
        text,
        "Give a clear numerical win probability for this at-bat first, then the key factors most likely to decide it, within 7 lines."
    );
    text
}
