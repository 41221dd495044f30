use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::util::parse_bool_flag;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";

/// Retrieval parameters sent with every chat request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetrievalSettings {
    pub top_k: u32,
    pub hybrid_search: bool,
    pub temperature: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            hybrid_search: true,
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_url: String,
    pub retrieval: RetrievalSettings,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url =
            std::env::var("CITEFLOW_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let defaults = RetrievalSettings::default();
        let top_k = std::env::var("CITEFLOW_TOP_K")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(defaults.top_k);
        let hybrid_search = std::env::var("CITEFLOW_HYBRID_SEARCH")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(defaults.hybrid_search);
        let temperature = std::env::var("CITEFLOW_TEMPERATURE")
            .ok()
            .and_then(|v| v.trim().parse::<f32>().ok())
            .unwrap_or(defaults.temperature);

        Ok(Self {
            api_url,
            retrieval: RetrievalSettings {
                top_k,
                hybrid_search,
                temperature,
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid CITEFLOW_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !(1..=10).contains(&self.retrieval.top_k) {
            bail!(
                "Invalid CITEFLOW_TOP_K {}: expected 1..=10",
                self.retrieval.top_k
            );
        }

        if !(0.0..=1.0).contains(&self.retrieval.temperature) {
            bail!(
                "Invalid CITEFLOW_TEMPERATURE {}: expected 0.0..=1.0",
                self.retrieval.temperature
            );
        }

        Ok(())
    }
}
