use anyhow::Context;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::api_connection::endpoints::{
    DEFAULT_AI_BASE_URL, DEFAULT_AI_MODEL, DEFAULT_NUTRITION_WEBHOOK_URL,
    DEFAULT_RECIPE_WEBHOOK_URL, RECIPE_WEBHOOK_CANDIDATES,
};
use crate::ingredient_parser::DEFAULT_MAX_AMOUNT;
use crate::storage::photos::DEFAULT_MAX_PHOTO_BYTES;

pub const DEFAULT_STORE_PATH: &str = "recipe_assist_store.json";

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub recipe_webhook_url: String,
    pub recipe_webhook_candidates: Vec<String>,
    pub nutrition_webhook_url: String,
    pub ai_api_url: String,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
    pub request_timeout: Duration,
    pub ai_timeout: Duration,
    /// Remote photo tier; `None` keeps everything local.
    pub supabase: Option<SupabaseConfig>,
    pub store_path: PathBuf,
    pub max_photo_bytes: u64,
    pub max_ingredient_amount: f64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let text = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let recipe_webhook_candidates = match var("RECIPE_WEBHOOK_CANDIDATES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect(),
            None => RECIPE_WEBHOOK_CANDIDATES.iter().map(|url| url.to_string()).collect(),
        };

        let supabase = match (var("SUPABASE_URL"), var("SUPABASE_KEY")) {
            (Some(url), Some(key)) => Some(SupabaseConfig { url, key }),
            _ => None,
        };

        Ok(Self {
            recipe_webhook_url: text("RECIPE_WEBHOOK_URL", DEFAULT_RECIPE_WEBHOOK_URL),
            recipe_webhook_candidates,
            nutrition_webhook_url: text("NUTRITION_WEBHOOK_URL", DEFAULT_NUTRITION_WEBHOOK_URL),
            ai_api_url: text("AI_API_URL", DEFAULT_AI_BASE_URL),
            ai_api_key: var("AI_API_KEY"),
            ai_model: text("AI_MODEL", DEFAULT_AI_MODEL),
            request_timeout: Duration::from_secs(parse_or(var("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS", 10)?),
            ai_timeout: Duration::from_secs(parse_or(var("AI_TIMEOUT_SECS"), "AI_TIMEOUT_SECS", 30)?),
            supabase,
            store_path: PathBuf::from(text("STORE_PATH", DEFAULT_STORE_PATH)),
            max_photo_bytes: parse_or(var("MAX_PHOTO_BYTES"), "MAX_PHOTO_BYTES", DEFAULT_MAX_PHOTO_BYTES)?,
            max_ingredient_amount: parse_or(
                var("MAX_INGREDIENT_AMOUNT"),
                "MAX_INGREDIENT_AMOUNT",
                DEFAULT_MAX_AMOUNT,
            )?,
        })
    }
}

fn parse_or<T>(value: Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.recipe_webhook_url, DEFAULT_RECIPE_WEBHOOK_URL);
        assert_eq!(cfg.recipe_webhook_candidates.len(), RECIPE_WEBHOOK_CANDIDATES.len());
        assert_eq!(cfg.ai_model, "deepseek-chat");
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.ai_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_photo_bytes, 5 * 1024 * 1024);
        assert!(cfg.ai_api_key.is_none());
        assert!(cfg.supabase.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("RECIPE_WEBHOOK_CANDIDATES", "http://a, ,http://b"),
            ("AI_API_KEY", "sk-1"),
            ("REQUEST_TIMEOUT_SECS", "3"),
            ("SUPABASE_URL", "https://p.supabase.co"),
            ("SUPABASE_KEY", "anon"),
            ("MAX_INGREDIENT_AMOUNT", "500"),
        ])
        .unwrap();
        assert_eq!(cfg.recipe_webhook_candidates, vec!["http://a", "http://b"]);
        assert_eq!(cfg.ai_api_key.as_deref(), Some("sk-1"));
        assert_eq!(cfg.request_timeout, Duration::from_secs(3));
        assert_eq!(cfg.supabase.unwrap().key, "anon");
        assert_eq!(cfg.max_ingredient_amount, 500.0);
    }

    #[test]
    fn test_supabase_needs_both_values() {
        let cfg = config(&[("SUPABASE_URL", "https://p.supabase.co"), ("SUPABASE_KEY", " ")]).unwrap();
        assert!(cfg.supabase.is_none());
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = config(&[("AI_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("AI_TIMEOUT_SECS"));
    }
}
