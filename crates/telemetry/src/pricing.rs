//! Built-in pricing table for common models.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price. Overrides come from the `[pricing]` config table.

use halu_config::AppConfig;
use halu_core::provider::Usage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given usage.
    pub fn cost(&self, usage: &Usage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_m
            + usage.output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Pricing table with built-in defaults and config overrides.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    prices: HashMap<String, ModelPricing>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        // ── Anthropic ──────────────────────────────────────────────
        prices.insert("anthropic/claude-opus-4".into(), ModelPricing::new(15.0, 75.0));
        prices.insert("anthropic/claude-sonnet-4".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("anthropic/claude-3-7-sonnet".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("anthropic/claude-3-5-sonnet".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("anthropic/claude-3-5-haiku".into(), ModelPricing::new(0.8, 4.0));
        prices.insert("anthropic/claude-3-haiku".into(), ModelPricing::new(0.25, 1.25));

        // ── OpenAI ─────────────────────────────────────────────────
        prices.insert("openai/gpt-4o".into(), ModelPricing::new(2.5, 10.0));
        prices.insert("openai/gpt-4o-mini".into(), ModelPricing::new(0.15, 0.6));
        prices.insert("openai/o3-mini".into(), ModelPricing::new(1.1, 4.4));

        // ── Qwen (hosted) ──────────────────────────────────────────
        prices.insert("qwen/qwen-2.5-coder-32b-instruct".into(), ModelPricing::new(0.07, 0.16));
        prices.insert("qwen/qwen-2.5-72b-instruct".into(), ModelPricing::new(0.12, 0.39));

        // ── DeepSeek ───────────────────────────────────────────────
        prices.insert("deepseek/deepseek-v3".into(), ModelPricing::new(0.27, 1.1));
        prices.insert("deepseek/deepseek-r1".into(), ModelPricing::new(0.55, 2.19));

        Self { prices }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in prices with the config's `[pricing]` entries applied on top.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut table = Self::with_defaults();
        for (model, p) in &config.pricing {
            table.set(model.clone(), ModelPricing::new(p.input_per_m, p.output_per_m));
        }
        table
    }

    /// Add or update pricing for a model.
    pub fn set(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices.insert(model.into(), pricing);
    }

    /// Look up pricing for a model.
    ///
    /// Tries an exact match first, then the bare name without a provider
    /// prefix (`openai/gpt-4o` → `gpt-4o`), then the longest known bare
    /// name that prefixes the model (`claude-sonnet-4-20250514` matches
    /// `claude-sonnet-4`). Case-insensitive after the exact match.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        if let Some(p) = self.prices.get(model) {
            return Some(*p);
        }

        let model_lower = model.to_lowercase();
        let bare_model = model_lower.rsplit('/').next().unwrap_or(&model_lower);

        let mut best: Option<(usize, ModelPricing)> = None;
        for (key, pricing) in &self.prices {
            let key_lower = key.to_lowercase();
            let bare_key = key_lower.rsplit('/').next().unwrap_or(&key_lower);
            if bare_model == bare_key {
                return Some(*pricing);
            }
            if bare_model.starts_with(bare_key) && best.is_none_or(|(len, _)| bare_key.len() > len) {
                best = Some((bare_key.len(), *pricing));
            }
        }

        best.map(|(_, p)| p)
    }

    /// Estimated cost of `usage` on `model`, or `None` for unknown models.
    pub fn cost(&self, model: &str, usage: &Usage) -> Option<f64> {
        let pricing = self.get(model);
        if pricing.is_none() {
            tracing::debug!(model, "No pricing for model");
        }
        pricing.map(|p| p.cost(usage))
    }

    /// All entries, sorted by model name.
    pub fn entries(&self) -> Vec<(&str, ModelPricing)> {
        let mut entries: Vec<(&str, ModelPricing)> =
            self.prices.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
