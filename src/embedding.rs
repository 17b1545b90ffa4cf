//! Optional external embedding provider: one blocking HTTP call per text,
//! matching the teacher's choice of a synchronous client (`ureq`) for
//! exactly this reason — safe to call from a non-async call stack. Any
//! failure (network, parse, non-200) falls back to the offline hashed
//! vector rather than failing the search (spec.md §7, §9).

use crate::config::EmbeddingConfig;
use crate::search::vector::embed_hash;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Builds an `embed` closure for the vector tier: provider-backed when
/// `config.endpoint` is set, the offline hash otherwise.
pub fn embedder(config: &EmbeddingConfig) -> Box<dyn Fn(&str) -> Vec<f64> + Send + Sync> {
    match config.endpoint.clone() {
        Some(endpoint) => {
            let model = config.model.clone();
            let api_key = config.api_key.clone();
            Box::new(move |text: &str| provider_embed(&endpoint, model.as_deref(), api_key.as_deref(), text))
        }
        None => Box::new(|text: &str| embed_hash(text)),
    }
}

fn provider_embed(endpoint: &str, model: Option<&str>, api_key: Option<&str>, text: &str) -> Vec<f64> {
    match try_provider_embed(endpoint, model, api_key, text) {
        Ok(vector) => vector,
        Err(e) => {
            tracing::warn!(error = %e, "embedding provider call failed, falling back to offline hash vector");
            embed_hash(text)
        }
    }
}

fn try_provider_embed(
    endpoint: &str,
    model: Option<&str>,
    api_key: Option<&str>,
    text: &str,
) -> anyhow::Result<Vec<f64>> {
    let mut request = ureq::post(endpoint);
    if let Some(key) = api_key {
        request = request.set("Authorization", &format!("Bearer {key}"));
    }
    let body = serde_json::json!({
        "model": model,
        "input": text,
    });
    let response: EmbeddingResponse = request.send_json(body)?.into_json()?;
    Ok(response.embedding.into_iter().map(|f| f as f64).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_endpoint_falls_back_to_hash_embedding() {
        let config = EmbeddingConfig::default();
        let embed = embedder(&config);
        let a = embed("alert handler");
        let b = embed_hash("alert handler");
        assert_eq!(a, b);
    }
}
