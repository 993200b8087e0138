//! Embedding Client (C1): turns a query string into a dense vector.
//!
//! Speaks the Ollama-style `/embeddings` endpoint shape. On any failure —
//! network error, non-success status, or a response whose dimension doesn't
//! match — falls back to a zero vector rather than failing the caller; a
//! zero-vector query simply scores every candidate equally low in C2's
//! cosine search, which degrades gracefully instead of aborting the turn.

use anyhow::Result;
use tracing::warn;

pub const EMBEDDING_DIM: usize = 768;

#[derive(Clone)]
pub struct EmbeddingClient {
    api_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(api_url: &str, api_key: Option<&str>, model: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            api_key: api_key.map(|s| s.to_string()),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, input: serde_json::Value) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}/embeddings", self.api_url))
            .json(&serde_json::json!({
                "model": &self.model,
                "input": input,
                "encoding_format": "float",
            }));
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        req
    }

    /// Generate an embedding for a single query string.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .request(serde_json::Value::String(text.to_string()))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await?;
                if let Some(embedding) = json["data"][0]["embedding"].as_array() {
                    let vec: Vec<f32> = embedding
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    if vec.len() == EMBEDDING_DIM {
                        return Ok(vec);
                    }
                    warn!(
                        "unexpected embedding dimension: {} (expected {})",
                        vec.len(),
                        EMBEDDING_DIM
                    );
                }
                warn!("embedding response missing expected fields, using zero embedding");
                Ok(zero_embedding())
            }
            Ok(resp) => {
                warn!("embedding API returned status {}", resp.status());
                Ok(zero_embedding())
            }
            Err(e) => {
                warn!("failed to reach embedding API: {}", e);
                Ok(zero_embedding())
            }
        }
    }

    /// Generate embeddings for multiple texts in one request, used when
    /// ingesting a batch of segments.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .request(serde_json::json!(texts))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await?;
                if let Some(data) = json["data"].as_array() {
                    let embeddings: Vec<Vec<f32>> = data
                        .iter()
                        .filter_map(|item| {
                            item["embedding"].as_array().map(|arr| {
                                arr.iter()
                                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                                    .collect()
                            })
                        })
                        .collect();
                    if embeddings.len() == texts.len() {
                        return Ok(embeddings);
                    }
                }
                warn!("batch embedding response malformed, using zero embeddings");
                Ok(texts.iter().map(|_| zero_embedding()).collect())
            }
            Ok(resp) => {
                warn!("batch embedding API returned status {}", resp.status());
                Ok(texts.iter().map(|_| zero_embedding()).collect())
            }
            Err(e) => {
                warn!("failed to reach embedding API for batch request: {}", e);
                Ok(texts.iter().map(|_| zero_embedding()).collect())
            }
        }
    }
}

fn zero_embedding() -> Vec<f32> {
    vec![0.0; EMBEDDING_DIM]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_embedding_has_expected_dimension() {
        let emb = zero_embedding();
        assert_eq!(emb.len(), EMBEDDING_DIM);
        assert!(emb.iter().all(|&x| x == 0.0));
    }
}
