/// HTTP embedders for the OpenAI and Ollama embedding APIs.
///
/// Requests are blocking; async callers are expected to run them on a
/// blocking thread. No retries are attempted here.
use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use super::{Embedder, EmbedderError};
use crate::router::EmbeddingProfile;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    OpenAi,
    Ollama,
}

/// Embedder backed by a remote embedding endpoint.
pub struct RemoteEmbedder {
    protocol: Protocol,
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl RemoteEmbedder {
    /// OpenAI-compatible `/v1/embeddings`. The API key is read from
    /// `OPENAI_API_KEY` at request time.
    pub fn openai(profile: &EmbeddingProfile) -> Result<Self, EmbedderError> {
        Self::build(Protocol::OpenAi, profile, OPENAI_DEFAULT_URL)
    }

    /// Ollama `/api/embed`.
    pub fn ollama(profile: &EmbeddingProfile) -> Result<Self, EmbedderError> {
        Self::build(Protocol::Ollama, profile, OLLAMA_DEFAULT_URL)
    }

    fn build(
        protocol: Protocol,
        profile: &EmbeddingProfile,
        default_url: &str,
    ) -> Result<Self, EmbedderError> {
        if profile.model.is_empty() {
            return Err(EmbedderError::Misconfigured(format!(
                "model name required for {} profile",
                profile.kind
            )));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| EmbedderError::Misconfigured(format!("http client: {e}")))?;

        let base_url = profile
            .url
            .clone()
            .unwrap_or_else(|| default_url.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            protocol,
            client,
            base_url,
            model: profile.model.clone(),
            dimensions: profile.dimensions,
        })
    }

    fn endpoint(&self) -> String {
        match self.protocol {
            Protocol::OpenAi => format!("{}/v1/embeddings", self.base_url),
            Protocol::Ollama => format!("{}/api/embed", self.base_url),
        }
    }

    fn request(&self, texts: &[&str]) -> Result<Value, EmbedderError> {
        let url = self.endpoint();
        debug!("POST {url} ({} texts, model {})", texts.len(), self.model);

        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let mut req = self.client.post(&url).json(&body);
        if self.protocol == Protocol::OpenAi {
            let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
                EmbedderError::Misconfigured("OPENAI_API_KEY environment variable not set".into())
            })?;
            req = req.bearer_auth(api_key);
        }

        let response = req
            .send()
            .map_err(|e| EmbedderError::Unavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(EmbedderError::RequestFailed(format!("{status}: {text}")));
        }

        response
            .json::<Value>()
            .map_err(|e| EmbedderError::InvalidResponse(e.to_string()))
    }
}

impl Embedder for RemoteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedderError::InvalidResponse("empty embedding response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let json = self.request(texts)?;
        let vectors = match self.protocol {
            Protocol::OpenAi => parse_openai_response(&json)?,
            Protocol::Ollama => parse_ollama_response(&json)?,
        };
        if vectors.len() != texts.len() {
            return Err(EmbedderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn parse_vector(value: &Value) -> Result<Vec<f32>, EmbedderError> {
    let array = value
        .as_array()
        .ok_or_else(|| EmbedderError::InvalidResponse("embedding is not an array".into()))?;
    array
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbedderError::InvalidResponse("non-numeric component".into()))
        })
        .collect()
}

/// `{"data": [{"index": 0, "embedding": [...]}, ...]}`, reordered by index.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>, EmbedderError> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| EmbedderError::InvalidResponse("missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map_or(pos, |i| i as usize);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| EmbedderError::InvalidResponse("missing embedding".into()))?;
        indexed.push((index, parse_vector(embedding)?));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// `{"embeddings": [[...], ...]}`
fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>, EmbedderError> {
    json.get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| EmbedderError::InvalidResponse("missing embeddings array".into()))?
        .iter()
        .map(parse_vector)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{EmbeddingProvider, ProfileKind};

    fn profile(url: Option<&str>) -> EmbeddingProfile {
        EmbeddingProfile {
            kind: ProfileKind::Documentation,
            provider: EmbeddingProvider::Ollama,
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            url: url.map(str::to_string),
        }
    }

    #[test]
    fn test_endpoints() {
        let ollama = RemoteEmbedder::ollama(&profile(None)).unwrap();
        assert_eq!(ollama.endpoint(), "http://localhost:11434/api/embed");

        let openai = RemoteEmbedder::openai(&profile(Some("http://proxy.local/"))).unwrap();
        assert_eq!(openai.endpoint(), "http://proxy.local/v1/embeddings");
        assert_eq!(openai.dimensions(), 768);
    }

    #[test]
    fn test_empty_model_rejected() {
        let mut p = profile(None);
        p.model.clear();
        assert!(matches!(
            RemoteEmbedder::ollama(&p),
            Err(EmbedderError::Misconfigured(_))
        ));
    }

    #[test]
    fn test_parse_openai_reorders_by_index() {
        let json = json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn test_parse_openai_missing_data() {
        let json = json!({"error": {"message": "bad key"}});
        assert!(parse_openai_response(&json).is_err());
    }

    #[test]
    fn test_parse_ollama() {
        let json = json!({"model": "nomic-embed-text", "embeddings": [[0.5, 0.5], [0.25, 0.75]]});
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.25, 0.75]);
    }

    #[test]
    fn test_parse_ollama_non_numeric() {
        let json = json!({"embeddings": [["x"]]});
        assert!(parse_ollama_response(&json).is_err());
    }
}
