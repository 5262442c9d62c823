//! Runtime configuration.
//!
//! Every setting is read from the process environment (after loading a
//! `.env` file, if present). Secrets have no defaults; everything else
//! falls back to the values the service was tuned with.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Which vector index backend to talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Managed Pinecone serverless index.
    Pinecone,
    /// Process-local index, lost on restart.
    Memory,
}

impl FromStr for VectorBackend {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pinecone" => Ok(VectorBackend::Pinecone),
            "memory" => Ok(VectorBackend::Memory),
            other => Err(RagError::config(
                "VECTOR_STORE",
                format!("expected 'pinecone' or 'memory', got '{}'", other),
            )),
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_vector_backend")]
    pub vector_backend: VectorBackend,
    #[serde(default, skip_serializing)]
    pub pinecone_api_key: Option<String>,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default = "default_cloud")]
    pub pinecone_cloud: String,
    #[serde(default = "default_region")]
    pub pinecone_region: String,
    #[serde(default)]
    pub pinecone_namespace: Option<String>,

    /// Document id that chunk ids are prefixed with.
    #[serde(default = "default_doc_id")]
    pub doc_id: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Number of chunks the retrieval tool returns.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default, skip_serializing)]
    pub hf_api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default)]
    pub embedding_url: Option<String>,

    #[serde(default, skip_serializing)]
    pub google_api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default)]
    pub llm_temperature: Option<f64>,

    #[serde(default = "default_max_iterations")]
    pub agent_max_iterations: usize,
    #[serde(default = "default_true")]
    pub agent_verbose: bool,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_vector_backend() -> VectorBackend {
    VectorBackend::Pinecone
}

fn default_index_name() -> String {
    "quickstart".to_string()
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_doc_id() -> String {
    "attention".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_top_k() -> usize {
    4
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_max_iterations() -> usize {
    15
}

fn default_true() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            vector_backend: default_vector_backend(),
            pinecone_api_key: None,
            index_name: default_index_name(),
            pinecone_cloud: default_cloud(),
            pinecone_region: default_region(),
            pinecone_namespace: None,
            doc_id: default_doc_id(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            hf_api_key: None,
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            embedding_url: None,
            google_api_key: None,
            llm_model: default_llm_model(),
            llm_temperature: None,
            agent_max_iterations: default_max_iterations(),
            agent_verbose: true,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl AppConfig {
    /// Load `.env` (if any) and read the configuration from the environment.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenv::dotenv() {
            log::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(v) = get("BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Some(v) = get("PORT") {
            config.port = parse_value("PORT", &v)?;
        }
        if let Some(v) = get("VECTOR_STORE") {
            config.vector_backend = v.parse()?;
        }
        config.pinecone_api_key = get("PINECONE_API_KEY");
        if let Some(v) = get("PINECONE_INDEX") {
            config.index_name = v;
        }
        if let Some(v) = get("PINECONE_CLOUD") {
            config.pinecone_cloud = v;
        }
        if let Some(v) = get("PINECONE_REGION") {
            config.pinecone_region = v;
        }
        config.pinecone_namespace = get("PINECONE_NAMESPACE");
        if let Some(v) = get("DOC_ID") {
            config.doc_id = v;
        }
        if let Some(v) = get("CHUNK_SIZE") {
            config.chunk_size = parse_value("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("CHUNK_OVERLAP") {
            config.chunk_overlap = parse_value("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("TOP_K") {
            config.top_k = parse_value("TOP_K", &v)?;
        }
        config.hf_api_key = get("HF_API_KEY").or_else(|| get("HUGGINGFACEHUB_API_TOKEN"));
        if let Some(v) = get("EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Some(v) = get("EMBEDDING_DIMENSION") {
            config.embedding_dimension = parse_value("EMBEDDING_DIMENSION", &v)?;
        }
        config.embedding_url = get("EMBEDDING_URL");
        config.google_api_key = get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY"));
        if let Some(v) = get("LLM_MODEL") {
            config.llm_model = v;
        }
        if let Some(v) = get("LLM_TEMPERATURE") {
            config.llm_temperature = Some(parse_value("LLM_TEMPERATURE", &v)?);
        }
        if let Some(v) = get("AGENT_MAX_ITERATIONS") {
            config.agent_max_iterations = parse_value("AGENT_MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = get("AGENT_VERBOSE") {
            config.agent_verbose = parse_bool("AGENT_VERBOSE", &v)?;
        }
        if let Some(v) = get("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse_value("MAX_UPLOAD_BYTES", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.vector_backend == VectorBackend::Pinecone && self.pinecone_api_key.is_none() {
            return Err(RagError::config(
                "PINECONE_API_KEY",
                "required when VECTOR_STORE=pinecone",
            ));
        }
        if self.chunk_size == 0 {
            return Err(RagError::config("CHUNK_SIZE", "must be greater than zero"));
        }
        if self.chunk_overlap > self.chunk_size {
            return Err(RagError::config(
                "CHUNK_OVERLAP",
                format!(
                    "overlap {} exceeds chunk size {}",
                    self.chunk_overlap, self.chunk_size
                ),
            ));
        }
        if self.top_k == 0 {
            return Err(RagError::config("TOP_K", "must be greater than zero"));
        }
        if self.agent_max_iterations == 0 {
            return Err(RagError::config(
                "AGENT_MAX_ITERATIONS",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// `host:port` string the server binds to.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| RagError::config(key, format!("invalid value '{}': {}", raw, e)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RagError::config(
            key,
            format!("invalid boolean '{}'", raw),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_memory_backend() {
        let config = AppConfig::from_lookup(lookup(&[("VECTOR_STORE", "memory")])).unwrap();
        assert_eq!(config.vector_backend, VectorBackend::Memory);
        assert_eq!(config.index_name, "quickstart");
        assert_eq!(config.doc_id, "attention");
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.top_k, 4);
        assert_eq!(config.embedding_dimension, 384);
        assert_eq!(config.llm_model, "gemini-2.0-flash");
        assert_eq!(config.socket_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_pinecone_requires_api_key() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("PINECONE_API_KEY"));

        let config =
            AppConfig::from_lookup(lookup(&[("PINECONE_API_KEY", "pc-key")])).unwrap();
        assert_eq!(config.vector_backend, VectorBackend::Pinecone);
        assert_eq!(config.pinecone_api_key.as_deref(), Some("pc-key"));
    }

    #[test]
    fn test_invalid_number_names_key() {
        let err = AppConfig::from_lookup(lookup(&[
            ("VECTOR_STORE", "memory"),
            ("CHUNK_SIZE", "big"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CHUNK_SIZE"));
    }

    #[test]
    fn test_overlap_larger_than_size_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("VECTOR_STORE", "memory"),
            ("CHUNK_SIZE", "50"),
            ("CHUNK_OVERLAP", "60"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CHUNK_OVERLAP"));
    }

    #[test]
    fn test_google_key_fallback_and_bool_parsing() {
        let config = AppConfig::from_lookup(lookup(&[
            ("VECTOR_STORE", "memory"),
            ("GEMINI_API_KEY", "g-key"),
            ("AGENT_VERBOSE", "off"),
            ("LLM_TEMPERATURE", "0.2"),
        ]))
        .unwrap();
        assert_eq!(config.google_api_key.as_deref(), Some("g-key"));
        assert!(!config.agent_verbose);
        assert_eq!(config.llm_temperature, Some(0.2));
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut config = AppConfig::default();
        config.pinecone_api_key = Some("secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!("redis".parse::<VectorBackend>().is_err());
        assert_eq!(
            " Memory ".parse::<VectorBackend>().unwrap(),
            VectorBackend::Memory
        );
    }
}
