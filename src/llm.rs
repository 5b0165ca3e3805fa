//! Answer synthesis through an Ollama-compatible completion endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Turns a system prompt plus user prompt into a text completion.
pub trait Llm: Send + Sync {
    fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Completion provider backed by Ollama's `/api/generate` endpoint.
///
/// The request timeout is enforced on the HTTP client; there are no retries.
pub struct OllamaLlm {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaLlm {
    pub fn new(
        base_url: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("LLM HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        })
    }
}

fn generate_endpoint(base_url: &str) -> String {
    format!("{}/api/generate", base_url.trim_end_matches('/'))
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Llm for OllamaLlm {
    fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            system,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(generate_endpoint(&self.base_url))
            .json(&request)
            .send()
            .map_err(|e| Error::provider("llm", e))?
            .error_for_status()
            .map_err(|e| Error::provider("llm", e))?
            .json::<GenerateResponse>()
            .map_err(|e| Error::provider("llm", e))?;

        Ok(response.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
