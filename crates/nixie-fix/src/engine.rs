//! Completion backend over the multi-provider `llm` builder.

use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;

use nixie_core::collaborators::{CompletionError, CompletionService};
use nixie_core::settings::{ai_configured, AiSettings};

fn map_backend(provider: &str) -> Result<LLMBackend, CompletionError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(CompletionError::Backend(format!(
            "unknown provider: {other}"
        ))),
    }
}

/// Production `CompletionService` backed by whichever provider the settings
/// name. The builder is cheap; a fresh one is made per call so settings
/// changes take effect without restarting.
pub struct LlmCompletion {
    settings: AiSettings,
}

impl LlmCompletion {
    pub fn new(settings: AiSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl CompletionService for LlmCompletion {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CompletionError> {
        let backend = map_backend(&self.settings.provider)?;

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .model(&self.settings.model)
            .system(system);

        if !self.settings.api_key.is_empty() {
            builder = builder.api_key(&self.settings.api_key);
        }

        let llm = builder
            .build()
            .map_err(|e| CompletionError::Backend(format!("build LLM: {e}")))?;

        let messages = vec![ChatMessage::user().content(prompt).build()];

        let response = llm
            .chat(&messages)
            .await
            .map_err(|e| CompletionError::Backend(format!("chat: {e}")))?;

        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            Some(_) => Err(CompletionError::Backend(
                "model returned empty text".to_string(),
            )),
            None => Err(CompletionError::Backend(
                "model returned no text".to_string(),
            )),
        }
    }

    fn configured(&self) -> bool {
        ai_configured(&self.settings)
    }

    fn provider_name(&self) -> String {
        self.settings.provider.clone()
    }
}
