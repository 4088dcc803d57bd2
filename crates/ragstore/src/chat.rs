//! Retrieval-augmented question answering over a [`VectorStore`].
//!
//! Text generation is reached only through [`TextGenerator`]; hosted chat
//! APIs and local inference engines implement it outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use ragstore_core::{Error, Result};

use crate::store::VectorStore;
use crate::types::{SearchRequest, SearchResult};

/// Produces text from a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generator name for diagnostics.
    fn name(&self) -> &str;
}

/// Generator that answers without a model.
///
/// Returns canned responses in order, cycling, or a prompt-derived echo
/// when none were given. Every prompt is recorded.
#[derive(Clone, Default)]
pub struct SimulatedGenerator {
    state: Arc<Mutex<SimulatedState>>,
}

#[derive(Default)]
struct SimulatedState {
    canned: Vec<String>,
    index: usize,
    prompts: Vec<String>,
}

impl SimulatedGenerator {
    /// A generator that echoes a summary of each prompt.
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator that returns `responses` in order, cycling.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatedState {
                canned: responses,
                ..Default::default()
            })),
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.state.lock().prompts.clone()
    }
}

#[async_trait]
impl TextGenerator for SimulatedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.prompts.push(prompt.to_string());

        if state.canned.is_empty() {
            let question = prompt
                .lines()
                .find_map(|line| line.strip_prefix(QUESTION_PREFIX))
                .unwrap_or("(no question)");
            return Ok(format!(
                "Simulated answer to \"{question}\" from {} characters of prompt.",
                prompt.len()
            ));
        }

        let answer = state.canned[state.index].clone();
        state.index = (state.index + 1) % state.canned.len();
        Ok(answer)
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

const QUESTION_PREFIX: &str = "Question: ";

/// Compose the generation prompt from ranked hits.
pub fn build_prompt(question: &str, hits: &[SearchResult]) -> String {
    let context: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
    format!(
        "Here is some retrieved context that might help answer your question:\n\n\
         {}\n\n\
         {QUESTION_PREFIX}{question}\n\n\
         Please provide the best answer you can based on this context and your knowledge.",
        context.join("\n\n")
    )
}

/// A generated answer with the passages it was grounded on.
#[derive(Debug, Clone)]
pub struct ChatAnswer {
    /// Generated text.
    pub answer: String,
    /// Retrieved passages, best first.
    pub sources: Vec<SearchResult>,
}

/// Question answering over one store.
pub struct ChatSession {
    store: VectorStore,
    generator: Arc<dyn TextGenerator>,
}

impl ChatSession {
    /// Pair a store with a generator.
    pub fn new(store: VectorStore, generator: Arc<dyn TextGenerator>) -> Self {
        Self { store, generator }
    }

    /// Retrieve `top_k` passages for `question` and generate an answer.
    pub async fn ask(&mut self, question: &str, top_k: usize) -> Result<ChatAnswer> {
        let sources = self
            .store
            .search(SearchRequest::new(question).with_top_k(top_k))
            .await?;
        log::debug!(
            "asking '{}' with {} retrieved passages",
            self.generator.name(),
            sources.len()
        );

        let prompt = build_prompt(question, &sources);
        let answer = self.generator.generate(&prompt).await?;
        if answer.trim().is_empty() {
            return Err(Error::invalid_data(format!(
                "generator '{}' returned an empty answer",
                self.generator.name()
            )));
        }
        Ok(ChatAnswer { answer, sources })
    }

    /// The underlying store.
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Release the store.
    pub fn into_store(self) -> VectorStore {
        self.store
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("store", &self.store)
            .field("generator", &self.generator.name())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::gateway::EmbeddingGateway;
    use crate::registry::{BackendRegistry, register_builtin_backends};
    use crate::types::{Document, Metadata};
    use ragstore_core::{EmbeddingMode, StoreConfig};
    use tempfile::tempdir;

    fn hit(text: &str) -> SearchResult {
        SearchResult {
            id: text.to_string(),
            text: text.to_string(),
            metadata: Metadata::new(),
            score: 1.0,
        }
    }

    #[test]
    fn test_prompt_keeps_rank_order() {
        let prompt = build_prompt("why?", &[hit("first"), hit("second")]);
        let first = prompt.find("first").unwrap();
        let second = prompt.find("second").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Question: why?"));
    }

    #[tokio::test]
    async fn test_simulated_generator_echo() {
        let generator = SimulatedGenerator::new();
        let answer = generator
            .generate(&build_prompt("what is rust?", &[]))
            .await
            .unwrap();
        assert!(answer.contains("what is rust?"));
        assert_eq!(generator.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_simulated_generator_cycles() {
        let generator = SimulatedGenerator::with_responses(vec!["one".into(), "two".into()]);
        assert_eq!(generator.generate("a").await.unwrap(), "one");
        assert_eq!(generator.generate("b").await.unwrap(), "two");
        assert_eq!(generator.generate("c").await.unwrap(), "one");
    }

    #[tokio::test]
    async fn test_ask_grounds_on_search_results() {
        let dir = tempdir().unwrap();
        let registry = BackendRegistry::new();
        register_builtin_backends(&registry);

        let config = StoreConfig::new(dir.path().join("chat.index"), "flat").with_query_server(false);
        let mut store = VectorStore::new_in(&registry, config)
            .unwrap()
            .with_gateway(EmbeddingGateway::new().with_provider(
                EmbeddingMode::Mock,
                Arc::new(MockEmbeddingProvider::new(8)),
            ));
        store
            .add(vec![
                Document::new("Rust guarantees memory safety without a garbage collector."),
                Document::new("Paris is the capital of France."),
            ])
            .await
            .unwrap();

        let generator = SimulatedGenerator::new();
        let mut session = ChatSession::new(store, Arc::new(generator.clone()));
        let answer = session
            .ask("Paris is the capital of France.", 1)
            .await
            .unwrap();

        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].text, "Paris is the capital of France.");
        assert!(generator.prompts()[0].contains("Paris is the capital of France."));
        assert_eq!(session.store().get_document_count(), 2);
    }

    #[tokio::test]
    async fn test_ask_empty_question_fails() {
        let registry = BackendRegistry::new();
        register_builtin_backends(&registry);
        let store = VectorStore::new_in(&registry, StoreConfig::new("unused.index", "flat")).unwrap();
        let mut session = ChatSession::new(store, Arc::new(SimulatedGenerator::new()));
        assert!(session.ask("  ", 3).await.unwrap_err().is_config());
    }
}
