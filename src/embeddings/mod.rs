// Embedding generation module
// Maps batches of chunk text to fixed-dimension vectors via Ollama

pub mod ollama;

pub use ollama::OllamaClient;
