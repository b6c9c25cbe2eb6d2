pub mod huggingface;
pub mod llm;
pub mod ollama;
pub mod openai;
pub mod registry;
