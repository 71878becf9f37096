pub mod gemini;
pub mod mock;
pub mod openai;

pub use gemini::GeminiClient;
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
