pub mod gemini;
pub mod local_store;
pub mod prompts;
pub mod remote_store;

pub use gemini::GeminiClient;
pub use local_store::FileLocalStore;
pub use remote_store::PgRemoteStore;
