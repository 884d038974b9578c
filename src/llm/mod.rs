pub mod chat_client;
pub mod credentials;
pub mod prompts;
pub mod qa_chain;
