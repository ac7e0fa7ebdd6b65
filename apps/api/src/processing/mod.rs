// Extraction pipeline: prompt construction, the single model call, response handling.
// All model calls go through llm_client — nothing here talks HTTP to the provider.

pub mod handlers;
pub mod pipeline;
pub mod prompts;
pub mod request;
pub mod response;
