pub mod chat;
pub mod embeddings;
pub mod models;
pub mod responses;
pub mod types;

pub use chat::request::CreateChatCompletionRequest;
pub use chat::response::CreateChatCompletionResponse;
pub use chat::stream::CreateChatCompletionStreamResponse;
pub use embeddings::{CreateEmbeddingRequest, CreateEmbeddingResponse};
pub use models::{Model, ListModelsResponse};
pub use responses::request::CreateResponseRequest;
pub use responses::response::Response;
pub use responses::stream::ResponseStreamEvent;
