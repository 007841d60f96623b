pub mod error;
pub mod messages;
pub mod types;

pub use error::{ErrorDetail, ErrorResponse, ErrorType};
pub use messages::request::{CreateMessageRequest, CreateMessageRequestBody};
pub use messages::response::CreateMessageResponse;
pub use messages::stream::BetaStreamEvent;
pub use types::{AnthropicHeaders, AnthropicVersion};
