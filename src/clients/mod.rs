pub mod delivery;
pub mod llm;
pub mod traits;

pub use delivery::HttpDeliveryClient;
pub use llm::ChatCompletionsClient;
pub use traits::{
    Address, ChatMessage, ChatRequest, CompletionClient, DeliveryError, DeliveryPayload,
    DeliveryTransport,
};
