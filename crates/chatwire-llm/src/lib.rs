pub mod converter;
pub mod error_body;
pub mod provider;
pub mod sse;

pub mod mock;

pub use mock::{MockProvider, MockResponse};
pub use provider::{OpenAiCompatProvider, ProviderConfig};
pub use sse::{FrameDecoder, SseChunkStream};
