pub mod client;
pub mod logging;
pub mod mock_client;
pub mod service;
pub mod stream;

pub use client::ApiClient;
pub use mock_client::{MockCompletionService, MockReply};
pub use service::{CompletionService, FragmentStream};
