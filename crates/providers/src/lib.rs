pub mod openai_compatible;
pub mod oracle;
pub mod prompt;
pub mod traits;

pub use openai_compatible::OpenAICompatibleProvider;
pub use oracle::LlmPlanningOracle;
pub use traits::{ChatProvider, Message, ProviderError};
