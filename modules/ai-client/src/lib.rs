pub mod error;
pub mod gemini;
pub mod perplexity;
pub mod schema;
pub mod traits;
pub mod util;

pub use error::AiError;
pub use gemini::Gemini;
pub use perplexity::Perplexity;
pub use schema::{extract, StructuredOutput};
pub use traits::{ChatAgent, Completion, CompletionRequest, Message, MessageRole};
pub use util::{extract_json_object, strip_code_blocks};
