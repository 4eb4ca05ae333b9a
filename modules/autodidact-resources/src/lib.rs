pub mod curator;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod memory;
pub mod oer;
pub mod pipeline;
pub mod request;
pub mod scoring;
pub mod store;
pub mod validator;

pub use curator::normalize_payload;
pub use discovery::{LlmDiscoverer, LlmSynthesizer, ReadingSynthesizer, ResourceDiscoverer};
pub use error::{ResourceError, Result};
pub use extractor::{known_source, ContentExtractor, ExtractedPage, KnownSource};
pub use memory::MemoryStore;
pub use oer::OerSearch;
pub use pipeline::ResourcePipeline;
pub use request::{AdditionalResourceRequest, StepContext, StepResourcesRequest};
pub use store::{BundleEdit, LinkBlacklist, PgStore, ResourceCache};
pub use validator::{LinkStatus, LinkValidator};
