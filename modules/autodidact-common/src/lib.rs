pub mod config;
pub mod error;
pub mod links;
pub mod syllabus;
pub mod types;

pub use config::Config;
pub use error::AutodidactError;
pub use links::*;
pub use syllabus::*;
pub use types::*;
