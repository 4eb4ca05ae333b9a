use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutodidactError {
    #[error("Configuration error: {0}")]
    Config(String),
}
