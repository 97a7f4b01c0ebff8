pub mod filter;
pub mod metrics;
pub mod pipeline;
pub mod stats;

pub use metrics::SheetSize;
pub use pipeline::{Pipeline, analyze};

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("invalid {kind} pattern `{pattern}`: {source}")]
        InvalidPattern {
            kind: &'static str,
            pattern: String,
            #[source]
            source: regex::Error,
        },
        #[error("threshold `{name}` has invalid value {value}")]
        InvalidThreshold { name: &'static str, value: f64 },
        #[error("pipeline invariant violated: {0}")]
        Invariant(String),
    }
}
