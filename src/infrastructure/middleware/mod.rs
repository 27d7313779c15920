// Request middleware and the extractors that read what it leaves behind

pub mod rate_limit;
pub mod viewer_context_extractor;
pub mod viewer_context_middleware;

pub use rate_limit::*;
pub use viewer_context_extractor::*;
pub use viewer_context_middleware::*;
