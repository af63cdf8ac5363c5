pub mod backoff;
pub mod cache;
pub mod reconciler;
pub mod scanner;
