pub mod cache;
pub mod transfer;

pub use cache::{CacheStatus, LocationCache};
pub use transfer::{ImportSummary, parse_import, render_export};
