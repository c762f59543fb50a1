pub mod api;
pub mod config;
pub mod display;
pub mod error;
pub mod parser;
pub mod search;
pub mod testing;
pub mod upload;

pub mod prelude {
    pub use crate::api::types::{MemoryRecord, Message, Role};
    pub use crate::api::{HttpMemoryApi, MemoryApi};
    pub use crate::config::AppConfig;
    pub use crate::error::{ClientError, Result};
    pub use crate::parser::ExtractMode;
    pub use crate::search::{MemorySearcher, TimeRange};
    pub use crate::upload::{BatchReport, FileOutcome, MemoryUploader, UploadOptions};
}
