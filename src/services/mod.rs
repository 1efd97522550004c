pub mod content_extractor;
pub mod review_service;
pub mod text_extractor;
pub mod validation;

pub use content_extractor::{ContentExtractor, LlmContentExtractor};
pub use review_service::{CommitRequest, CommitResult, FailedItem, ItemKind, ReviewService};
pub use text_extractor::{ExtractedText, LopdfTextExtractor, TextExtractor};
pub use validation::{validate_upload, UploadLimits, UploadRequest, ValidatedUpload};
