pub mod content;
pub mod exam_type;
pub mod job;

pub use content::{ExamMetadata, ExtractedContent, ExtractedLesson, ExtractedQuestion};
pub use exam_type::ExamType;
pub use job::{
    progress_of, ImportJob, JobStatus, JobStatusView, SourceDescriptor,
    SubmitResponse,
};
