use crate::models::job::JobStatus;
use thiserror::Error;

/// 导入流水线错误类型
///
/// 阶段错误（Extraction / AiExtraction / EmptyResult）在编排层被捕获并写入任务，
/// 只有 Validation / NotFound / StateMismatch 会同步返回给调用方。
#[derive(Debug, Error)]
pub enum ImportError {
    /// 上传校验失败（4xx，不作为系统故障记录）
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// PDF 文本提取失败
    #[error("PDF extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    /// AI 内容提取失败
    #[error("AI extraction failed: {0}")]
    AiExtraction(#[from] AiExtractionError),
    /// 提取结果为空（业务条件，不是技术故障）
    #[error("No questions found in PDF")]
    EmptyResult,
    /// 任务状态不符合操作要求
    #[error("job {job_id} is {actual}, expected {expected}")]
    StateMismatch {
        job_id: String,
        expected: JobStatus,
        actual: JobStatus,
    },
    /// 资源不存在
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// 单条题目/课程保存失败（提交时局部恢复）
    #[error(transparent)]
    PersistenceItem(#[from] PersistenceItemError),
    /// 存储错误
    #[error(transparent)]
    Store(#[from] StoreError),
    /// 其他内部错误
    #[error("internal error: {0}")]
    Internal(String),
}

/// 上传校验错误，每个变体都携带具体原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No file provided")]
    MissingFile,
    #[error("Only PDF files are supported: {filename}")]
    NotPdfExtension { filename: String },
    #[error("Missing required fields: {}", .fields.join(", "))]
    MissingFields { fields: Vec<&'static str> },
    #[error("Invalid exam type: {value}")]
    InvalidExamType { value: String },
    #[error("Invalid year: {value}")]
    InvalidYear { value: String },
    #[error("Invalid paper number: {value}")]
    InvalidPaperNumber { value: String },
    #[error("File is not a valid PDF (missing %PDF- signature)")]
    BadSignature,
    #[error("File too large: {size} bytes (maximum {max} bytes)")]
    FileTooLarge { size: usize, max: usize },
    #[error("Page limit exceeded: {pages} pages (maximum {max})")]
    TooManyPages { pages: u32, max: u32 },
    #[error("Too many {kind} submitted for review: {submitted} (extracted {found})")]
    TooManyItems {
        kind: &'static str,
        submitted: usize,
        found: u32,
    },
    #[error("Missing job id")]
    MissingJobId,
}

/// PDF 文本提取错误
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// PDF 解析失败
    #[error("failed to parse PDF: {0}")]
    Parse(String),
    /// PDF 中没有页面
    #[error("PDF contains no pages")]
    NoPages,
    /// 提取线程异常
    #[error("extraction worker failed: {0}")]
    Worker(String),
}

/// AI 内容提取错误
#[derive(Debug, Error)]
pub enum AiExtractionError {
    /// API 调用失败
    #[error("LLM API call failed (model: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 返回内容为空
    #[error("LLM returned empty content (model: {model})")]
    EmptyContent { model: String },
    /// 返回内容无法解析
    #[error("could not parse LLM response: {reason}")]
    InvalidResponse { reason: String },
}

/// 单条内容保存失败
#[derive(Debug, Error)]
#[error("failed to save {kind} #{position}: {source}")]
pub struct PersistenceItemError {
    pub kind: &'static str,
    pub position: usize,
    #[source]
    pub source: StoreError,
}

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
    /// 状态迁移不合法（比较并交换失败也归入此类）
    #[error("illegal transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("job not found: {0}")]
    JobNotFound(String),
}

// ========== 便捷构造函数 ==========

impl ImportError {
    /// 创建任务不存在错误
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        ImportError::NotFound {
            entity: "import job",
            id: job_id.into(),
        }
    }

    /// 创建状态不匹配错误
    pub fn state_mismatch(job_id: impl Into<String>, expected: JobStatus, actual: JobStatus) -> Self {
        ImportError::StateMismatch {
            job_id: job_id.into(),
            expected,
            actual,
        }
    }

    /// 对应的 HTTP 状态码
    pub fn http_status(&self) -> u16 {
        match self {
            ImportError::Validation(_) | ImportError::StateMismatch { .. } => 400,
            ImportError::NotFound { .. } => 404,
            ImportError::Store(StoreError::JobNotFound(_)) => 404,
            ImportError::Store(StoreError::IllegalTransition { .. }) => 400,
            ImportError::Extraction(_)
            | ImportError::AiExtraction(_)
            | ImportError::EmptyResult
            | ImportError::PersistenceItem(_)
            | ImportError::Store(_)
            | ImportError::Internal(_) => 500,
        }
    }

    /// 机器可读的错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::Validation(_) => "validation_error",
            ImportError::Extraction(_) => "extraction_error",
            ImportError::AiExtraction(_) => "ai_extraction_error",
            ImportError::EmptyResult => "empty_result",
            ImportError::StateMismatch { .. } => "state_mismatch",
            ImportError::NotFound { .. } => "not_found",
            ImportError::Store(StoreError::JobNotFound(_)) => "not_found",
            ImportError::Store(StoreError::IllegalTransition { .. }) => "state_mismatch",
            ImportError::PersistenceItem(_) | ImportError::Store(_) => "persistence_error",
            ImportError::Internal(_) => "internal",
        }
    }
}

// ========== Result 类型别名 ==========

/// 导入流水线结果类型
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_messages_are_prefixed() {
        let err = ImportError::from(ExtractionError::Parse("bad xref".into()));
        assert_eq!(err.to_string(), "PDF extraction failed: failed to parse PDF: bad xref");

        let err = ImportError::from(AiExtractionError::EmptyContent {
            model: "m".into(),
        });
        assert!(err.to_string().starts_with("AI extraction failed: "));

        assert_eq!(ImportError::EmptyResult.to_string(), "No questions found in PDF");
    }

    #[test]
    fn test_missing_fields_lists_every_field() {
        let err = ValidationError::MissingFields {
            fields: vec!["school", "year"],
        };
        assert_eq!(err.to_string(), "Missing required fields: school, year");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ImportError::from(ValidationError::BadSignature).http_status(), 400);
        assert_eq!(ImportError::job_not_found("x").http_status(), 404);
        assert_eq!(
            ImportError::state_mismatch("x", JobStatus::ReadyForReview, JobStatus::Processing)
                .http_status(),
            400
        );
        assert_eq!(ImportError::EmptyResult.http_status(), 500);
    }
}
