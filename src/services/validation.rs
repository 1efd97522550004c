//! 上传校验 - 业务能力层
//!
//! 在创建任务、做任何耗时工作之前检查上传前置条件。
//! 检查顺序固定：文件与扩展名 → 必填元数据 → PDF 签名 → 大小 → 页数（已知时）。

use tracing::debug;

use crate::config::Config;
use crate::error::ValidationError;
use crate::models::{ExamType, SourceDescriptor};

/// PDF 文件头签名
pub const PDF_SIGNATURE: &[u8; 5] = b"%PDF-";

/// 上传上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_bytes: usize,
    pub max_pages: u32,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_pages: 50,
        }
    }
}

impl UploadLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_bytes: config.max_upload_bytes,
            max_pages: config.max_page_count,
        }
    }
}

/// 未经校验的上传请求（表单字段保持原始字符串）
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
    pub school: Option<String>,
    pub year: Option<String>,
    pub exam_type: Option<String>,
    pub paper_number: Option<String>,
}

/// 校验通过的上传
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub source: SourceDescriptor,
    pub bytes: Vec<u8>,
}

/// 校验上传请求
pub fn validate_upload(
    request: UploadRequest,
    limits: &UploadLimits,
) -> Result<ValidatedUpload, ValidationError> {
    // (a) 文件存在且扩展名为 .pdf
    let filename = match request.filename.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() && !request.bytes.is_empty() => name.to_string(),
        _ => return Err(ValidationError::MissingFile),
    };
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(ValidationError::NotPdfExtension { filename });
    }

    // (b) 必填元数据
    let school = non_blank(request.school.as_deref());
    let year = non_blank(request.year.as_deref());
    let exam_type = non_blank(request.exam_type.as_deref());

    let mut missing = Vec::new();
    if school.is_none() {
        missing.push("school");
    }
    if year.is_none() {
        missing.push("year");
    }
    if exam_type.is_none() {
        missing.push("examType");
    }
    let (Some(school), Some(year), Some(exam_type)) = (school, year, exam_type) else {
        return Err(ValidationError::MissingFields { fields: missing });
    };

    let year = year
        .parse::<i32>()
        .ok()
        .filter(|y| (1900..=2100).contains(y))
        .ok_or_else(|| ValidationError::InvalidYear {
            value: year.to_string(),
        })?;
    let exam_type = ExamType::parse(exam_type).ok_or_else(|| ValidationError::InvalidExamType {
        value: exam_type.to_string(),
    })?;
    let paper_number = match non_blank(request.paper_number.as_deref()) {
        Some(raw) => Some(
            raw.parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| ValidationError::InvalidPaperNumber {
                    value: raw.to_string(),
                })?,
        ),
        None => None,
    };

    // (c) PDF 签名
    if !has_pdf_signature(&request.bytes) {
        return Err(ValidationError::BadSignature);
    }

    // (d)(e) 大小与页数（上传时页数未知）
    check_limits(request.bytes.len(), None, limits)?;

    debug!(
        "上传校验通过: {} ({} 字节, {} {} {})",
        filename,
        request.bytes.len(),
        school,
        year,
        exam_type
    );

    Ok(ValidatedUpload {
        source: SourceDescriptor {
            filename,
            school: school.to_string(),
            year,
            exam_type,
            paper_number,
        },
        bytes: request.bytes,
    })
}

/// 大小与页数上限检查
///
/// 页数只有在文本提取之后才知道，所以提取后会再调用一次。
pub fn check_limits(
    byte_len: usize,
    page_count: Option<u32>,
    limits: &UploadLimits,
) -> Result<(), ValidationError> {
    if byte_len > limits.max_bytes {
        return Err(ValidationError::FileTooLarge {
            size: byte_len,
            max: limits.max_bytes,
        });
    }
    if let Some(pages) = page_count {
        if pages > limits.max_pages {
            return Err(ValidationError::TooManyPages {
                pages,
                max: limits.max_pages,
            });
        }
    }
    Ok(())
}

/// 前 5 个字节是否为 `%PDF-`
pub fn has_pdf_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_SIGNATURE)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
