//! 导入任务实体与状态机

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::content::{deserialize_year, ExtractedContent};
use crate::models::exam_type::ExamType;

/// 任务状态（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 提取中（初始状态）
    Processing,
    /// 提取成功，等待人工审核
    ReadyForReview,
    /// 已提交（终态）
    Completed,
    /// 失败（终态）
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Processing,
        JobStatus::ReadyForReview,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// 持久化用的字符串
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::ReadyForReview => "ready_for_review",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// 从持久化字符串解析
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// 状态迁移表
    ///
    /// `processing → processing` 对应文本提取成功后写入页数。
    /// 没有回到 `processing` 的路径，也没有重试迁移。
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Processing, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::ReadyForReview)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::ReadyForReview, JobStatus::Completed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 粗粒度进度：processing → 50，审核就绪/已完成 → 100，失败无进度
pub fn progress_of(status: JobStatus) -> Option<u8> {
    match status {
        JobStatus::Processing => Some(50),
        JobStatus::ReadyForReview | JobStatus::Completed => Some(100),
        JobStatus::Failed => None,
    }
}

/// 上传时提供的来源描述，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub filename: String,
    pub school: String,
    #[serde(deserialize_with = "deserialize_year")]
    pub year: i32,
    pub exam_type: ExamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_number: Option<u32>,
}

/// 导入任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: String,
    pub status: JobStatus,
    pub source: SourceDescriptor,
    pub page_count: Option<u32>,
    /// `ready_for_review` 时为提取数量，`completed` 后为实际保存数量
    pub questions_count: u32,
    pub lessons_count: u32,
    pub error_message: Option<String>,
    /// 仅在 `ready_for_review` 到提交之间存在
    #[serde(skip)]
    pub extracted_payload: Option<ExtractedContent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// 创建新的 `processing` 任务
    pub fn new(source: SourceDescriptor) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Processing,
            source,
            page_count: None,
            questions_count: 0,
            lessons_count: 0,
            error_message: None,
            extracted_payload: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// 检查实体不变量，返回所有违反项
    pub fn invariant_violations(&self) -> Vec<&'static str> {
        let mut violations = Vec::new();

        if self.status == JobStatus::Failed
            && self.error_message.as_deref().map_or(true, str::is_empty)
        {
            violations.push("failed job without error message");
        }
        if self.status != JobStatus::Failed && self.error_message.is_some() {
            violations.push("error message on non-failed job");
        }
        if (self.status == JobStatus::ReadyForReview) != self.extracted_payload.is_some() {
            violations.push("payload presence does not match ready_for_review");
        }
        if self.status == JobStatus::ReadyForReview
            && self.questions_count + self.lessons_count == 0
        {
            violations.push("ready_for_review with nothing to review");
        }
        if (self.status == JobStatus::Completed) != self.completed_at.is_some() {
            violations.push("completed_at does not match completed status");
        }

        violations
    }
}

/// 状态查询返回的视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub questions_count: u32,
    pub lessons_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&ImportJob> for JobStatusView {
    fn from(job: &ImportJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: progress_of(job.status),
            questions_count: job.questions_count,
            lessons_count: job.lessons_count,
            page_count: job.page_count,
            error_message: job.error_message.clone(),
        }
    }
}

/// 上传接口的响应
///
/// 默认只带任务 ID 和状态；同步等待时附带提取数量或错误信息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lessons_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> SourceDescriptor {
        SourceDescriptor {
            filename: "math-2024.pdf".to_string(),
            school: "Riverside High".to_string(),
            year: 2024,
            exam_type: ExamType::Final,
            paper_number: Some(1),
        }
    }

    #[test]
    fn test_status_strings_round_trip() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("queued"), None);
    }

    #[test]
    fn test_transition_table() {
        use JobStatus::*;

        assert!(Processing.can_transition_to(ReadyForReview));
        assert!(Processing.can_transition_to(Failed));
        assert!(ReadyForReview.can_transition_to(Completed));

        assert!(!ReadyForReview.can_transition_to(Processing));
        assert!(!ReadyForReview.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(ReadyForReview));
        assert!(!Processing.can_transition_to(Completed));
    }

    #[test]
    fn test_progress_is_coarse() {
        assert_eq!(progress_of(JobStatus::Processing), Some(50));
        assert_eq!(progress_of(JobStatus::ReadyForReview), Some(100));
        assert_eq!(progress_of(JobStatus::Failed), None);
    }

    #[test]
    fn test_new_job_is_processing_and_consistent() {
        let job = ImportJob::new(descriptor());
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.invariant_violations().is_empty());

        let other = ImportJob::new(descriptor());
        assert_ne!(job.id, other.id);
    }

    #[test]
    fn test_failed_without_message_is_flagged() {
        let mut job = ImportJob::new(descriptor());
        job.status = JobStatus::Failed;
        job.error_message = Some(String::new());
        assert!(job
            .invariant_violations()
            .contains(&"failed job without error message"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::ReadyForReview).unwrap();
        assert_eq!(json, "\"ready_for_review\"");
    }

    #[test]
    fn test_descriptor_accepts_string_year() {
        let json = r#"{"filename":"a.pdf","school":"S","year":"2023","examType":"midterm"}"#;
        let parsed: SourceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.year, 2023);
        assert_eq!(parsed.exam_type, ExamType::Midterm);
        assert_eq!(parsed.paper_number, None);
    }
}
