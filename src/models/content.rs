use serde::{Deserialize, Serialize};

use crate::models::exam_type::ExamType;
use crate::models::job::SourceDescriptor;

/// 送给 AI 提取器的考试元数据，同时随提取结果回传
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamMetadata {
    pub filename: String,
    pub school: String,
    #[serde(deserialize_with = "deserialize_year")]
    pub year: i32,
    pub exam_type: ExamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
}

impl ExamMetadata {
    /// 由来源描述和页数构造
    pub fn from_source(source: &SourceDescriptor, total_pages: Option<u32>) -> Self {
        Self {
            filename: source.filename.clone(),
            school: source.school.clone(),
            year: source.year,
            exam_type: source.exam_type,
            paper_number: source.paper_number,
            total_pages,
        }
    }
}

/// AI 提取出的一道题目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedQuestion {
    pub content: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<String>>,
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    /// 置信度（0–1）
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub question_num: u32,
}

/// AI 提取出的一节课程内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLesson {
    pub title: String,
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub topic: String,
    /// 展示顺序
    #[serde(default)]
    pub order: u32,
}

/// 提取结果（审核前暂存在任务上的 payload）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    pub questions: Vec<ExtractedQuestion>,
    pub lessons: Vec<ExtractedLesson>,
    pub metadata: ExamMetadata,
}

impl ExtractedContent {
    /// 题目和课程都为空
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty() && self.lessons.is_empty()
    }

    /// 平均置信度，无题目时返回 None
    pub fn mean_confidence(&self) -> Option<f32> {
        if self.questions.is_empty() {
            return None;
        }
        let total: f32 = self.questions.iter().map(|q| q.confidence).sum();
        Some(total / self.questions.len() as f32)
    }
}

fn default_difficulty() -> String {
    "medium".to_string()
}

fn default_content_type() -> String {
    "text".to_string()
}

/// 年份既可能是字符串也可能是整数（表单字段常以字符串提交）
pub(crate) fn deserialize_year<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct YearVisitor;

    impl<'de> Visitor<'de> for YearVisitor {
        type Value = i32;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer representing a year")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            value
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid year: {}", value)))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            i32::try_from(value).map_err(|_| E::custom(format!("invalid year: {}", value)))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            i32::try_from(value).map_err(|_| E::custom(format!("invalid year: {}", value)))
        }
    }

    deserializer.deserialize_any(YearVisitor)
}
