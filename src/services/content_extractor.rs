//! AI 内容提取服务 - 业务能力层
//!
//! 只负责"规范化文本 + 考试元数据 → 题目与课程"，不关心任务状态
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AiExtractionError;
use crate::models::{ExamMetadata, ExtractedContent, ExtractedLesson, ExtractedQuestion};
use crate::utils::logging::truncate_text;

/// AI 内容提取能力
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        metadata: &ExamMetadata,
    ) -> Result<ExtractedContent, AiExtractionError>;
}

/// 基于 LLM 的内容提取器
pub struct LlmContentExtractor {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_input_chars: usize,
}

impl LlmContentExtractor {
    /// 创建新的 LLM 提取器
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            max_input_chars: config.llm_max_input_chars,
        }
    }

    /// 通用的 LLM 调用
    async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: &str,
    ) -> Result<String, AiExtractionError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let api_failed = |message: String| AiExtractionError::ApiCallFailed {
            model: self.model_name.clone(),
            message,
        };

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()
            .map_err(|e| api_failed(e.to_string()))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| api_failed(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(0.1)
            .max_tokens(8192u32)
            .build()
            .map_err(|e| api_failed(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            api_failed(e.to_string())
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AiExtractionError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl ContentExtractor for LlmContentExtractor {
    async fn extract(
        &self,
        text: &str,
        metadata: &ExamMetadata,
    ) -> Result<ExtractedContent, AiExtractionError> {
        let input = truncate_chars(text, self.max_input_chars);
        if input.len() < text.len() {
            warn!(
                "文本过长，已截断至 {} 字符 ({})",
                self.max_input_chars, metadata.filename
            );
        }

        let (user_message, system_message) = build_extraction_messages(input, metadata);
        let response = self.send_to_llm(&user_message, &system_message).await?;

        debug!("LLM 响应预览: {}", truncate_text(&response, 200));

        parse_extraction_response(&response, metadata)
    }
}

/// 构建提取提示词，返回 (user_message, system_message)
fn build_extraction_messages(text: &str, metadata: &ExamMetadata) -> (String, String) {
    let system_message = "You are an assistant that digitises scanned exam papers. \
                          You identify every discrete exam question and any explanatory \
                          lesson material, and answer with strict JSON only."
        .to_string();

    let paper = metadata
        .paper_number
        .map(|n| format!("Paper {}", n))
        .unwrap_or_else(|| "Single paper".to_string());
    let pages = metadata
        .total_pages
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let user_message = format!(
        r#"Extract the questions and lessons from this exam paper.

Exam metadata:
  File: {}
  School: {}
  Year: {}
  Exam type: {}
  {}
  Total pages: {}

Return a JSON object with this exact shape:
{{
  "questions": [
    {{
      "questionNum": 1,
      "content": "full question text",
      "solution": "worked solution",
      "answer": "final answer",
      "hints": ["optional hint"],
      "topic": "topic name",
      "difficulty": "easy | medium | hard",
      "confidence": 0.0
    }}
  ],
  "lessons": [
    {{
      "order": 1,
      "title": "lesson title",
      "content": "lesson body",
      "contentType": "text | markdown",
      "topic": "topic name"
    }}
  ]
}}

Rules:
- confidence is your certainty (0 to 1) that the question was transcribed correctly.
- Keep questions in the order they appear in the paper.
- If there is no lesson material, return an empty "lessons" array.
- Return JSON only, with no commentary.

Exam text:
{}"#,
        metadata.filename,
        metadata.school,
        metadata.year,
        metadata.exam_type.label(),
        paper,
        pages,
        text
    );

    (user_message, system_message)
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    questions: Vec<ExtractedQuestion>,
    #[serde(default)]
    lessons: Vec<ExtractedLesson>,
}

/// 解析 LLM 响应
///
/// 容忍代码块包裹和前后说明文字，只取第一个 `{` 到最后一个 `}` 之间的内容。
fn parse_extraction_response(
    response: &str,
    metadata: &ExamMetadata,
) -> Result<ExtractedContent, AiExtractionError> {
    let start = response.find('{');
    let end = response.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &response[start..=end],
        _ => {
            return Err(AiExtractionError::InvalidResponse {
                reason: format!("no JSON object in response: {}", truncate_text(response, 80)),
            })
        }
    };

    let raw: RawExtraction =
        serde_json::from_str(json).map_err(|e| AiExtractionError::InvalidResponse {
            reason: e.to_string(),
        })?;

    let questions = raw
        .questions
        .into_iter()
        .filter(|q| !q.content.trim().is_empty())
        .enumerate()
        .map(|(i, mut q)| {
            if q.question_num == 0 {
                q.question_num = i as u32 + 1;
            }
            q.confidence = if q.confidence.is_finite() {
                q.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            q
        })
        .collect();

    let lessons = raw
        .lessons
        .into_iter()
        .filter(|l| !l.title.trim().is_empty() || !l.content.trim().is_empty())
        .enumerate()
        .map(|(i, mut l)| {
            if l.order == 0 {
                l.order = i as u32 + 1;
            }
            l
        })
        .collect();

    Ok(ExtractedContent {
        questions,
        lessons,
        metadata: metadata.clone(),
    })
}

/// 按字符截断（不切断多字节字符）
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
