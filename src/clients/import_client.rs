/// 导入服务 API 客户端
///
/// 封装上传、状态查询、读取审核内容和提交的 HTTP 调用
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::debug;

use crate::clients::status_poller::StatusSource;
use crate::models::{ExtractedContent, JobStatusView, SubmitResponse};
use crate::services::{CommitRequest, CommitResult};

/// 上传时附带的表单字段
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub school: String,
    pub year: i32,
    pub exam_type: String,
    pub paper_number: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// 导入 API 客户端
#[derive(Clone)]
pub struct ImportClient {
    http: reqwest::Client,
    base_url: String,
}

impl ImportClient {
    /// 创建新的客户端
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// 上传 PDF 文件
    ///
    /// # 参数
    /// - `path`: 本地文件路径
    /// - `form`: 考试元数据
    ///
    /// # 返回
    /// 返回任务 ID 和初始状态
    pub async fn upload(&self, path: &Path, form: &UploadForm) -> Result<SubmitResponse> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("无法读取文件: {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .context("文件路径缺少文件名")?;

        debug!("上传 {} ({} 字节)", filename, bytes.len());

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")?;
        let mut multipart = Form::new()
            .part("file", part)
            .text("school", form.school.clone())
            .text("year", form.year.to_string())
            .text("examType", form.exam_type.clone());
        if let Some(paper_number) = form.paper_number {
            multipart = multipart.text("paperNumber", paper_number.to_string());
        }

        let response = self
            .http
            .post(format!("{}/api/import", self.base_url))
            .multipart(multipart)
            .send()
            .await
            .context("上传请求失败")?;

        parse_response(response).await
    }

    /// 查询任务状态
    pub async fn fetch_status(&self, job_id: &str) -> Result<JobStatusView> {
        let response = self
            .http
            .get(format!("{}/api/import/{}", self.base_url, job_id))
            .send()
            .await
            .context("状态查询请求失败")?;

        parse_response(response).await
    }

    /// 读取待审核内容
    pub async fn fetch_review(&self, job_id: &str) -> Result<ExtractedContent> {
        let response = self
            .http
            .get(format!("{}/api/import/{}", self.base_url, job_id))
            .query(&[("action", "review")])
            .send()
            .await
            .context("读取审核内容请求失败")?;

        parse_response(response).await
    }

    /// 提交审核结果
    pub async fn commit(&self, job_id: &str, request: &CommitRequest) -> Result<CommitResult> {
        let body = json!({
            "jobId": job_id,
            "questions": request.questions,
            "lessons": request.lessons,
            "metadata": request.metadata,
        });

        let response = self
            .http
            .post(format!("{}/api/import/commit", self.base_url))
            .json(&body)
            .send()
            .await
            .context("提交请求失败")?;

        parse_response(response).await
    }
}

#[async_trait]
impl StatusSource for ImportClient {
    async fn fetch_status(&self, job_id: &str) -> Result<JobStatusView> {
        ImportClient::fetch_status(self, job_id).await
    }
}

/// 成功时解析 JSON，失败时取出服务端的错误信息
async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await.context("无法读取响应内容")?;

    if status.is_success() {
        return serde_json::from_str(&text)
            .with_context(|| format!("无法解析响应: {}", text));
    }

    bail!("{}", describe_error(status, &text))
}

fn describe_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!(
            "HTTP {} [{}]: {}",
            status.as_u16(),
            envelope.error.code,
            envelope.error.message
        ),
        Err(_) => format!("HTTP {}: {}", status.as_u16(), body),
    }
}
