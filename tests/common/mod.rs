//! 集成测试共用的替身实现
#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use paper_import::error::{AiExtractionError, ExtractionError, StoreError};
use paper_import::infrastructure::{db, CatalogStore, SqliteCatalog, SqliteJobStore};
use paper_import::models::{
    ExamMetadata, ExtractedContent, ExtractedLesson, ExtractedQuestion, SourceDescriptor,
};
use paper_import::services::{
    ContentExtractor, ExtractedText, ReviewService, TextExtractor, UploadLimits, UploadRequest,
};
use paper_import::ImportPipeline;

/// 文本提取替身：固定页数或固定错误
pub struct FakeText {
    pub outcome: Result<u32, String>,
}

impl FakeText {
    pub fn pages(pages: u32) -> Self {
        Self { outcome: Ok(pages) }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl TextExtractor for FakeText {
    async fn extract(&self, _bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
        let pages = self
            .outcome
            .clone()
            .map_err(ExtractionError::Parse)?;
        let per_page: Vec<String> = (1..=pages).map(|n| format!("Page {} text", n)).collect();
        Ok(ExtractedText {
            text: per_page.join("\n\n"),
            pages: per_page,
            page_count: pages,
            title: None,
            author: None,
        })
    }
}

/// AI 提取替身：固定数量或固定错误，记录调用次数
pub struct FakeContent {
    pub questions: usize,
    pub lessons: usize,
    pub error: Option<String>,
    pub panics: bool,
    pub calls: AtomicU32,
}

impl FakeContent {
    pub fn items(questions: usize, lessons: usize) -> Self {
        Self {
            questions,
            lessons,
            error: None,
            panics: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::items(0, 0)
        }
    }

    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::items(0, 0)
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentExtractor for FakeContent {
    async fn extract(
        &self,
        _text: &str,
        metadata: &ExamMetadata,
    ) -> Result<ExtractedContent, AiExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("model client crashed");
        }
        if let Some(message) = &self.error {
            return Err(AiExtractionError::ApiCallFailed {
                model: "fake-model".into(),
                message: message.clone(),
            });
        }
        Ok(sample_content(self.questions, self.lessons, metadata.clone()))
    }
}

pub fn sample_content(questions: usize, lessons: usize, metadata: ExamMetadata) -> ExtractedContent {
    ExtractedContent {
        questions: (0..questions)
            .map(|i| ExtractedQuestion {
                content: format!("Question {}: simplify 2x + 3x", i + 1),
                solution: "Combine like terms".into(),
                answer: "5x".into(),
                hints: Some(vec!["Both terms share x".into()]),
                topic: "algebra".into(),
                difficulty: "easy".into(),
                confidence: 0.8,
                question_num: i as u32 + 1,
            })
            .collect(),
        lessons: (0..lessons)
            .map(|i| ExtractedLesson {
                title: format!("Lesson {}", i + 1),
                content: "Like terms have the same variable part.".into(),
                content_type: "text".into(),
                topic: "algebra".into(),
                order: i as u32 + 1,
            })
            .collect(),
        metadata,
    }
}

/// 题库替身：指定位置的题目保存失败，其余委托给 SQLite
pub struct FlakyCatalog {
    inner: SqliteCatalog,
    failing_questions: HashSet<usize>,
}

impl FlakyCatalog {
    pub fn new(pool: SqlitePool, failing_questions: &[usize]) -> Self {
        Self {
            inner: SqliteCatalog::new(pool),
            failing_questions: failing_questions.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl CatalogStore for FlakyCatalog {
    async fn register_source(
        &self,
        job_id: &str,
        source: &SourceDescriptor,
    ) -> Result<(), StoreError> {
        self.inner.register_source(job_id, source).await
    }

    async fn has_source(&self, job_id: &str) -> Result<bool, StoreError> {
        self.inner.has_source(job_id).await
    }

    async fn save_question(
        &self,
        job_id: &str,
        position: usize,
        source: &SourceDescriptor,
        question: &ExtractedQuestion,
    ) -> Result<(), StoreError> {
        if self.failing_questions.contains(&position) {
            return Err(StoreError::CorruptRecord {
                id: job_id.to_string(),
                reason: format!("injected failure at question {}", position),
            });
        }
        self.inner
            .save_question(job_id, position, source, question)
            .await
    }

    async fn save_lesson(
        &self,
        job_id: &str,
        position: usize,
        lesson: &ExtractedLesson,
    ) -> Result<(), StoreError> {
        self.inner.save_lesson(job_id, position, lesson).await
    }

    async fn count_questions(&self, job_id: &str) -> Result<u32, StoreError> {
        self.inner.count_questions(job_id).await
    }

    async fn count_lessons(&self, job_id: &str) -> Result<u32, StoreError> {
        self.inner.count_lessons(job_id).await
    }
}

/// 组装好的测试环境
pub struct Harness {
    pub pool: SqlitePool,
    pub jobs: Arc<SqliteJobStore>,
    pub catalog: Arc<FlakyCatalog>,
    pub content: Arc<FakeContent>,
    pub pipeline: ImportPipeline,
    pub review: ReviewService,
}

pub async fn harness(text: FakeText, content: FakeContent) -> Harness {
    harness_with(text, content, &[], true).await
}

pub async fn harness_with(
    text: FakeText,
    content: FakeContent,
    failing_questions: &[usize],
    enforce_page_limit: bool,
) -> Harness {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let jobs = Arc::new(SqliteJobStore::new(pool.clone()));
    let catalog = Arc::new(FlakyCatalog::new(pool.clone(), failing_questions));
    let content = Arc::new(content);

    let pipeline = ImportPipeline::new(
        jobs.clone(),
        catalog.clone(),
        Arc::new(text),
        content.clone(),
        UploadLimits::default(),
        enforce_page_limit,
    );
    let review = pipeline.review_service();

    Harness {
        pool,
        jobs,
        catalog,
        content,
        pipeline,
        review,
    }
}

pub fn pdf_bytes() -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.extend(std::iter::repeat(b'0').take(4096));
    bytes
}

pub fn upload_request() -> UploadRequest {
    UploadRequest {
        filename: Some("algebra-midterm.pdf".into()),
        bytes: pdf_bytes(),
        school: Some("Riverside High".into()),
        year: Some("2024".into()),
        exam_type: Some("midterm".into()),
        paper_number: Some("1".into()),
    }
}

pub async fn job_rows(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM import_jobs")
        .fetch_one(pool)
        .await
        .unwrap()
}
