mod common;

use tokio_test::{assert_err, assert_ok};

use common::{harness, harness_with, job_rows, upload_request, FakeContent, FakeText};
use paper_import::error::{ImportError, ValidationError};
use paper_import::infrastructure::{CatalogStore, JobStore};
use paper_import::models::JobStatus;
use paper_import::services::CommitRequest;
use paper_import::workflow::{Stage, StageOutcome};

#[tokio::test]
async fn test_bad_signature_creates_no_job() {
    let h = harness(FakeText::pages(3), FakeContent::items(5, 2)).await;

    let mut request = upload_request();
    request.bytes = vec![b'A'; 2048];

    let err = assert_err!(h.pipeline.submit(request).await);
    assert!(matches!(
        err,
        ImportError::Validation(ValidationError::BadSignature)
    ));
    assert_eq!(err.http_status(), 400);
    assert_eq!(job_rows(&h.pool).await, 0);
    assert_eq!(h.content.calls(), 0);
}

#[tokio::test]
async fn test_missing_metadata_creates_no_job() {
    let h = harness(FakeText::pages(3), FakeContent::items(5, 2)).await;

    let mut request = upload_request();
    request.school = None;
    request.year = Some(" ".into());

    let err = assert_err!(h.pipeline.submit(request).await);
    assert_eq!(err.to_string(), "Missing required fields: school, year");
    assert_eq!(job_rows(&h.pool).await, 0);
}

#[tokio::test]
async fn test_text_extraction_failure_marks_job_failed() {
    let h = harness(FakeText::failing("xref table broken"), FakeContent::items(5, 2)).await;

    let handle = assert_ok!(h.pipeline.submit(upload_request()).await);
    let job_id = handle.job_id.clone();
    let outcome = assert_ok!(handle.wait().await);

    match outcome {
        StageOutcome::Failed { stage, message } => {
            assert_eq!(stage, Stage::TextExtraction);
            assert!(message.starts_with("PDF extraction failed:"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let job = h.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.page_count, None);
    assert!(job
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("PDF extraction failed:"));
    assert_eq!(h.content.calls(), 0);
}

#[tokio::test]
async fn test_empty_ai_result_marks_job_failed() {
    let h = harness(FakeText::pages(3), FakeContent::items(0, 0)).await;

    let handle = h.pipeline.submit(upload_request()).await.unwrap();
    let job_id = handle.job_id.clone();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(
        outcome,
        StageOutcome::Failed {
            stage: Stage::EmptyResult,
            message: "No questions found in PDF".into()
        }
    );

    let status = h.pipeline.job_status(&job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.progress, None);
    assert_eq!(status.error_message.as_deref(), Some("No questions found in PDF"));
    // 页数在 AI 阶段之前已经写入，失败后保留
    assert_eq!(status.page_count, Some(3));
}

#[tokio::test]
async fn test_ai_failure_keeps_page_count() {
    let h = harness(FakeText::pages(4), FakeContent::failing("rate limited")).await;

    let handle = h.pipeline.submit(upload_request()).await.unwrap();
    let job_id = handle.job_id.clone();
    handle.wait().await.unwrap();

    let job = h.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.page_count, Some(4));
    let message = job.error_message.unwrap();
    assert!(message.starts_with("AI extraction failed:"));
    assert!(message.contains("rate limited"));
}

#[tokio::test]
async fn test_panicking_extractor_marks_job_failed() {
    let h = harness(FakeText::pages(2), FakeContent::panicking()).await;

    let handle = assert_ok!(h.pipeline.submit(upload_request()).await);
    let job_id = handle.job_id.clone();
    let outcome = assert_ok!(handle.wait().await);

    match outcome {
        StageOutcome::Failed { stage, message } => {
            assert_eq!(stage, Stage::Aborted);
            assert!(message.starts_with("Internal error:"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let status = h.pipeline.job_status(&job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.page_count, Some(2));
    assert!(status
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("Internal error: import task aborted:"));
}

#[tokio::test]
async fn test_page_limit_rechecked_before_ai() {
    let h = harness(FakeText::pages(51), FakeContent::items(5, 2)).await;

    let handle = h.pipeline.submit(upload_request()).await.unwrap();
    let job_id = handle.job_id.clone();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(
        outcome,
        StageOutcome::Failed {
            stage: Stage::PageLimit,
            message: "Page limit exceeded: 51 pages (maximum 50)".into()
        }
    );
    assert_eq!(h.content.calls(), 0);

    let job = h.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.page_count, Some(51));
}

#[tokio::test]
async fn test_page_limit_recheck_can_be_disabled() {
    let h = harness_with(FakeText::pages(51), FakeContent::items(1, 0), &[], false).await;

    let handle = h.pipeline.submit(upload_request()).await.unwrap();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(
        outcome,
        StageOutcome::ReadyForReview {
            questions: 1,
            lessons: 0
        }
    );
}

#[tokio::test]
async fn test_successful_extraction_is_ready_for_review() {
    let h = harness(FakeText::pages(6), FakeContent::items(5, 2)).await;

    let handle = h.pipeline.submit(upload_request()).await.unwrap();
    let job_id = handle.job_id.clone();
    let outcome = handle.wait().await.unwrap();
    assert_eq!(
        outcome,
        StageOutcome::ReadyForReview {
            questions: 5,
            lessons: 2
        }
    );

    let status = h.pipeline.job_status(&job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::ReadyForReview);
    assert_eq!(status.progress, Some(100));
    assert_eq!((status.questions_count, status.lessons_count), (5, 2));
    assert_eq!(status.page_count, Some(6));
    assert_eq!(status.error_message, None);

    let content = h.review.fetch_for_review(&job_id).await.unwrap();
    assert_eq!(content.questions.len(), 5);
    assert_eq!(content.lessons.len(), 2);
    assert_eq!(content.metadata.school, "Riverside High");
    assert_eq!(content.metadata.total_pages, Some(6));

    // 读取审核内容不改变任务
    let again = h.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(again.status, JobStatus::ReadyForReview);
    assert!(again.extracted_payload.is_some());
}

#[tokio::test]
async fn test_fetch_for_review_requires_ready_state() {
    let h = harness(FakeText::failing("broken"), FakeContent::items(5, 2)).await;

    let handle = h.pipeline.submit(upload_request()).await.unwrap();
    let job_id = handle.job_id.clone();
    handle.wait().await.unwrap();

    let err = h.review.fetch_for_review(&job_id).await.unwrap_err();
    assert!(matches!(
        err,
        ImportError::StateMismatch {
            expected: JobStatus::ReadyForReview,
            actual: JobStatus::Failed,
            ..
        }
    ));
    assert_eq!(err.http_status(), 400);

    let err = h.review.fetch_for_review("no-such-job").await.unwrap_err();
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn test_commit_tolerates_single_item_failure() {
    // 第 3 道题（位置 2）保存失败
    let h = harness_with(FakeText::pages(2), FakeContent::items(5, 2), &[2], true).await;

    let handle = h.pipeline.submit(upload_request()).await.unwrap();
    let job_id = handle.job_id.clone();
    handle.wait().await.unwrap();

    let content = h.review.fetch_for_review(&job_id).await.unwrap();
    let request = CommitRequest {
        questions: content.questions,
        lessons: content.lessons,
        metadata: Some(content.metadata),
    };
    let result = assert_ok!(h.review.commit(&job_id, request).await);

    assert_eq!(result.saved_questions, 4);
    assert_eq!(result.saved_lessons, 2);
    assert_eq!(result.failed_items.len(), 1);
    assert_eq!(result.failed_items[0].position, 2);

    let job = h.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!((job.questions_count, job.lessons_count), (4, 2));
    assert!(job.extracted_payload.is_none());
    assert!(job.completed_at.is_some());
    assert!(job.invariant_violations().is_empty());

    assert_eq!(h.catalog.count_questions(&job_id).await.unwrap(), 4);
    assert_eq!(h.catalog.count_lessons(&job_id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_commit_with_every_item_failing_still_completes() {
    let h = harness_with(FakeText::pages(1), FakeContent::items(2, 0), &[0, 1], true).await;

    let handle = h.pipeline.submit(upload_request()).await.unwrap();
    let job_id = handle.job_id.clone();
    handle.wait().await.unwrap();

    let content = h.review.fetch_for_review(&job_id).await.unwrap();
    let request = CommitRequest {
        questions: content.questions,
        lessons: vec![],
        metadata: None,
    };
    let result = h.review.commit(&job_id, request).await.unwrap();

    assert_eq!((result.saved_questions, result.saved_lessons), (0, 0));
    let job = h.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_second_commit_is_rejected_without_double_counting() {
    let h = harness(FakeText::pages(2), FakeContent::items(3, 1)).await;

    let handle = h.pipeline.submit(upload_request()).await.unwrap();
    let job_id = handle.job_id.clone();
    handle.wait().await.unwrap();

    let content = h.review.fetch_for_review(&job_id).await.unwrap();
    let request = CommitRequest {
        questions: content.questions,
        lessons: content.lessons,
        metadata: None,
    };
    h.review.commit(&job_id, request.clone()).await.unwrap();

    let err = h.review.commit(&job_id, request).await.unwrap_err();
    assert!(matches!(
        err,
        ImportError::StateMismatch {
            actual: JobStatus::Completed,
            ..
        }
    ));
    assert_eq!(h.catalog.count_questions(&job_id).await.unwrap(), 3);
    assert_eq!(h.catalog.count_lessons(&job_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_commit_rejects_more_items_than_found() {
    let h = harness(FakeText::pages(2), FakeContent::items(2, 0)).await;

    let handle = h.pipeline.submit(upload_request()).await.unwrap();
    let job_id = handle.job_id.clone();
    handle.wait().await.unwrap();

    let mut content = h.review.fetch_for_review(&job_id).await.unwrap();
    content.questions.push(content.questions[0].clone());
    let request = CommitRequest {
        questions: content.questions,
        lessons: vec![],
        metadata: None,
    };

    let err = h.review.commit(&job_id, request).await.unwrap_err();
    assert!(matches!(
        err,
        ImportError::Validation(ValidationError::TooManyItems {
            submitted: 3,
            found: 2,
            ..
        })
    ));
    let job = h.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::ReadyForReview);
}

#[tokio::test]
async fn test_commit_unknown_job_is_not_found() {
    let h = harness(FakeText::pages(2), FakeContent::items(2, 0)).await;
    let err = h
        .review
        .commit("missing", CommitRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn test_every_failure_point_leaves_a_message() {
    // 在每个阶段注入失败，failed 任务总带有非空信息，且状态只会是四种之一
    let cases: Vec<(FakeText, FakeContent)> = vec![
        (FakeText::failing(""), FakeContent::items(1, 1)),
        (FakeText::failing("bad stream"), FakeContent::items(1, 1)),
        (FakeText::pages(99), FakeContent::items(1, 1)),
        (FakeText::pages(1), FakeContent::failing("")),
        (FakeText::pages(1), FakeContent::failing("timeout")),
        (FakeText::pages(1), FakeContent::items(0, 0)),
        (FakeText::pages(1), FakeContent::items(0, 1)),
        (FakeText::pages(1), FakeContent::items(1, 0)),
    ];

    for (text, content) in cases {
        let h = harness(text, content).await;
        let handle = h.pipeline.submit(upload_request()).await.unwrap();
        let job_id = handle.job_id.clone();
        handle.wait().await.unwrap();

        let job = h.jobs.get(&job_id).await.unwrap().unwrap();
        assert!(JobStatus::ALL.contains(&job.status));
        assert!(job.invariant_violations().is_empty(), "{:?}", job);
        match job.status {
            JobStatus::Failed => {
                assert!(!job.error_message.unwrap_or_default().is_empty())
            }
            JobStatus::ReadyForReview => {
                assert!(job.questions_count + job.lessons_count >= 1)
            }
            other => panic!("unexpected status {}", other),
        }
    }
}

#[tokio::test]
async fn test_concurrent_jobs_are_independent() {
    let h = harness(FakeText::pages(2), FakeContent::items(3, 1)).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        handles.push(h.pipeline.submit(upload_request()).await.unwrap());
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.job_id.clone());
        assert_eq!(
            handle.wait().await.unwrap(),
            StageOutcome::ReadyForReview {
                questions: 3,
                lessons: 1
            }
        );
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(h.content.calls(), 8);
}
