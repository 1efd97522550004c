mod common;

use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{harness, pdf_bytes, FakeContent, FakeText};
use paper_import::clients::{ImportClient, PollOutcome, StatusPoller, UploadForm};
use paper_import::models::JobStatus;
use paper_import::server::{router, AppState};
use paper_import::services::CommitRequest;

/// 在随机端口上启动服务，返回 base URL
async fn spawn_server(text: FakeText, content: FakeContent) -> String {
    let h = harness(text, content).await;
    let app = router(AppState::new(h.pipeline), 10 * 1024 * 1024);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn write_pdf() -> PathBuf {
    let path = std::env::temp_dir().join(format!("paper-import-{}.pdf", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, pdf_bytes()).await.unwrap();
    path
}

fn form() -> UploadForm {
    UploadForm {
        school: "Riverside High".into(),
        year: 2024,
        exam_type: "final".into(),
        paper_number: Some(1),
    }
}

#[tokio::test]
async fn test_client_upload_review_commit() {
    let base_url = spawn_server(FakeText::pages(3), FakeContent::items(3, 1)).await;
    let client = ImportClient::new(&base_url);
    let path = write_pdf().await;

    let submitted = client.upload(&path, &form()).await.unwrap();
    tokio::fs::remove_file(&path).await.unwrap();
    assert_eq!(submitted.status, JobStatus::Processing);

    let poller = StatusPoller::new(Duration::from_millis(20), 250, 3);
    let outcome = poller
        .poll(&client, &submitted.job_id, &CancellationToken::new(), |_| {})
        .await;
    match outcome {
        PollOutcome::Ready(view) => {
            assert_eq!(view.questions_count, 3);
            assert_eq!(view.page_count, Some(3));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let content = client.fetch_review(&submitted.job_id).await.unwrap();
    assert_eq!(content.questions.len(), 3);
    assert_eq!(content.lessons.len(), 1);

    let result = client
        .commit(&submitted.job_id, &CommitRequest::from(content))
        .await
        .unwrap();
    assert_eq!(result.saved_questions, 3);
    assert_eq!(result.saved_lessons, 1);
    assert!(result.failed_items.is_empty());

    let status = client.fetch_status(&submitted.job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);

    // 已完成的任务不能再次提交
    let err = client
        .commit(&submitted.job_id, &CommitRequest::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("[state_mismatch]"), "{}", err);
}

#[tokio::test]
async fn test_client_surfaces_error_envelope() {
    let base_url = spawn_server(FakeText::pages(1), FakeContent::items(1, 0)).await;
    let client = ImportClient::new(base_url);

    let err = client.fetch_review("ghost").await.unwrap_err();
    assert!(err.to_string().starts_with("HTTP 404 [not_found]"), "{}", err);
}
