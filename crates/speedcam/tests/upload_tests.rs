//! Upload flow against the in-memory server: local validation, progress
//! reporting and the hand-off to status polling.

mod common;

use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;

use common::{ConfigBuilder, FakeServer, Videos};
use speedcam::broadcast::{UploadPhase, UploadProgressEvent};
use speedcam::{JobId, JobStatus, SpeedcamError, UploadState, ValidationError};

fn drain(rx: &mut tokio::sync::broadcast::Receiver<UploadProgressEvent>) -> Vec<UploadProgressEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

/// Files the client must reject before sending anything.
struct RejectCase {
    name: &'static str,
    file: &'static str,
    size: usize,
}

const REJECT_CASES: &[RejectCase] = &[
    RejectCase {
        name: "unsupported_extension",
        file: "notes.txt",
        size: 64,
    },
    RejectCase {
        name: "empty_file",
        file: "empty.mp4",
        size: 0,
    },
    RejectCase {
        name: "over_size_limit",
        file: "huge.mov",
        size: 2048,
    },
];

#[tokio::test]
async fn test_invalid_files_never_reach_the_server() {
    let server = Arc::new(FakeServer::new());
    let client = ConfigBuilder::new().max_file_size(1024).client(&server);
    let videos = Videos::new();
    let controller = client.upload_controller();

    for case in REJECT_CASES {
        let path = videos.file(case.file, case.size);
        let err = controller.select(&path).await.unwrap_err();
        assert!(
            matches!(err, SpeedcamError::Validation(_)),
            "{}: unexpected error {:?}",
            case.name,
            err
        );
        assert!(controller.last_error().is_some(), "{}", case.name);
    }

    let err = controller.upload().await.unwrap_err();
    assert!(matches!(
        err,
        SpeedcamError::Validation(ValidationError::NoFileSelected)
    ));
    assert_eq!(server.total(), 0);
}

#[tokio::test]
async fn test_extension_check_is_case_insensitive() {
    let server = Arc::new(FakeServer::new());
    let client = ConfigBuilder::new().client(&server);
    let videos = Videos::new();

    let selected = client
        .upload_controller()
        .select(videos.file("DASHCAM.MP4", 16))
        .await
        .unwrap();
    assert_eq!(selected.extension(), ".mp4");
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_monotonic_and_hands_off_to_polling() {
    let server = Arc::new(FakeServer::new());
    let client = ConfigBuilder::new().client(&server);
    let videos = Videos::new();
    let controller = client.upload_controller();
    let mut events = controller.subscribe();

    controller.select(videos.file("road.mp4", 4096)).await.unwrap();
    assert_eq!(controller.state(), UploadState::Selecting);

    let mut handoff = controller.upload().await.unwrap();
    assert_eq!(handoff.job.id, JobId::new("1"));
    assert_eq!(handoff.job.status, JobStatus::Uploaded);
    assert_eq!(controller.state(), UploadState::HandedOff);
    assert_eq!(controller.progress(), 100);

    let events = drain(&mut events);
    assert_eq!(events.first().unwrap().phase, UploadPhase::Started);
    let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
    assert!(
        percents.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {:?}",
        percents
    );
    let last = events.last().unwrap();
    assert_eq!(last.phase, UploadPhase::Completed);
    assert_eq!(last.percent, 100);
    assert_eq!(last.job_id, Some(JobId::new("1")));
    assert!(events[..events.len() - 1].iter().all(|e| e.percent < 100));

    server.script(1, &[("processing", 50), ("completed", 100)]);
    let done = handoff.subscription.finished().await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(client.store().job(&JobId::new("1")).is_some());
}

#[tokio::test]
async fn test_server_rejection_returns_to_selecting() {
    let server = Arc::new(FakeServer::new());
    server.fail_uploads(507, "Disk full");
    let client = ConfigBuilder::new().client(&server);
    let videos = Videos::new();
    let controller = client.upload_controller();
    let mut events = controller.subscribe();

    controller.select(videos.file("road.avi", 512)).await.unwrap();
    let err = controller.upload().await.unwrap_err();

    assert!(matches!(err, SpeedcamError::Http { status: 507, .. }));
    assert_eq!(controller.state(), UploadState::Selecting);
    assert_eq!(controller.last_error().as_deref(), Some("Disk full"));
    assert!(controller.selected().is_some());

    let events = drain(&mut events);
    let last = events.last().unwrap();
    assert_eq!(last.phase, UploadPhase::Failed);
    assert_eq!(last.error.as_deref(), Some("Disk full"));
}

#[tokio::test]
async fn test_reset_clears_selection() {
    let server = Arc::new(FakeServer::new());
    let client = ConfigBuilder::new().client(&server);
    let videos = Videos::new();
    let controller = client.upload_controller();

    controller.select(videos.file("road.mkv", 8)).await.unwrap();
    controller.reset().unwrap();

    assert_eq!(controller.state(), UploadState::Idle);
    assert!(controller.selected().is_none());
}
