//! Camera adapter against a mock camera server.

use std::time::{Duration, Instant};

use fire_sentinel::capture::{CaptureError, EvidenceSource, HttpEvidenceSource};
use fire_sentinel::config::CaptureConfig;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, dir: &TempDir) -> CaptureConfig {
    CaptureConfig {
        camera_url: server.uri(),
        capture_timeout_ms: 500,
        audio_duration_ms: 300,
        image_path: dir.path().join("evidence/foto_incendio.jpg"),
        audio_path: dir.path().join("evidence/audio_incendio.wav"),
    }
}

async fn mount(server: &MockServer, resource: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(resource))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_capture_writes_both_artifacts() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount(
        &server,
        "/shot.jpg",
        ResponseTemplate::new(200).set_body_bytes(b"\xff\xd8jpeg".to_vec()),
    )
    .await;
    mount(
        &server,
        "/audio.wav",
        ResponseTemplate::new(200).set_body_bytes(b"RIFFwave".to_vec()),
    )
    .await;

    let source = HttpEvidenceSource::new(&config(&server, &dir));
    let report = source.capture().await;

    let image = report.image.as_ref().unwrap();
    let audio = report.audio.as_ref().unwrap();
    assert_eq!(std::fs::read(image).unwrap(), b"\xff\xd8jpeg");
    assert_eq!(std::fs::read(audio).unwrap(), b"RIFFwave");

    let evidence = report.evidence();
    assert!(!evidence.is_empty());
    assert!(!evidence.is_partial());
}

#[tokio::test]
async fn test_failed_leg_leaves_other_intact() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount(
        &server,
        "/shot.jpg",
        ResponseTemplate::new(200).set_body_bytes(b"img".to_vec()),
    )
    .await;
    mount(&server, "/audio.wav", ResponseTemplate::new(503)).await;

    let source = HttpEvidenceSource::new(&config(&server, &dir));
    let report = source.capture().await;

    assert!(report.image.is_ok());
    assert!(matches!(report.audio, Err(CaptureError::Status(503))));
    assert!(report.evidence().is_partial());
}

#[tokio::test]
async fn test_slow_camera_times_out() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount(
        &server,
        "/shot.jpg",
        ResponseTemplate::new(200)
            .set_body_bytes(b"img".to_vec())
            .set_delay(Duration::from_secs(3)),
    )
    .await;

    let source = HttpEvidenceSource::new(&config(&server, &dir));
    let err = source.take_photo().await.unwrap_err();
    assert!(matches!(err, CaptureError::Timeout(_)));
}

#[tokio::test]
async fn test_empty_image_is_an_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount(&server, "/shot.jpg", ResponseTemplate::new(200)).await;

    let source = HttpEvidenceSource::new(&config(&server, &dir));
    assert!(matches!(
        source.take_photo().await,
        Err(CaptureError::Empty)
    ));
}

#[tokio::test]
async fn test_capture_overwrites_previous_artifact() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server, &dir);
    std::fs::create_dir_all(config.image_path.parent().unwrap()).unwrap();
    std::fs::write(&config.image_path, b"previous episode").unwrap();
    mount(
        &server,
        "/shot.jpg",
        ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()),
    )
    .await;

    let source = HttpEvidenceSource::new(&config);
    let path = source.take_photo().await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"new");
}

#[tokio::test]
async fn test_unreachable_camera_fails_both_legs() {
    let dir = tempfile::tempdir().unwrap();
    let config = CaptureConfig {
        camera_url: "http://127.0.0.1:1".into(),
        capture_timeout_ms: 500,
        audio_duration_ms: 300,
        image_path: dir.path().join("foto.jpg"),
        audio_path: dir.path().join("audio.wav"),
    };
    let report = HttpEvidenceSource::new(&config).capture().await;
    assert!(report.image.is_err());
    assert!(report.audio.is_err());
    assert!(report.evidence().is_empty());
}

/// Camera whose audio endpoint streams chunks until the client hangs up.
async fn endless_audio_camera() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 1024];
                if socket.read(&mut request).await.is_err() {
                    return;
                }
                let head = "HTTP/1.1 200 OK\r\n\
                            Content-Type: audio/wav\r\n\
                            Transfer-Encoding: chunked\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                loop {
                    if socket.write_all(b"4\r\nRIFF\r\n").await.is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            });
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_endless_audio_stream_is_cut_at_duration() {
    let dir = tempfile::tempdir().unwrap();
    let config = CaptureConfig {
        camera_url: endless_audio_camera().await,
        capture_timeout_ms: 500,
        audio_duration_ms: 300,
        image_path: dir.path().join("foto.jpg"),
        audio_path: dir.path().join("audio.wav"),
    };

    let started = Instant::now();
    let path = HttpEvidenceSource::new(&config)
        .record_audio()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300), "stopped early: {elapsed:?}");
    assert!(
        elapsed < Duration::from_millis(800),
        "recording overran its duration: {elapsed:?}"
    );
    let recorded = std::fs::read(path).unwrap();
    assert!(!recorded.is_empty());
    assert!(recorded.starts_with(b"RIFF"));
}
