//! HTTP surface tests, driven with `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image::{DynamicImage, GrayImage, Luma};
use ocr_digitizer::engine::RecognitionOptions;
use ocr_digitizer::{
    api, DocumentPipeline, EngineError, JobOrchestrator, OcrError, PageRasterizer, PageSplitter,
    RawToken, RecognitionEngine, ServiceConfig,
};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "ocr-test-boundary";

struct FakeEngine {
    installed: bool,
}

impl RecognitionEngine for FakeEngine {
    fn transcribe(
        &self,
        _: &GrayImage,
        _: &str,
        _: &RecognitionOptions,
    ) -> Result<String, EngineError> {
        Ok("hello".into())
    }

    fn tokenize(
        &self,
        _: &GrayImage,
        _: &str,
        _: &RecognitionOptions,
    ) -> Result<Vec<RawToken>, EngineError> {
        Ok(Vec::new())
    }

    fn version(&self) -> Result<String, EngineError> {
        if self.installed {
            Ok("5.3.0".into())
        } else {
            Err(EngineError::NotAvailable("tesseract not found".into()))
        }
    }
}

struct NoPdf;

impl PageRasterizer for NoPdf {
    fn rasterize(&self, path: &Path, _dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
        Err(OcrError::CorruptPdf {
            path: path.to_path_buf(),
            detail: "test rasteriser".into(),
        })
    }
}

struct TestApp {
    router: Router,
    orchestrator: Arc<JobOrchestrator>,
    _uploads: tempfile::TempDir,
}

fn app_with(installed: bool, max_batch_size: usize) -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let config = Arc::new(
        ServiceConfig::builder()
            .upload_dir(uploads.path())
            .max_batch_size(max_batch_size)
            .image_dimension_bounds(50, 400)
            .build()
            .unwrap(),
    );
    let splitter = PageSplitter::new(Arc::new(NoPdf), config.pdf_dpi);
    let pipeline =
        DocumentPipeline::with_engine(&config, Arc::new(FakeEngine { installed }), splitter);
    let orchestrator = Arc::new(JobOrchestrator::new(Arc::clone(&config), Arc::new(pipeline)));
    let router = api::router(api::AppState::new(Arc::clone(&orchestrator), config));
    TestApp {
        router,
        orchestrator,
        _uploads: uploads,
    }
}

fn app() -> TestApp {
    app_with(true, 3)
}

fn png_bytes() -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(GrayImage::from_pixel(80, 60, Luma([230])))
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn multipart(files: &[(&str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, data) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/ocr/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn unknown_job_is_404() {
    let app = app();
    let id = uuid::Uuid::new_v4();
    let response = app
        .router
        .oneshot(get(&format!("/api/ocr/result/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["detail"], "Job not found");
}

#[tokio::test]
async fn malformed_job_id_is_404() {
    let app = app();
    let response = app
        .router
        .oneshot(get("/api/ocr/result/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_batch_is_rejected_without_creating_a_job() {
    let app = app_with(true, 2);
    let png = png_bytes();
    let response = app
        .router
        .oneshot(multipart(&[
            ("a.png", png.as_slice()),
            ("b.png", png.as_slice()),
            ("c.png", png.as_slice()),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.orchestrator.store().len(), 0);
    let body = json(response).await;
    assert_eq!(body["code"], "TOO_MANY_FILES");
}

#[tokio::test]
async fn empty_upload_is_rejected() {
    let app = app();
    // A form with only a non-file field carries no uploads.
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/ocr/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["detail"], "No files provided");
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let app = app();
    let response = app
        .router
        .oneshot(multipart(&[("notes.txt", &b"plain text"[..])]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.orchestrator.store().len(), 0);
    let detail = json(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Invalid file: notes.txt."), "{detail}");
}

#[tokio::test]
async fn upload_then_poll_then_delete() {
    let app = app();
    let png = png_bytes();

    let response = app
        .router
        .clone()
        .oneshot(multipart(&[("scan.png", png.as_slice())]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["status"], "processing");
    assert_eq!(body["files_count"], 1);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let mut result = serde_json::Value::Null;
    for _ in 0..400 {
        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/api/ocr/result/{job_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        result = json(response).await;
        if result["status"] != "processing" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    assert_eq!(result["status"], "completed");
    assert_eq!(result["job_id"], job_id.as_str());
    assert_eq!(result["results"][0]["filename"], "scan.png");
    assert_eq!(result["results"][0]["text"], "hello");
    assert_eq!(result["results"][0]["confidence"], 0.0);
    assert!(result["results"][0]["bbox_data"].as_array().unwrap().is_empty());
    assert!(result.get("error_message").is_none());

    let response = app
        .router
        .clone()
        .oneshot(delete(&format!("/api/ocr/job/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["message"], "Job deleted successfully");

    let response = app
        .router
        .oneshot(delete(&format!("/api/ocr/job/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_engine_version() {
    let app = app();
    let response = app.router.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tesseract_version"], "5.3.0");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn health_is_503_without_engine() {
    let app = app_with(false, 3);
    let response = app.router.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn supported_formats_lists_limits() {
    let app = app();
    let response = app
        .router
        .oneshot(get("/api/supported-formats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["max_batch_size"], 3);
    assert_eq!(body["max_file_size_mb"], 10);
    let exts: Vec<&str> = body["supported_extensions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(exts.contains(&".pdf"));
    assert!(body["supported_mime_types"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m == "image/webp"));
}
