#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use visit_ingest::analytics::AnalyticsHook;
use visit_ingest::db::Database;
use visit_ingest::media::{ImageUpload, MediaError, MediaHost, MediaResult, UploadedImage};
use visit_ingest::models::Visit;
use visit_ingest::{build_app, AppState};

pub const BOUNDARY: &str = "visit-ingest-test-boundary";

enum Outcome {
    Succeed,
    Reject { status: u16, message: String },
}

/// Media host stand-in that records every upload it receives.
pub struct FakeMediaHost {
    outcome: Outcome,
    calls: AtomicUsize,
    uploads: Mutex<Vec<ImageUpload>>,
}

impl FakeMediaHost {
    pub fn succeeding() -> Self {
        Self::with_outcome(Outcome::Succeed)
    }

    pub fn rejecting(status: u16, message: &str) -> Self {
        Self::with_outcome(Outcome::Reject {
            status,
            message: message.to_string(),
        })
    }

    fn with_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<ImageUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MediaHost for FakeMediaHost {
    async fn upload_image(&self, image: &ImageUpload) -> MediaResult<UploadedImage> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.uploads.lock().unwrap().push(image.clone());

        match &self.outcome {
            Outcome::Succeed => {
                let public_id = format!("visits/test-{n}");
                let secure_url = format!("https://res.cloudinary.com/demo/image/upload/{public_id}.jpg");
                let raw = json!({
                    "public_id": public_id,
                    "secure_url": secure_url,
                    "url": format!("http://res.cloudinary.com/demo/image/upload/{public_id}.jpg"),
                    "bytes": image.bytes.len(),
                    "format": "jpg",
                    "resource_type": "image",
                });
                Ok(UploadedImage {
                    image_url: secure_url,
                    public_id,
                    raw,
                })
            }
            Outcome::Reject { status, message } => Err(MediaError::Rejected {
                status: *status,
                message: message.clone(),
            }),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub media: Arc<FakeMediaHost>,
    database_url: String,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_media(FakeMediaHost::succeeding()).await
    }

    pub async fn with_media(media: FakeMediaHost) -> Self {
        Self::build(media, None).await
    }

    pub async fn with_analytics(hook: AnalyticsHook) -> Self {
        Self::build(FakeMediaHost::succeeding(), Some(hook)).await
    }

    async fn build(media: FakeMediaHost, analytics: Option<AnalyticsHook>) -> Self {
        // Every request opens its own connection, so the store has to be a file.
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let database_url = format!("sqlite:{}", dir.path().join("visits.db").display());

        let db = Database::from_url(&database_url).expect("Invalid test database URL");
        db.migrate().await.expect("Failed to run migrations");

        let media = Arc::new(media);
        let state = AppState {
            db: db.clone(),
            media: media.clone(),
        };
        let router = build_app(state, 1024 * 1024, analytics);

        Self {
            router,
            db,
            media,
            database_url,
            _dir: dir,
        }
    }

    /// Send a request through the app and return the response.
    pub async fn request(&self, req: Request<Body>) -> Response {
        tower::ServiceExt::oneshot(self.router.clone(), req)
            .await
            .unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.request(req).await
    }

    /// Send a multipart POST built from `parts`.
    pub async fn post_multipart(&self, uri: &str, parts: &[Part<'_>]) -> Response {
        let req = Request::builder()
            .uri(uri)
            .method("POST")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.request(req).await
    }

    /// Upload a small JPEG for `name`, asserting success.
    pub async fn upload(&self, name: &str, comment: Option<&str>) -> Value {
        let jpeg = fake_jpeg(1024);
        let mut parts = vec![Part::Text("name", name)];
        if let Some(comment) = comment {
            parts.push(Part::Text("comment", comment));
        }
        parts.push(Part::photo("image/jpeg", &jpeg));

        let resp = self.post_multipart("/insert_data", &parts).await;
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp).await
    }

    pub async fn visits(&self) -> Vec<Visit> {
        self.db.list_visits().await.expect("Failed to list visits")
    }

    /// Run raw SQL against the test store on a separate connection.
    pub async fn execute(&self, sql: &str) {
        let mut conn = sqlx::SqliteConnection::connect(&self.database_url)
            .await
            .expect("Failed to open test database");
        sqlx::query(sql)
            .execute(&mut conn)
            .await
            .expect("Failed to execute SQL");
        conn.close().await.unwrap();
    }
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: Option<&'a str>,
        bytes: &'a [u8],
    },
}

impl<'a> Part<'a> {
    pub fn photo(content_type: &'a str, bytes: &'a [u8]) -> Self {
        Part::File {
            name: "photo",
            filename: "photo.jpg",
            content_type: Some(content_type),
            bytes,
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                    )
                    .as_bytes(),
                );
                if let Some(content_type) = content_type {
                    body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
                }
                body.extend_from_slice(b"\r\n");
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// JPEG magic followed by filler, `len` bytes in total.
pub fn fake_jpeg(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.resize(len.max(4), 0xAB);
    bytes
}

/// Read the full response body as a String.
pub async fn body_string(resp: Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(resp: Response) -> Value {
    serde_json::from_str(&body_string(resp).await).unwrap()
}
