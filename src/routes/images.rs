//! Image routes
//!
//! Endpoints:
//! - POST /upload/image - Store the multipart field `image`, respond with its identifier
//! - GET /images/:name - Serve a stored image

use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        DefaultBodyLimit, Multipart, Path, Request, State,
    },
    http::header,
    response::Response,
    routing::{get, post},
    Router,
};

use super::not_found;
use crate::error::{AppError, Result};
use crate::images::IncomingImage;
use crate::state::AppState;

/// Multipart field carrying the upload
pub const IMAGE_FIELD: &str = "image";

/// Create the image router
pub fn router(body_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/upload/image",
            post(upload_image)
                .fallback(not_found)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/images/:name", get(fetch_image).fallback(not_found))
}

/// POST /upload/image
///
/// Responds with the bare identifier as text.
async fn upload_image(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<String> {
    let mut multipart = multipart.map_err(|e| AppError::InvalidInput(e.body_text()))?;

    let image = read_image_field(&mut multipart).await?;
    let id = state.images().accept(image).await?;

    Ok(id.into_string())
}

/// GET /images/:name
async fn fetch_image(
    State(state): State<AppState>,
    name: std::result::Result<Path<String>, axum::extract::rejection::PathRejection>,
    request: Request,
) -> Result<Response> {
    let Ok(Path(name)) = name else {
        return Err(AppError::NotFound);
    };

    state.images().fetch(&name, request).await
}

/// Find the image field and buffer its body
async fn read_image_field(multipart: &mut Multipart) -> Result<IncomingImage> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(e.body_text()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        // A part without a file name is a plain form value, not a file.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            return Err(AppError::InvalidInput(format!(
                "Field {} is not a file",
                IMAGE_FIELD
            )));
        };
        let content_type = field.content_type().map(str::to_string);
        let declared_size = declared_length(&field);

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(e.body_text()))?;

        return Ok(IncomingImage {
            file_name,
            content_type,
            declared_size: declared_size.unwrap_or(data.len() as u64),
            data,
        });
    }

    Err(AppError::InvalidInput(format!(
        "Missing file field: {}",
        IMAGE_FIELD
    )))
}

/// Part-level `Content-Length`, when the client sent one
fn declared_length(field: &Field<'_>) -> Option<u64> {
    field
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use std::path::Path as FsPath;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::IMAGE_FIELD;
    use crate::config::Config;
    use crate::images::{FixedClock, MAX_IMAGE_SIZE};
    use crate::state::AppState;
    use crate::storage::LocalImageStorage;

    const BOUNDARY: &str = "image-server-test-boundary";

    fn test_app(root: &FsPath, at: DateTime<Utc>) -> Router {
        let mut config = Config::default();
        config.storage.root = root.to_path_buf();

        let state = AppState::new(
            config,
            Arc::new(LocalImageStorage::new(root)),
            Arc::new(FixedClock(at)),
        );
        crate::app(state)
    }

    fn march_fifth() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-05T10:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn multipart_body(
        field: &str,
        file_name: &str,
        content_type: &str,
        extra_headers: &[(&str, &str)],
        data: &[u8],
    ) -> Vec<u8> {
        let mut part = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n",
            BOUNDARY, field, file_name, content_type
        );
        for (name, value) in extra_headers {
            part.push_str(&format!("{}: {}\r\n", name, value));
        }
        part.push_str("\r\n");

        let mut body = part.into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/upload/image")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn upload(file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        upload_request(multipart_body(IMAGE_FIELD, file_name, content_type, &[], data))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_upload_then_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let at = march_fifth();
        let app = test_app(temp_dir.path(), at);

        let (status, body) = send(&app, upload("photo.PNG", "image/png", b"0123456789")).await;
        assert_eq!(status, StatusCode::OK);

        let id = String::from_utf8(body).unwrap();
        let nanos = at.timestamp_nanos_opt().unwrap();
        assert_eq!(id, format!("{}-20240305.PNG", nanos));

        let (stem, rest) = id.split_once('-').unwrap();
        assert!(stem.bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(rest, "20240305.PNG");

        let stored = temp_dir
            .path()
            .join(format!("images/2024/03/05/{}.PNG", nanos));
        assert!(stored.is_file());

        let (status, body) = send(&app, get(&format!("/images/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"0123456789");
    }

    #[tokio::test]
    async fn test_fetch_supports_ranges() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(temp_dir.path(), march_fifth());

        let (_, body) = send(&app, upload("cat.png", "image/png", b"abcdefghij")).await;
        let id = String::from_utf8(body).unwrap();

        let request = Request::builder()
            .uri(format!("/images/{}", id))
            .header(header::RANGE, "bytes=0-3")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"abcd");
    }

    #[tokio::test]
    async fn test_rejects_non_image_type() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(temp_dir.path(), march_fifth());

        let (status, body) = send(&app, upload("doc.pdf", "application/pdf", b"%PDF")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Only image file is allowed");

        let (status, _) = send(&app, upload("odd.x", "imagefoo/x", b"data")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, upload("a.jpg", "image/jpeg", b"data")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_size_boundary() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(temp_dir.path(), march_fifth());

        let exact = vec![0u8; MAX_IMAGE_SIZE as usize];
        let (status, _) = send(&app, upload("big.png", "image/png", &exact)).await;
        assert_eq!(status, StatusCode::OK);

        let over = vec![0u8; MAX_IMAGE_SIZE as usize + 1];
        let (status, body) = send(&app, upload("bigger.png", "image/png", &over)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Max image size is 2MB");
    }

    #[tokio::test]
    async fn test_declared_part_length_is_used() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(temp_dir.path(), march_fifth());

        let declared = (MAX_IMAGE_SIZE + 1).to_string();
        let body = multipart_body(
            IMAGE_FIELD,
            "small.png",
            "image/png",
            &[("Content-Length", &declared)],
            b"tiny",
        );
        let (status, _) = send(&app, upload_request(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rejects_bad_forms() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(temp_dir.path(), march_fifth());

        let wrong_field = multipart_body("file", "photo.png", "image/png", &[], b"data");
        let (status, body) = send(&app, upload_request(wrong_field)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.is_empty());

        let not_multipart = Request::builder()
            .method(Method::POST)
            .uri("/upload/image")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _) = send(&app, not_multipart).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(!temp_dir.path().join("images").exists());
    }

    #[tokio::test]
    async fn test_not_found_has_empty_body() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(temp_dir.path(), march_fifth());

        for uri in [
            "/images/garbage",
            "/images/1-20240305.png",
            "/images/..%2F..%2Fsecret-20240305.png",
            "/somewhere/else",
            "/upload/image",
        ] {
            let (status, body) = send(&app, get(uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
            assert!(body.is_empty(), "{}", uri);
        }

        let delete = Request::builder()
            .method(Method::DELETE)
            .uri("/images/1-20240305.png")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, delete).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_overlong_name_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(temp_dir.path(), march_fifth());

        // Make the day directory exist so the lookup reaches the file name.
        let (status, _) = send(&app, upload("photo.png", "image/png", b"data")).await;
        assert_eq!(status, StatusCode::OK);

        let uri = format!("/images/{}-20240305.png", "9".repeat(300));
        let (status, body) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_uploads_do_not_collide() {
        let temp_dir = TempDir::new().unwrap();
        // Both requests observe the same clock reading.
        let app = test_app(temp_dir.path(), march_fifth());

        let (first, second) = tokio::join!(
            send(&app, upload("one.jpg", "image/jpeg", b"first")),
            send(&app, upload("two.jpg", "image/jpeg", b"second")),
        );
        assert_eq!(first.0, StatusCode::OK);
        assert_eq!(second.0, StatusCode::OK);

        let first_id = String::from_utf8(first.1).unwrap();
        let second_id = String::from_utf8(second.1).unwrap();
        assert_ne!(first_id, second_id);

        let (_, first_bytes) = send(&app, get(&format!("/images/{}", first_id))).await;
        let (_, second_bytes) = send(&app, get(&format!("/images/{}", second_id))).await;
        let mut contents = vec![first_bytes, second_bytes];
        contents.sort();
        assert_eq!(contents, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[tokio::test]
    async fn test_storage_failure_is_server_error() {
        let temp_dir = TempDir::new().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let app = test_app(temp_dir.path(), at);

        std::fs::create_dir_all(temp_dir.path().join("images")).unwrap();
        std::fs::write(temp_dir.path().join("images/2024"), b"").unwrap();

        let (status, _) = send(&app, upload("photo.png", "image/png", b"data")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
