#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use file_encryptor_web::config::AppConfig;
use file_encryptor_web::models::{TransformRequest, TransformResult};
use file_encryptor_web::services::storage::StorageArea;
use file_encryptor_web::services::transformer::{ExternalTool, Transformer};
use file_encryptor_web::{AppState, create_app};
use http_body_util::BodyExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Copies input to output.
pub const COPY_TOOL: &str = r#"cp "$2" "$3""#;

/// ROT13 both ways, so decrypt(encrypt(x)) == x and the ciphertext differs.
pub const ROT13_TOOL: &str = r#"tr 'A-Za-z' 'N-ZA-Mn-za-m' < "$2" > "$3""#;

pub const BAD_KEY_TOOL: &str = "echo 'bad key' >&2; exit 1";

pub struct TestApp {
    pub dir: TempDir,
    pub app: Router,
    pub storage: Arc<StorageArea>,
}

impl TestApp {
    pub async fn new(transformer: Arc<dyn Transformer>) -> Self {
        Self::with_config(transformer, |_| {}).await
    }

    pub async fn with_config(
        transformer: Arc<dyn Transformer>,
        customize: impl FnOnce(&mut AppConfig),
    ) -> Self {
        let dir = TempDir::new().unwrap();

        let mut config = AppConfig::development();
        config.storage_dir = dir.path().join("uploads");
        config.public_dir = dir.path().join("public");
        customize(&mut config);

        let storage = Arc::new(
            StorageArea::open(&config.storage_dir, config.max_file_size)
                .await
                .unwrap(),
        );

        let state = AppState {
            storage: storage.clone(),
            transformer,
            config,
        };

        Self {
            dir,
            app: create_app(state),
            storage,
        }
    }

    /// Files currently present in the storage area.
    pub fn stored_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.storage.root())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

/// `sh -c <script> stub <op> <input> <output>`; arguments land in `$1..$3`.
pub fn shell_tool(script: &str) -> ExternalTool {
    ExternalTool::new("/bin/sh").with_args(["-c", script, "stub"])
}

pub fn shell_transformer(script: &str) -> Arc<dyn Transformer> {
    Arc::new(shell_tool(script))
}

pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
        Content-Type: application/octet-stream\r\n\r\n",
        boundary = BOUNDARY,
        field = field,
        filename = filename,
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn text_field_body(field: &str, value: &str) -> Vec<u8> {
    format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"{field}\"\r\n\r\n\
        {value}\r\n\
        --{boundary}--\r\n",
        boundary = BOUNDARY,
        field = field,
        value = value,
    )
    .into_bytes()
}

pub fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn upload_request(uri: &str, filename: &str, content: &[u8]) -> Request<Body> {
    multipart_request(uri, multipart_body("file", filename, content))
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn content_disposition(response: &Response<Body>) -> String {
    response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

/// Records calls and always fails, for paths that must never reach the tool.
#[derive(Default)]
pub struct CountingTransformer {
    pub calls: AtomicUsize,
}

impl CountingTransformer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transformer for CountingTransformer {
    async fn run(&self, _request: &TransformRequest) -> TransformResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TransformResult::Failure {
            message: "unexpected call".to_string(),
        }
    }

    fn describe(&self) -> String {
        "counting".to_string()
    }
}
