use crate::AppState;
use crate::api::error::AppError;
use crate::models::{Operation, TransformRequest, TransformResult, UploadedFile};
use crate::services::storage::{TempFiles, derive_output_path};
use crate::utils::filename::{attachment_disposition, sanitize_filename};
use axum::{
    body::Body,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::{StatusCode, header},
    response::Response,
};
use futures::{StreamExt, TryStreamExt};
use std::io;
use tokio::fs::File;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, info, warn};

/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

#[utoipa::path(
    post,
    path = "/encrypt",
    request_body(content = crate::models::TransformUpload, content_type = "multipart/form-data", description = "File to encrypt"),
    responses(
        (status = 200, description = "Encrypted file stream, named <original>.encrypted"),
        (status = 400, description = "No file provided", body = crate::models::ErrorResponse),
        (status = 413, description = "Upload too large", body = crate::models::ErrorResponse),
        (status = 500, description = "Storage or transform failure", body = crate::models::ErrorResponse)
    ),
    tag = "transform"
)]
pub async fn encrypt_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    transform_upload(state, Operation::Encrypt, multipart).await
}

#[utoipa::path(
    post,
    path = "/decrypt",
    request_body(content = crate::models::TransformUpload, content_type = "multipart/form-data", description = "File to decrypt"),
    responses(
        (status = 200, description = "Decrypted file stream, trailing .encrypted removed from the name"),
        (status = 400, description = "No file provided", body = crate::models::ErrorResponse),
        (status = 413, description = "Upload too large", body = crate::models::ErrorResponse),
        (status = 500, description = "Storage or transform failure", body = crate::models::ErrorResponse)
    ),
    tag = "transform"
)]
pub async fn decrypt_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    transform_upload(state, Operation::Decrypt, multipart).await
}

/// Upload, transform and stream back one file.
///
/// Every path created for the request is tracked by a `TempFiles` guard. On
/// any error the guard is dropped with the handler. On success it moves into
/// the response body and is dropped once the body is finished or abandoned.
#[tracing::instrument(skip_all, fields(operation = %operation))]
pub async fn transform_upload(
    state: AppState,
    operation: Operation,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let mut files = TempFiles::new(state.storage.clone());

    let upload = receive_upload(&state, &mut multipart, &mut files)
        .await?
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    info!(
        "📥 {} '{}' ({} bytes)",
        operation, upload.original_name, upload.size
    );

    let output_path = derive_output_path(&upload.path, operation.output_suffix());
    files.track(&output_path);

    let request = TransformRequest {
        operation,
        input_path: upload.path.clone(),
        output_path,
    };

    let output_path = match state.transformer.run(&request).await {
        TransformResult::Success { output_path } => output_path,
        TransformResult::Failure { message } => return Err(AppError::Transform(message)),
        TransformResult::TimedOut { after } => return Err(AppError::TransformTimeout(after)),
    };
    debug!("Transform finished, delivering {}", output_path.display());

    let file = File::open(&output_path)
        .await
        .map_err(|e| AppError::Delivery(format!("cannot open {}: {}", output_path.display(), e)))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| AppError::Delivery(format!("cannot stat {}: {}", output_path.display(), e)))?
        .len();

    let delivery_name = operation.delivery_name(&upload.original_name);
    let content_disposition = attachment_disposition(&delivery_name);

    let delivery = Delivery {
        files,
        name: delivery_name,
        completed: false,
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.as_ref())
        .header(header::CONTENT_LENGTH, length)
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .body(stream_output(file, delivery))
        .map_err(|e| AppError::Delivery(e.to_string()))
}

/// Streams the `file` field into the storage area. Returns `None` when the form
/// has no such field.
async fn receive_upload(
    state: &AppState,
    multipart: &mut Multipart,
    files: &mut TempFiles,
) -> Result<Option<UploadedFile>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = sanitize_filename(field.file_name().unwrap_or_default());
        let body = field.map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err));
        let reader = StreamReader::new(body);

        let upload = state.storage.allocate_input(&original_name, reader).await?;
        files.track(&upload.path);
        return Ok(Some(upload));
    }

    Ok(None)
}

/// Owns the request's temporary files for the lifetime of the response body.
struct Delivery {
    files: TempFiles,
    name: String,
    completed: bool,
}

impl Delivery {
    fn complete(&mut self) {
        self.completed = true;
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.completed {
            info!("📤 Delivered '{}'", self.name);
        } else {
            warn!(
                "Delivery error: '{}' was not fully sent, releasing {} temporary files",
                self.name,
                self.files.paths().len()
            );
        }
    }
}

fn stream_output(file: File, mut delivery: Delivery) -> Body {
    let stream = async_stream::stream! {
        let mut chunks = ReaderStream::new(file);
        let mut failed = false;

        while let Some(chunk) = chunks.next().await {
            if let Err(e) = &chunk {
                warn!("Delivery error while streaming '{}': {}", delivery.name, e);
                failed = true;
            }
            yield chunk;
            if failed {
                break;
            }
        }

        if !failed {
            delivery.complete();
        }
    };

    Body::from_stream(stream)
}
