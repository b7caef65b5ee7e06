//! Chunked upload handler.

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::multipart::{Multipart, MultipartRejection};
use tracing::debug;

use crate::response::{ApiError, ApiResult, ok};
use crate::server::AppState;
use crate::upload::UploadKey;

/// Multipart fields of one chunk.
#[derive(Debug, Default)]
struct ChunkForm {
    file: Option<Bytes>,
    filename: Option<String>,
    file_hash: Option<String>,
    chunks: Option<u32>,
    chunk: Option<u32>,
}

fn parse_number(field: &str, value: &str) -> Result<u32, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("`{field}` must be a non-negative integer")))
}

fn missing(field: &str) -> ApiError {
    ApiError::bad_request(format!("`{field}` is required"))
}

async fn read_form(mut multipart: Multipart) -> Result<ChunkForm, ApiError> {
    let mut form = ChunkForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => form.file = Some(field.bytes().await?),
            "filename" => form.filename = Some(field.text().await?),
            "fileHash" => form.file_hash = Some(field.text().await?),
            "chunks" => form.chunks = Some(parse_number("chunks", &field.text().await?)?),
            "chunk" => form.chunk = Some(parse_number("chunk", &field.text().await?)?),
            _ => {}
        }
    }
    Ok(form)
}

/// POST /api/upload
///
/// Stores one chunk. When the last missing chunk arrives the file is
/// assembled and its name in the shared directory is returned; before that
/// the data is an empty string.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<String> {
    let form = read_form(multipart?).await?;

    let file = form.file.ok_or_else(|| missing("file"))?;
    let filename = form.filename.ok_or_else(|| missing("filename"))?;
    let file_hash = form.file_hash.ok_or_else(|| missing("fileHash"))?;
    let chunks = form.chunks.ok_or_else(|| missing("chunks"))?;
    let chunk = form.chunk.ok_or_else(|| missing("chunk"))?;

    if chunks == 0 || chunk >= chunks {
        return Err(ApiError::bad_request(format!(
            "chunk {chunk} out of range for {chunks} chunks"
        )));
    }
    if file.len() > state.max_chunk_bytes {
        return Err(ApiError::bad_request(format!(
            "chunk exceeds {} bytes",
            state.max_chunk_bytes
        )));
    }

    let key = UploadKey::new(filename, file_hash)?;
    let registered = state.merger.store_chunk(&key, chunk, &file).await?;
    debug!(%key, chunk, chunks, registered, "Stored upload chunk");

    if registered < chunks as usize {
        return ok(String::new());
    }

    let merged = state.merger.merge(&key).await?;
    ok(merged.file_name().to_string())
}
