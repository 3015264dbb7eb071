//! Content hashing for deduplication and thumbnail keys.

use std::path::Path;

use ring::digest::{Context, SHA256};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Hashing cancelled")]
    Cancelled,
}

/// Hash a stream incrementally, returning the lowercase hex SHA-256 digest.
pub async fn hash_reader<R>(mut reader: R, cancel: &CancellationToken) -> Result<String, HashError>
where
    R: AsyncRead + Unpin,
{
    let mut context = Context::new(&SHA256);
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(HashError::Cancelled);
        }
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        context.update(&buf[..n]);
    }

    Ok(hex::encode(context.finish().as_ref()))
}

/// Hash the file at `path` as it is on disk (compressed artifacts are hashed
/// as their compressed bytes).
pub async fn hash_file(path: &Path, cancel: &CancellationToken) -> Result<String, HashError> {
    let file = tokio::fs::File::open(path).await?;
    hash_reader(file, cancel).await
}

/// Hash an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(ring::digest::digest(&SHA256, data).as_ref())
}
