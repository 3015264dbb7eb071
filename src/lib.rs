//! file-vault - a content-addressable file storage engine
//!
//! This crate stores files with:
//! - Deduplication by SHA-256 content hash, enforced by a unique index
//! - Transparent zstd compression of every stored artifact
//! - A folder hierarchy kept as materialized paths with cascading rename/delete
//! - Multi-candidate resolution of stored paths to on-disk artifacts
//! - redb embedded database for metadata (ACID, MVCC, crash-safe)

pub mod blob;
pub mod cache;
pub mod config;
pub mod context;
pub mod folders;
pub mod hasher;
pub mod metadata;
pub mod paths;
pub mod resolver;
pub mod service;
pub mod storage;
pub mod thumbnail;
#[cfg(test)]
pub mod testutil;

pub use context::RequestContext;
pub use service::{ErrorKind, FileService, ServiceError};
