use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use file_vault::blob::{BlobStore, BlobStoreError, LocalBlobStore, ReadBlob};
use file_vault::config::Config;
use file_vault::metadata::MimeMetadataExtractor;
use file_vault::resolver::PathResolver;
use file_vault::storage::models::{FileRecord, FileType};
use file_vault::storage::Database;
use file_vault::thumbnail::ImageThumbnailer;
use file_vault::{hasher, ErrorKind, FileService, RequestContext, ServiceError};
use tokio_util::sync::CancellationToken;

fn test_service(dir: &tempfile::TempDir) -> FileService {
    let mut config = Config::in_dir(dir.path());
    config.storage.use_recycle_bin = false;
    FileService::open(config).unwrap()
}

async fn write_source(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join("incoming").join(name);
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&path, content).await.unwrap();
    path
}

fn artifacts_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn storage_root(service: &FileService) -> PathBuf {
    service.config().storage.storage_root.clone()
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height))
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    png
}

/// Blob store that lets a competing upload of the same bytes commit its
/// record (and artifact) just before the first store completes.
struct RacingBlobStore {
    inner: LocalBlobStore,
    db: Database,
    raced: AtomicBool,
}

impl RacingBlobStore {
    async fn commit_competitor(&self, source: &Path, destination: &Path, cancel: &CancellationToken) {
        let hash = hasher::hash_file(source, cancel).await.unwrap();
        let folder = self.db.get_folder_by_path("Default").unwrap().unwrap();
        let physical = self
            .inner
            .store(source, &destination.with_file_name("other.txt"), cancel)
            .await
            .unwrap();

        let now = chrono::Utc::now();
        let record = FileRecord {
            id: "competitor".to_string(),
            path: "Default/other.txt".to_string(),
            original_name: "other.txt".to_string(),
            content_hash: hash,
            byte_size: std::fs::metadata(&physical).unwrap().len(),
            compressed: true,
            mime_type: "text/plain".to_string(),
            file_type: FileType::Document,
            created_at: now,
            updated_at: now,
            tags: Default::default(),
            folder_id: Some(folder.id),
            source_path: None,
            photo: None,
        };
        self.db.insert_file(&record).unwrap();
    }
}

#[async_trait]
impl BlobStore for RacingBlobStore {
    async fn store(
        &self,
        source: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, BlobStoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.commit_competitor(source, destination, cancel).await;
        }
        self.inner.store(source, destination, cancel).await
    }

    async fn read(
        &self,
        physical: &Path,
        compressed_hint: bool,
        cancel: &CancellationToken,
    ) -> Result<ReadBlob, BlobStoreError> {
        self.inner.read(physical, compressed_hint, cancel).await
    }

    async fn delete(&self, physical: &Path, send_to_recycle_bin: bool) -> Result<bool, BlobStoreError> {
        self.inner.delete(physical, send_to_recycle_bin).await
    }

    async fn relocate(&self, from: &Path, to: &Path) -> Result<(), BlobStoreError> {
        self.inner.relocate(from, to).await
    }

    async fn exists(&self, physical: &Path) -> Result<bool, BlobStoreError> {
        self.inner.exists(physical).await
    }
}

// ============================================================================
// Upload pipeline
// ============================================================================

#[tokio::test]
async fn test_reupload_of_same_source_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let source = write_source(&dir, "report.pdf", b"quarterly numbers").await;

    let first = service.upload(&ctx, &source, "report.pdf", None).await.unwrap();
    assert!(!first.is_duplicate);
    assert_eq!(first.stored_path, "Default/report.pdf");

    let second = service.upload(&ctx, &source, "report.pdf", None).await.unwrap();
    assert!(second.is_duplicate);
    assert_eq!(second.id, first.id);
    assert_eq!(second.stored_path, first.stored_path);

    let default_dir = storage_root(&service).join("Default");
    assert_eq!(artifacts_in(&default_dir), vec!["report.pdf.zst".to_string()]);
}

#[tokio::test]
async fn test_identical_content_is_rejected_as_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let one = write_source(&dir, "one.txt", b"same bytes").await;
    let two = write_source(&dir, "two.txt", b"same bytes").await;

    let first = service.upload(&ctx, &one, "one.txt", None).await.unwrap();
    let err = service.upload(&ctx, &two, "two.txt", None).await.unwrap_err();

    match &err {
        ServiceError::DuplicateContent {
            existing_id,
            existing_path,
        } => {
            assert_eq!(existing_id, &first.id);
            assert_eq!(existing_path, &first.stored_path);
        }
        other => panic!("expected duplicate content, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.is_duplicate_content());

    let default_dir = storage_root(&service).join("Default");
    assert_eq!(artifacts_in(&default_dir).len(), 1);
}

#[tokio::test]
async fn test_download_round_trips_content() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();

    let content: Vec<u8> = (0..200_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let source = write_source(&dir, "data.csv", &content).await;
    let outcome = service.upload(&ctx, &source, "data.csv", None).await.unwrap();

    let record = service.get_file(&outcome.id).unwrap();
    assert!(record.compressed);
    assert_eq!(record.original_name, "data.csv");
    assert_eq!(record.mime_type, "text/csv");

    let download = service.read_for_download(&ctx, &outcome.id).await.unwrap();
    assert_eq!(download.bytes.as_ref(), content.as_slice());
    assert_eq!(download.file_name, "data.csv");
    assert_eq!(download.mime_type, "text/csv");
}

#[tokio::test]
async fn test_upload_rejects_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();

    let err = service
        .upload(&ctx, Path::new("../etc/passwd"), "passwd", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PathValidation(_)));

    let err = service
        .upload(&ctx, Path::new("~/secrets.txt"), "secrets.txt", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_upload_missing_source_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let missing = dir.path().join("incoming").join("nope.txt");

    let err = service
        .upload(&RequestContext::default(), &missing, "nope.txt", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("nope.txt"));
}

#[tokio::test]
async fn test_upload_unreadable_source_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let plain = write_source(&dir, "plain.txt", b"not a directory").await;
    let source = plain.join("inner.txt");

    let err = service
        .upload(&RequestContext::default(), &source, "inner.txt", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    match err {
        ServiceError::NotFound { candidates, .. } => assert_eq!(candidates, vec![source]),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_duplicate_insert_is_duplicate_content() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::in_dir(dir.path());
    let db = Database::open(&config.storage.data_dir).unwrap();
    let blobs = Arc::new(RacingBlobStore {
        inner: LocalBlobStore::new(&config.storage.storage_root, 3).unwrap(),
        db: db.clone(),
        raced: AtomicBool::new(false),
    });
    let service = FileService::new(
        config,
        db,
        blobs,
        Arc::new(MimeMetadataExtractor),
        Arc::new(ImageThumbnailer),
    )
    .unwrap();
    let source = write_source(&dir, "mine.txt", b"same bytes").await;

    let err = service
        .upload(&RequestContext::default(), &source, "mine.txt", None)
        .await
        .unwrap_err();
    match err {
        ServiceError::DuplicateContent {
            existing_id,
            existing_path,
        } => {
            assert_eq!(existing_id, "competitor");
            assert_eq!(existing_path, "Default/other.txt");
        }
        other => panic!("expected duplicate content, got {other:?}"),
    }

    let default_dir = storage_root(&service).join("Default");
    assert_eq!(artifacts_in(&default_dir), vec!["other.txt.zst".to_string()]);
    assert_eq!(service.list_files(None).unwrap().len(), 1);
}

#[tokio::test]
async fn test_upload_with_unknown_folder_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let source = write_source(&dir, "a.txt", b"a").await;

    let outcome = service
        .upload(&ctx, &source, "a.txt", Some("no-such-folder"))
        .await
        .unwrap();
    assert_eq!(outcome.stored_path, "Default/a.txt");

    let default = service.folder_tree().get_by_path("Default").unwrap().unwrap();
    assert!(default.protected);
    assert_eq!(service.get_file(&outcome.id).unwrap().folder_id, Some(default.id));
}

#[tokio::test]
async fn test_upload_picks_free_name_for_colliding_display_name() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let one = write_source(&dir, "v1/notes.txt", b"version one").await;
    let two = write_source(&dir, "v2/notes.txt", b"version two").await;

    let first = service.upload(&ctx, &one, "notes.txt", None).await.unwrap();
    let second = service.upload(&ctx, &two, "notes.txt", None).await.unwrap();

    assert_eq!(first.stored_path, "Default/notes.txt");
    assert_eq!(second.stored_path, "Default/notes_1.txt");
    assert_eq!(service.get_file(&second.id).unwrap().original_name, "notes.txt");
}

#[tokio::test]
async fn test_cancelled_context_aborts_upload() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    ctx.cancel();
    let source = write_source(&dir, "a.txt", b"a").await;

    let err = service.upload(&ctx, &source, "a.txt", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(service.list_files(None).unwrap().is_empty());
}

// ============================================================================
// Files
// ============================================================================

#[tokio::test]
async fn test_rename_file_moves_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let a = write_source(&dir, "a.txt", b"alpha").await;
    let b = write_source(&dir, "b.txt", b"beta").await;
    let first = service.upload(&ctx, &a, "a.txt", None).await.unwrap();
    service.upload(&ctx, &b, "b.txt", None).await.unwrap();

    let renamed = service.rename_file(&ctx, &first.id, "renamed.txt").await.unwrap();
    assert_eq!(renamed.path, "Default/renamed.txt");
    assert_eq!(renamed.original_name, "renamed.txt");

    let default_dir = storage_root(&service).join("Default");
    assert_eq!(
        artifacts_in(&default_dir),
        vec!["b.txt.zst".to_string(), "renamed.txt.zst".to_string()]
    );
    let download = service.read_for_download(&ctx, &first.id).await.unwrap();
    assert_eq!(download.bytes.as_ref(), b"alpha");

    let err = service.rename_file(&ctx, &first.id, "b.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = service.rename_file(&ctx, &first.id, "../x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = service.rename_file(&ctx, &first.id, "  ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_rename_file_updates_mime_and_type() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let source = write_source(&dir, "p.png", &png_bytes(4, 4)).await;
    let outcome = service.upload(&ctx, &source, "p.png", None).await.unwrap();

    let renamed = service.rename_file(&ctx, &outcome.id, "notes.txt").await.unwrap();
    assert_eq!(renamed.mime_type, "text/plain");
    assert_eq!(renamed.file_type, FileType::Document);

    let download = service.read_for_download(&ctx, &outcome.id).await.unwrap();
    assert_eq!(download.mime_type, "text/plain");
    assert_eq!(download.file_name, "notes.txt");

    let err = service.thumbnail(&ctx, &outcome.id, 8, 8).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_delete_file_removes_record_and_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let source = write_source(&dir, "a.txt", b"alpha").await;
    let outcome = service.upload(&ctx, &source, "a.txt", None).await.unwrap();

    service.delete_file(&ctx, &outcome.id).await.unwrap();

    assert_eq!(service.get_file(&outcome.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert!(artifacts_in(&storage_root(&service).join("Default")).is_empty());

    // Content can be uploaded again once its record is gone.
    let again = service.upload(&ctx, &source, "a.txt", None).await.unwrap();
    assert!(!again.is_duplicate);
}

#[tokio::test]
async fn test_download_with_missing_artifact_lists_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let source = write_source(&dir, "a.txt", b"alpha").await;
    let outcome = service.upload(&ctx, &source, "a.txt", None).await.unwrap();

    let physical = storage_root(&service).join("Default").join("a.txt.zst");
    std::fs::remove_file(&physical).unwrap();

    let err = service.read_for_download(&ctx, &outcome.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    match err {
        ServiceError::NotFound { candidates, .. } => assert!(candidates.contains(&physical)),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_files_by_folder() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let docs = service.create_folder(&ctx, "Docs", None).unwrap();
    let a = write_source(&dir, "a.txt", b"a").await;
    let b = write_source(&dir, "b.txt", b"b").await;
    service.upload(&ctx, &a, "a.txt", Some(&docs.id)).await.unwrap();
    service.upload(&ctx, &b, "b.txt", None).await.unwrap();

    assert_eq!(service.list_files(Some(&docs.id)).unwrap().len(), 1);
    assert_eq!(service.list_files(None).unwrap().len(), 2);
    assert_eq!(
        service.list_files(Some("missing")).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_thumbnail_for_image_only() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();

    let photo = write_source(&dir, "photo.png", &png_bytes(64, 32)).await;
    let text = write_source(&dir, "notes.txt", b"not an image").await;

    let photo = service.upload(&ctx, &photo, "photo.png", None).await.unwrap();
    let text = service.upload(&ctx, &text, "notes.txt", None).await.unwrap();

    let thumb = service.thumbnail(&ctx, &photo.id, 16, 16).await.unwrap();
    let decoded = image::open(&thumb).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16, 8));

    let again = service.thumbnail(&ctx, &photo.id, 16, 16).await.unwrap();
    assert_eq!(thumb, again);

    let err = service.thumbnail(&ctx, &text.id, 16, 16).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_thumbnail_errors_are_classified() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let photo = write_source(&dir, "photo.png", &png_bytes(8, 8)).await;
    let broken = write_source(&dir, "broken.png", b"definitely not a png").await;
    let photo = service.upload(&ctx, &photo, "photo.png", None).await.unwrap();
    let broken = service.upload(&ctx, &broken, "broken.png", None).await.unwrap();

    let err = service.thumbnail(&ctx, &photo.id, 0, 10).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = service.thumbnail(&ctx, &broken.id, 4, 4).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let cancelled = RequestContext::default();
    cancelled.cancel();
    let err = service.thumbnail(&cancelled, &photo.id, 4, 4).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    std::fs::remove_file(storage_root(&service).join("Default").join("photo.png.zst")).unwrap();
    let err = service.thumbnail(&ctx, &photo.id, 4, 4).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ============================================================================
// Folders
// ============================================================================

#[tokio::test]
async fn test_folder_rename_cascades_to_files() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();

    let c = service.get_or_create_folder(&ctx, "A/B/C").unwrap();
    let b = service.folder_tree().get_by_path("A/B").unwrap().unwrap();
    let source = write_source(&dir, "x", b"payload").await;
    let file = service.upload(&ctx, &source, "x", Some(&c.id)).await.unwrap();
    assert_eq!(file.stored_path, "A/B/C/x");

    let cascade = service.rename_folder(&ctx, &b.id, "B2").await.unwrap();
    assert_eq!(cascade.folder.path, "A/B2");

    assert_eq!(service.get_folder(&b.id).unwrap().path, "A/B2");
    assert_eq!(service.get_folder(&c.id).unwrap().path, "A/B2/C");
    assert_eq!(service.get_file(&file.id).unwrap().path, "A/B2/C/x");

    let root = storage_root(&service);
    assert!(root.join("A/B2/C/x.zst").exists());
    assert!(!root.join("A/B").exists());

    let download = service.read_for_download(&ctx, &file.id).await.unwrap();
    assert_eq!(download.bytes.as_ref(), b"payload");
}

#[tokio::test]
async fn test_sibling_folder_names_collide_case_insensitively() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let parent = service.create_folder(&ctx, "Parent", None).unwrap();
    service.create_folder(&ctx, "docs", Some(&parent.id)).unwrap();

    let err = service.create_folder(&ctx, "Docs", Some(&parent.id)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let other = service.create_folder(&ctx, "Other", Some(&parent.id)).unwrap();
    let err = service.rename_folder(&ctx, &other.id, "DOCS").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(service.get_folder(&other.id).unwrap().name, "Other");
}

#[tokio::test]
async fn test_default_folder_is_protected() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let source = write_source(&dir, "a.txt", b"a").await;
    service.upload(&ctx, &source, "a.txt", None).await.unwrap();
    let default = service.folder_tree().get_by_path("Default").unwrap().unwrap();

    let err = service.rename_folder(&ctx, &default.id, "Renamed").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protected);
    let err = service.delete_folder(&ctx, &default.id, true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protected);
    let err = service.delete_folder(&ctx, &default.id, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protected);

    assert!(service.get_folder(&default.id).is_ok());
}

#[tokio::test]
async fn test_renaming_to_reserved_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let folder = service.create_folder(&ctx, "Inbox", None).unwrap();

    let err = service.rename_folder(&ctx, &folder.id, "DEFAULT").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = service.rename_folder(&ctx, &folder.id, "").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_recycle_bin_name_is_reserved() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let folder = service.create_folder(&ctx, "Inbox", None).unwrap();

    let err = service.create_folder(&ctx, ".trash", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = service.get_or_create_folder(&ctx, ".Trash/nested").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = service.rename_folder(&ctx, &folder.id, ".trash").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(service.list_folders(None).unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_empty_folder_requires_force() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let docs = service.create_folder(&ctx, "Docs", None).unwrap();
    let source = write_source(&dir, "a.txt", b"alpha").await;
    let file = service.upload(&ctx, &source, "a.txt", Some(&docs.id)).await.unwrap();

    let err = service.delete_folder(&ctx, &docs.id, false).await.unwrap_err();
    assert!(matches!(err, ServiceError::FolderNotEmpty(_)));
    assert!(err.to_string().contains("1 files"));

    let report = service.delete_folder(&ctx, &docs.id, true).await.unwrap();
    assert_eq!(report.deleted_folders, vec![docs.id.clone()]);
    assert_eq!(report.removed_files.len(), 1);

    assert_eq!(service.get_file(&file.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(service.get_folder(&docs.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert!(artifacts_in(&storage_root(&service).join("Docs")).is_empty());
}

#[tokio::test]
async fn test_force_delete_reports_partial_failure() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let root = service.create_folder(&ctx, "Archive", None).unwrap();
    let keep = service.create_folder(&ctx, "Default", Some(&root.id)).unwrap();
    let scratch = service.create_folder(&ctx, "Scratch", Some(&root.id)).unwrap();

    let err = service.delete_folder(&ctx, &root.id, true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PartialFailure);
    assert!(err.to_string().contains("Archive/Default"));

    assert!(service.get_folder(&keep.id).is_ok());
    assert!(service.get_folder(&root.id).is_ok());
    assert!(service.get_folder(&scratch.id).is_err());
}

#[tokio::test]
async fn test_list_folders() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    let b = service.create_folder(&ctx, "beta", None).unwrap();
    service.create_folder(&ctx, "Alpha", None).unwrap();
    service.create_folder(&ctx, "child", Some(&b.id)).unwrap();

    let roots: Vec<String> = service
        .list_folders(None)
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(roots, vec!["Alpha".to_string(), "beta".to_string()]);
    assert_eq!(service.list_folders(Some(&b.id)).unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_or_create_refuses_bare_root() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let err = service
        .get_or_create_folder(&RequestContext::default(), "/")
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

// ============================================================================
// Path resolution and ingest
// ============================================================================

#[tokio::test]
async fn test_resolver_falls_back_to_compressed_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("files");
    std::fs::create_dir_all(root.join("Default")).unwrap();
    std::fs::write(root.join("Default/p.txt.zst"), b"packed").unwrap();

    let resolver = PathResolver::new(&root).with_working_dir(dir.path());
    assert_eq!(
        resolver.resolve("Default/p.txt", true).await,
        Some(root.join("Default/p.txt.zst"))
    );
    assert_eq!(resolver.resolve("Default/q.txt", true).await, None);
}

#[tokio::test]
async fn test_ingest_directory_mirrors_tree() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    let ctx = RequestContext::default();
    write_source(&dir, "tree/a.txt", b"alpha").await;
    write_source(&dir, "tree/sub/b.txt", b"beta").await;
    write_source(&dir, "tree/sub/c.txt", b"alpha").await;
    let tree = dir.path().join("incoming").join("tree");

    let report = service.ingest_directory(&ctx, &tree, None).await.unwrap();
    assert_eq!(report.uploaded.len(), 2);
    assert_eq!(report.duplicates, 1);
    assert!(report.is_clean());

    let sub = service.folder_tree().get_by_path("Default/sub").unwrap().unwrap();
    let in_sub = service.list_files(Some(&sub.id)).unwrap();
    assert_eq!(in_sub.len(), 1);
    assert_eq!(in_sub[0].path, "Default/sub/b.txt");

    let again = service.ingest(&ctx, &tree, None).await.unwrap();
    assert!(again.uploaded.is_empty());
    assert_eq!(again.duplicates, 3);
}

#[tokio::test]
async fn test_cancelled_ingest_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);
    write_source(&dir, "tree/a.txt", b"alpha").await;
    let ctx = RequestContext::default();
    ctx.cancel();

    let err = service
        .ingest_directory(&ctx, &dir.path().join("incoming/tree"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}
