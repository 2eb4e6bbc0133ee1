//! Integration tests for the filesystem image store.

use pillbox_core::Error;
use pillbox_db::ImageStore;

fn store() -> (tempfile::TempDir, ImageStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ImageStore::new(dir.path(), 1024);
    (dir, store)
}

#[tokio::test]
async fn save_and_locate_round_trip() {
    let (_dir, store) = store();

    let image_id = store.save(b"fake-jpeg-bytes", Some(".png")).await.unwrap();
    let path = store.locate(&image_id).await.unwrap();

    assert_eq!(path.extension().unwrap(), "png");
    let (loaded_path, data) = store.load(&image_id).await.unwrap();
    assert_eq!(loaded_path, path);
    assert_eq!(data, b"fake-jpeg-bytes");
}

#[tokio::test]
async fn save_rejects_oversized_payload() {
    let (_dir, store) = store();

    let big = vec![0u8; 2048];
    let err = store.save(&big, Some(".jpg")).await.unwrap_err();
    match err {
        Error::SizeLimitExceeded { size, limit } => {
            assert_eq!(size, 2048);
            assert_eq!(limit, 1024);
        }
        other => panic!("expected SizeLimitExceeded, got {:?}", other),
    }
}

#[tokio::test]
async fn save_falls_back_to_jpg_for_unknown_extension() {
    let (_dir, store) = store();

    let image_id = store.save(b"data", Some(".svg")).await.unwrap();
    let path = store.locate(&image_id).await.unwrap();
    assert_eq!(path.extension().unwrap(), "jpg");
}

#[tokio::test]
async fn locate_unknown_id_is_not_found() {
    let (_dir, store) = store();

    let err = store.locate("does-not-exist").await.unwrap_err();
    assert!(matches!(err, Error::ImageNotFound(_)));
}

#[tokio::test]
async fn remove_by_url_deletes_file() {
    let (_dir, store) = store();

    let image_id = store.save(b"data", Some(".jpg")).await.unwrap();
    let path = store.locate(&image_id).await.unwrap();
    let url = ImageStore::public_url(&path);

    store.remove_by_url(&url).await;
    assert!(matches!(
        store.locate(&image_id).await.unwrap_err(),
        Error::ImageNotFound(_)
    ));
}

#[tokio::test]
async fn remove_by_url_is_noop_for_missing_file() {
    let (_dir, store) = store();
    // Must not panic or error.
    store.remove_by_url("/uploads/never-existed.jpg").await;
}

#[tokio::test]
async fn remove_by_url_cannot_escape_upload_dir() {
    let dir = tempfile::tempdir().unwrap();
    let outside = dir.path().join("outside.txt");
    tokio::fs::write(&outside, b"keep me").await.unwrap();

    let uploads = dir.path().join("uploads");
    let store = ImageStore::new(&uploads, 1024);
    store.validate().await.unwrap();

    store.remove_by_url("/uploads/../outside.txt").await;
    assert!(tokio::fs::try_exists(&outside).await.unwrap());
}

#[tokio::test]
async fn validate_round_trip_succeeds() {
    let (_dir, store) = store();
    store.validate().await.unwrap();
}
