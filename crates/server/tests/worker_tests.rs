mod common;

use bytes::Bytes;
use common::server::TestServer;
use common::{mirrored_row, origin_row, put_object};
use depot_catalog::{MirroredFileRepo, OriginDownloadRepo};
use depot_server::workers::{CleanupWorker, ValidationWorker};
use depot_storage::ObjectStore;
use time::{Duration, OffsetDateTime};

#[tokio::test]
async fn validation_removes_files_whose_origin_is_gone() {
    let server = TestServer::spawn().await;
    let catalog = server.state.catalog.clone();
    let storage = server.state.storage.clone();

    let row = mirrored_row("mod-1", "file-1", "r1", "a.pak", "mods/r1/a.pak", 4);
    catalog.upsert_mirrored_file(&row).await.expect("row");
    put_object(storage.as_ref(), &row.s3_key, Bytes::from_static(b"data")).await;

    let worker = ValidationWorker::new(storage.clone(), catalog.clone(), 4);
    let summary = worker.run().await;

    assert_eq!(summary.files_checked, 1);
    assert_eq!(summary.files_deleted, 1);
    assert_eq!(summary.errors, 0);
    assert!(catalog
        .find_by_mod_and_file("mod-1", "file-1")
        .await
        .expect("lookup")
        .is_none());
    assert!(!storage.exists(&row.s3_key).await.expect("exists"));
}

#[tokio::test]
async fn validation_marks_size_drift_stale_and_deletes_the_blob() {
    let server = TestServer::spawn().await;
    let catalog = server.state.catalog.clone();
    let storage = server.state.storage.clone();

    catalog
        .upsert_origin(&origin_row(
            "mod-2",
            "file-2",
            "http://origin.invalid/b.pak",
            999,
            "r2",
            "b.pak",
        ))
        .await
        .expect("origin");
    let row = mirrored_row("mod-2", "file-2", "r2", "b.pak", "mods/r2/b.pak", 4);
    catalog.upsert_mirrored_file(&row).await.expect("row");
    put_object(storage.as_ref(), &row.s3_key, Bytes::from_static(b"data")).await;

    let worker = ValidationWorker::new(storage.clone(), catalog.clone(), 4);
    let summary = worker.run().await;

    assert_eq!(summary.files_checked, 1);
    assert_eq!(summary.stale_files_found, 1);
    // The blob is gone, so the stale file also counts as deleted.
    assert_eq!(summary.files_deleted, 1);
    let stored = catalog
        .find_by_mod_and_file("mod-2", "file-2")
        .await
        .expect("lookup")
        .expect("row kept");
    assert!(stored.is_stale);
    assert!(
        catalog
            .find_active_by_mod_and_file("mod-2", "file-2")
            .await
            .expect("lookup")
            .is_none(),
        "stale rows must not serve hits"
    );
    assert!(!storage.exists(&row.s3_key).await.expect("exists"));
}

#[tokio::test]
async fn validation_refreshes_timestamp_when_sizes_match() {
    let server = TestServer::spawn().await;
    let catalog = server.state.catalog.clone();
    let storage = server.state.storage.clone();

    catalog
        .upsert_origin(&origin_row(
            "mod-3",
            "file-3",
            "http://origin.invalid/c.pak",
            4,
            "r3",
            "c.pak",
        ))
        .await
        .expect("origin");
    let row = mirrored_row("mod-3", "file-3", "r3", "c.pak", "mods/r3/c.pak", 4);
    catalog.upsert_mirrored_file(&row).await.expect("row");
    put_object(storage.as_ref(), &row.s3_key, Bytes::from_static(b"data")).await;

    let worker = ValidationWorker::new(storage.clone(), catalog.clone(), 4);
    let summary = worker.run().await;

    assert_eq!(summary.files_checked, 1);
    assert_eq!(summary.stale_files_found, 0);
    assert_eq!(summary.files_deleted, 0);
    let stored = catalog
        .find_by_mod_and_file("mod-3", "file-3")
        .await
        .expect("lookup")
        .expect("row");
    assert!(stored.last_validated.is_some());
    assert!(!stored.is_stale);
    assert!(storage.exists(&row.s3_key).await.expect("exists"));
}

#[tokio::test]
async fn cleanup_removes_old_unused_files_and_keeps_recent_ones() {
    let server = TestServer::spawn().await;
    let catalog = server.state.catalog.clone();
    let storage = server.state.storage.clone();

    let mut old = mirrored_row("mod-4", "file-4", "r4", "old.pak", "mods/r4/old.pak", 2_097_152);
    old.last_downloaded_at = OffsetDateTime::now_utc() - Duration::days(30);
    catalog.upsert_mirrored_file(&old).await.expect("old row");
    put_object(
        storage.as_ref(),
        &old.s3_key,
        Bytes::from(vec![0u8; 2_097_152]),
    )
    .await;

    let recent = mirrored_row("mod-5", "file-5", "r5", "new.pak", "mods/r5/new.pak", 4);
    catalog
        .upsert_mirrored_file(&recent)
        .await
        .expect("recent row");
    put_object(storage.as_ref(), &recent.s3_key, Bytes::from_static(b"data")).await;

    let worker = CleanupWorker::new(storage.clone(), catalog.clone(), Duration::days(14), 4);
    let summary = worker.run().await;

    assert_eq!(summary.files_checked, 1);
    assert_eq!(summary.files_deleted, 1);
    assert_eq!(summary.storage_freed_mb, 2);
    assert_eq!(summary.errors, 0);
    assert!(catalog
        .find_by_mod_and_file("mod-4", "file-4")
        .await
        .expect("lookup")
        .is_none());
    assert!(!storage.exists(&old.s3_key).await.expect("exists"));
    assert!(catalog
        .find_by_mod_and_file("mod-5", "file-5")
        .await
        .expect("lookup")
        .is_some());
    assert!(storage.exists(&recent.s3_key).await.expect("exists"));
}

#[tokio::test]
async fn cleanup_tolerates_an_already_missing_blob() {
    let server = TestServer::spawn().await;
    let catalog = server.state.catalog.clone();
    let storage = server.state.storage.clone();

    let mut row = mirrored_row("mod-6", "file-6", "r6", "gone.pak", "mods/r6/gone.pak", 4);
    row.last_downloaded_at = OffsetDateTime::now_utc() - Duration::days(30);
    catalog.upsert_mirrored_file(&row).await.expect("row");

    let worker = CleanupWorker::new(storage.clone(), catalog.clone(), Duration::days(14), 4);
    let summary = worker.run().await;

    assert_eq!(summary.files_deleted, 1);
    assert_eq!(summary.errors, 0);
    assert!(catalog
        .find_by_mod_and_file("mod-6", "file-6")
        .await
        .expect("lookup")
        .is_none());
}
