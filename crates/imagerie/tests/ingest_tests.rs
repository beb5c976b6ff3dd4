//! Bulk ingestion scenarios: discovery, planning and dispatch.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{item_id, write_corrupt_archive, write_folder, write_zip, CollectionBuilder, TestHarness};
use imagerie::db::{CollectionRepository, Database, SqliteCollectionRepository, SqliteJobRepository};
use imagerie::ingest::{BulkIngestor, ChannelPublisher, OutcomeStatus, WorkMessage};
use imagerie::jobs::{HealthThresholds, JobStatus, JobTracker, STAGE_CACHE, STAGE_SCAN, STAGE_THUMBNAIL};
use imagerie::plan::{DecisionKind, PlanFlags};
use imagerie::scan::{CandidateScanner, ZipArchiveReader};
use imagerie::config::ScanConfig;

#[test]
fn resume_dispatches_one_message_per_gap() {
    let h = TestHarness::new();
    let album = write_folder(&h.media_dir, "album", &["001.jpg"]);
    h.insert_collection(&CollectionBuilder::new(&album).items(10).thumbnails(7).cache(5).build());

    let mut request = h.request();
    request.flags = PlanFlags {
        overwrite_existing: false,
        resume_incomplete: true,
    };
    let result = h.ingest(request);

    assert_eq!(result.resumed_count, 1);
    let outcome = &result.outcomes[0];
    assert_eq!(outcome.status, OutcomeStatus::Resumed);
    assert_eq!(outcome.decision, Some(DecisionKind::Resume));
    assert_eq!(outcome.dispatched, 8);
    assert_eq!(h.publisher.item_count(), 8);
    assert_eq!(h.publisher.scan_count(), 0);

    let thumbnails: HashSet<String> = h
        .publisher
        .messages()
        .into_iter()
        .filter_map(|m| match m {
            WorkMessage::ProcessItem { stage, item_id, .. } if stage == STAGE_THUMBNAIL => {
                Some(item_id)
            }
            _ => None,
        })
        .collect();
    let expected: HashSet<String> = (7..10).map(item_id).collect();
    assert_eq!(thumbnails, expected);

    let job = h
        .tracker
        .get_job(outcome.job_id.as_deref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(job.job_type, "resume-collection");
    assert_eq!(job.stage(STAGE_THUMBNAIL).unwrap().total, 3);
    assert_eq!(job.stage(STAGE_CACHE).unwrap().total, 5);
    assert!(job.stage(STAGE_SCAN).is_none());
}

#[test]
fn overwrite_forces_a_single_rescan() {
    let h = TestHarness::new();
    let album = write_folder(&h.media_dir, "album", &["001.jpg"]);
    let collection = CollectionBuilder::new(&album).items(10).thumbnails(7).cache(5).build();
    h.insert_collection(&collection);

    let mut request = h.request();
    request.flags = PlanFlags {
        overwrite_existing: true,
        resume_incomplete: true,
    };
    let result = h.ingest(request);

    assert_eq!(result.success_count, 1);
    assert_eq!(result.outcomes[0].decision, Some(DecisionKind::ForceRescan));
    assert_eq!(h.publisher.scan_count(), 1);
    assert_eq!(h.publisher.item_count(), 0);
    match &h.publisher.messages()[0] {
        WorkMessage::ScanCollection { force_rescan, .. } => assert!(force_rescan),
        other => panic!("expected scan message, got {:?}", other),
    }

    let cleared = h.collections.find_by_id(&collection.id).unwrap().unwrap();
    assert!(cleared.images.is_empty());
    assert!(cleared.thumbnails.is_empty());
    assert!(cleared.cache_images.is_empty());
}

#[test]
fn corrupted_archive_is_excluded_not_reported() {
    let h = TestHarness::new();
    write_zip(&h.media_dir, "a.zip", &["001.jpg"]);
    write_zip(&h.media_dir, "b.cbz", &["pages/001.png"]);
    write_zip(&h.media_dir, "c.zip", &["x/1.webp", "x/2.webp"]);
    write_zip(&h.media_dir, "d.zip", &["cover.gif"]);
    write_corrupt_archive(&h.media_dir, "e.zip");

    let result = h.ingest(h.request());

    assert_eq!(result.total(), 4);
    assert_eq!(result.success_count, 4);
    assert_eq!(result.error_count, 0);
    assert_eq!(result.unreadable_entries, 1);
    assert!(result.outcomes.iter().all(|o| o.name != "e"));
}

#[test]
fn only_leaf_folders_become_collections() {
    let h = TestHarness::new();
    std::fs::create_dir_all(h.media_dir.join("A")).unwrap();
    let leaf = write_folder(&h.media_dir.join("A"), "B", &["1.jpg", "2.jpg", "3.jpg"]);

    let mut request = h.request();
    request.include_subfolders = true;
    let result = h.ingest(request);

    assert_eq!(result.total(), 1);
    assert_eq!(result.outcomes[0].path, leaf);
}

#[test]
fn prefix_filter_and_metadata_only_archives() {
    let h = TestHarness::new();
    write_zip(&h.media_dir, "holiday_2024.zip", &["1.jpg"]);
    write_zip(&h.media_dir, "work.zip", &["1.jpg"]);
    write_zip(&h.media_dir, "holiday_forks.zip", &["__MACOSX/._1.jpg", "._2.jpg"]);

    let mut request = h.request();
    request.prefix = Some("HOLIDAY".to_string());
    let result = h.ingest(request);

    assert_eq!(result.total(), 1);
    assert_eq!(result.outcomes[0].name, "holiday_2024");
}

#[test]
fn second_run_plans_against_registered_collections() {
    let h = TestHarness::new();
    write_folder(&h.media_dir, "album", &["1.jpg"]);

    let first = h.ingest(h.request());
    assert_eq!(first.outcomes[0].decision, Some(DecisionKind::CreateNew));

    // Registered but the scan never produced items.
    h.publisher.clear();
    let second = h.ingest(h.request());
    assert_eq!(second.outcomes[0].decision, Some(DecisionKind::ScanFresh));
    assert_eq!(second.success_count, 1);
    assert_eq!(h.publisher.scan_count(), 1);
    assert_eq!(first.outcomes[0].collection_id, second.outcomes[0].collection_id);
}

#[test]
fn complete_collection_is_skipped() {
    let h = TestHarness::new();
    let album = write_folder(&h.media_dir, "album", &["1.jpg"]);
    h.insert_collection(&CollectionBuilder::new(&album).items(3).thumbnails(3).cache(3).build());

    let mut request = h.request();
    request.flags.resume_incomplete = true;
    let result = h.ingest(request);

    assert_eq!(result.skipped_count, 1);
    assert_eq!(result.outcomes[0].decision, Some(DecisionKind::SkipComplete));
    assert!(h.publisher.messages().is_empty());
}

#[test]
fn resume_completes_once_workers_drain_the_channel() {
    let dir = tempfile::TempDir::new().unwrap();
    let media = dir.path().join("media");
    let album = write_folder(&media, "album", &["1.jpg"]);

    let db = Database::open_in_memory().unwrap();
    let collections = Arc::new(SqliteCollectionRepository::new(db.clone()));
    collections
        .insert(&CollectionBuilder::new(&album).items(6).thumbnails(2).cache(6).build())
        .unwrap();
    let tracker = Arc::new(JobTracker::new(
        Arc::new(SqliteJobRepository::new(db)),
        HealthThresholds::default(),
    ));
    let (publisher, receiver) = ChannelPublisher::unbounded();
    let ingestor = BulkIngestor::new(
        CandidateScanner::new(&ScanConfig::default(), Arc::new(ZipArchiveReader)),
        collections,
        Arc::clone(&tracker),
        Arc::new(publisher),
    );

    let mut request = imagerie::ingest::BulkIngestRequest::new(&media);
    request.flags.resume_incomplete = true;
    let result = ingestor.ingest(&request).unwrap();
    let job_id = result.outcomes[0].job_id.clone().unwrap();

    // Cache stage had nothing to do and is already complete.
    let job = tracker.get_job(&job_id).unwrap().unwrap();
    assert_eq!(job.stage(STAGE_CACHE).unwrap().status, imagerie::jobs::StageStatus::Completed);
    assert_eq!(job.status, JobStatus::InProgress);

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let receiver = receiver.clone();
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                while let Ok(message) = receiver.try_recv() {
                    assert!(tracker.increment_stage(message.job_id(), message.stage(), 1));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    let job = tracker.get_job(&job_id).unwrap().unwrap();
    assert_eq!(job.stage(STAGE_THUMBNAIL).unwrap().completed, 4);
    assert_eq!(job.status, JobStatus::Completed);
}
