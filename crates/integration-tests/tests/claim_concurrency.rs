//! Competing claimers over one database file

mod common;

use common::{fast_policy, Harness, ScriptedHost};
use futures::future::join_all;
use herald_core::application::{BatchReport, IterationOutcome};
use herald_core::domain::JobStatus;
use herald_core::port::{HostError, JobRepository};
use herald_infra_sqlite::SqliteJobRepository;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_claims_never_overlap() {
    let h = Harness::new().await;
    h.seed_content(60).await;

    // Separate repository handles, as separate workers would hold
    let claimers: Vec<Arc<dyn JobRepository>> = (0..6)
        .map(|_| {
            Arc::new(SqliteJobRepository::new(h.pool.clone(), h.time.clone()))
                as Arc<dyn JobRepository>
        })
        .collect();

    let batches = join_all(claimers.iter().map(|repo| {
        let repo = Arc::clone(repo);
        tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                let batch = repo.claim_batch(7, None).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                claimed.extend(batch.into_iter().map(|job| job.id));
            }
            claimed
        })
    }))
    .await;

    let mut seen = HashSet::new();
    for ids in batches {
        for id in ids.unwrap() {
            assert!(seen.insert(id.clone()), "job {} claimed twice", id);
        }
    }
    assert_eq!(seen.len(), 60);
    assert_eq!(
        h.repo.count_by_status(JobStatus::InProgress).await.unwrap(),
        60
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_competing_schedulers_publish_each_item_once() {
    let h = Harness::new().await;
    h.seed_content(24).await;
    let host = Arc::new(ScriptedHost::succeeding());
    let schedulers: Vec<_> = (0..3)
        .map(|_| Arc::new(h.publish_scheduler(host.clone(), 5, fast_policy(3))))
        .collect();

    let runs = join_all(schedulers.iter().map(|scheduler| {
        let scheduler = Arc::clone(scheduler);
        tokio::spawn(async move {
            while let IterationOutcome::Processed(_) = scheduler.run_once().await.unwrap() {}
        })
    }))
    .await;
    for run in runs {
        run.unwrap();
    }

    let handles = host.published_handles();
    let unique: HashSet<_> = handles.iter().collect();
    assert_eq!(handles.len(), 24);
    assert_eq!(unique.len(), 24);
    assert_eq!(h.repo.count_by_status(JobStatus::Done).await.unwrap(), 24);
}

#[tokio::test]
async fn test_claim_order_is_oldest_first() {
    let h = Harness::new().await;
    let ids = h.seed_content(4).await;

    let first = h.repo.claim_batch(2, None).await.unwrap();
    let second = h.repo.claim_batch(2, None).await.unwrap();

    let claimed: Vec<_> = first.iter().chain(second.iter()).collect();
    for pair in claimed.windows(2) {
        assert!(
            (pair[0].created_at, &pair[0].id) <= (pair[1].created_at, &pair[1].id),
            "claims out of order"
        );
    }
    let expected: HashSet<_> = ids.iter().map(|(_, job_id)| job_id.clone()).collect();
    let got: HashSet<_> = claimed.iter().map(|job| job.id.clone()).collect();
    assert_eq!(expected, got);
}

#[tokio::test]
async fn test_expired_worker_cannot_overwrite_new_owner() {
    let h = Harness::new().await;
    let ids = h.seed_content(1).await;
    let (content_id, job_id) = &ids[0];

    // Worker A holds the claim past its lease and then fails
    let stalled = Arc::new(
        ScriptedHost::failing_first([HostError::Http {
            status: 500,
            message: "upstream down".to_string(),
        }])
        .with_delay(Duration::from_millis(300)),
    );
    let worker_a = h.publish_scheduler(stalled.clone(), 10, fast_policy(1));
    // Worker B takes the job over once the sweep requeues it
    let healthy = Arc::new(ScriptedHost::succeeding());
    let worker_b = h.publish_scheduler(healthy.clone(), 10, fast_policy(1));

    let takeover = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let sweep = h.admin.reap(Duration::from_millis(10), 25).await.unwrap();
        assert_eq!(sweep.requeued, 1);
        worker_b.run_once().await.unwrap()
    };
    let (outcome_a, outcome_b) = tokio::join!(worker_a.run_once(), takeover);

    assert_eq!(
        outcome_b,
        IterationOutcome::Processed(BatchReport {
            done: 1,
            ..BatchReport::default()
        })
    );
    assert_eq!(
        outcome_a.unwrap(),
        IterationOutcome::Processed(BatchReport {
            lost: 1,
            ..BatchReport::default()
        })
    );
    assert_eq!(stalled.calls(), 1);
    assert_eq!(healthy.calls(), 1);

    let job = h.repo.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.last_error, None);
    let record = h.payloads.load_content(content_id).await.unwrap().unwrap();
    assert_eq!(record.external_id.as_deref(), Some("page-1"));
}
