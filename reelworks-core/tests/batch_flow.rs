//! End-to-end flow through the ledger, admission, and scheduler against
//! the in-memory store: the same sequence an external worker drives in
//! production.

use std::sync::Arc;

use reelworks_core::store::memory::{
    MemoryStore, MemoryVideoCatalog, StaticPlanDirectory,
};
use reelworks_core::{
    AuditLog, BatchJobScheduler, ConcurrencyPolicyResolver, CoreError,
    CreateJobRequest, CreditLedger, JobAdmissionController, VideoCatalog,
};
use reelworks_model::{
    ActorId, JobStatus, LimitOverride, TenantId, VideoId, VideoStatus,
};

struct World {
    scheduler: BatchJobScheduler,
    ledger: CreditLedger,
    catalog: MemoryVideoCatalog,
    plans: StaticPlanDirectory,
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let catalog = MemoryVideoCatalog::new();
    let plans = StaticPlanDirectory::new();

    let ledger = CreditLedger::new(store.clone());
    let policy = ConcurrencyPolicyResolver::new(
        Arc::new(plans.clone()),
        LimitOverride::default(),
    );
    let admission = JobAdmissionController::new(store.clone(), policy);
    let audit = AuditLog::new(store.clone());
    let scheduler = BatchJobScheduler::new(
        store,
        ledger.clone(),
        admission,
        audit,
        Arc::new(catalog.clone()),
    );

    World {
        scheduler,
        ledger,
        catalog,
        plans,
    }
}

async fn request_with_videos(
    world: &World,
    tenant: TenantId,
    durations: &[u64],
) -> CreateJobRequest {
    let mut video_ids = Vec::new();
    for duration in durations {
        let video = VideoId::new();
        world
            .catalog
            .record_duration(video, *duration)
            .await
            .unwrap();
        video_ids.push(video);
    }
    CreateJobRequest {
        kind: "transcription".to_string(),
        video_ids,
        tenant_id: tenant,
        created_by: ActorId::from("coach-7"),
        config: serde_json::json!({ "model": "large" }),
        billable: true,
    }
}

#[tokio::test]
async fn full_worker_loop_settles_credits() {
    let world = world();
    let tenant = TenantId::new();
    let worker = ActorId::from("worker:host-1");

    world
        .ledger
        .add_credits(tenant, 200, &ActorId::from("admin"), "signup grant")
        .await
        .unwrap();

    // Three videos: 10 + 2 + 3 = 15 credits estimated.
    let request = request_with_videos(&world, tenant, &[600, 45, 150]).await;
    let videos = request.video_ids.clone();
    let job_id = world.scheduler.create_job(request).await.unwrap();

    let balance = world.ledger.balance_of(tenant).await.unwrap();
    assert_eq!(balance.reserved, 15);
    assert_eq!(balance.available, 185);

    // Worker pulls and resolves every unit in order, reporting actual
    // spend below the estimate. Each claim resolves before the next
    // poll, so headroom never blocks.
    let mut processed = Vec::new();
    while let Some(claim) =
        world.scheduler.dequeue_next(tenant, &worker).await.unwrap()
    {
        processed.push(claim.video_id);
        world
            .scheduler
            .update_video_status(
                claim.job_id,
                claim.video_id,
                VideoStatus::Completed,
                Some(3),
                &worker,
            )
            .await
            .unwrap();
    }

    assert_eq!(processed, videos, "claims follow array order");

    let view = world.scheduler.get_status(job_id).await.unwrap();
    assert_eq!(view.job.status, JobStatus::Completed);
    assert_eq!(view.job.progress.completed, 3);
    assert_eq!(view.job.consumed_credits, 9);

    // 15 reserved, 9 consumed, 6 released back.
    let balance = world.ledger.balance_of(tenant).await.unwrap();
    assert_eq!(balance.balance, 191);
    assert_eq!(balance.reserved, 0);
    assert_eq!(balance.available, 191);

    // The trail shows the whole story, newest first.
    let history = world.ledger.transactions(tenant, 50).await.unwrap();
    let kinds: Vec<&str> =
        history.iter().map(|tx| tx.kind.as_str()).collect();
    assert_eq!(kinds[0], "release");
    assert!(kinds.contains(&"reserve"));
    assert_eq!(kinds.iter().filter(|k| **k == "consume").count(), 3);

    // Terminal job rejects late worker reports.
    let err = world
        .scheduler
        .update_video_status(
            job_id,
            videos[0],
            VideoStatus::Completed,
            None,
            &worker,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidJobState(_)));
}

#[tokio::test]
async fn mixed_outcome_job_keeps_failures_isolated() {
    let world = world();
    let tenant = TenantId::new();
    let worker = ActorId::from("worker:host-2");

    world
        .ledger
        .add_credits(tenant, 100, &ActorId::from("admin"), "grant")
        .await
        .unwrap();

    let request = request_with_videos(&world, tenant, &[120, 120]).await;
    let videos = request.video_ids.clone();
    let job_id = world.scheduler.create_job(request).await.unwrap();

    // First video fails mid-flight; the job keeps going.
    world.scheduler.dequeue_next(tenant, &worker).await.unwrap().unwrap();
    world
        .scheduler
        .update_video_status(
            job_id,
            videos[0],
            VideoStatus::Failed,
            None,
            &worker,
        )
        .await
        .unwrap();

    let view = world.scheduler.get_status(job_id).await.unwrap();
    assert_eq!(view.job.status, JobStatus::Running);
    assert_eq!(view.job.progress.failed, 1);

    // No mid-job refund happened.
    let balance = world.ledger.balance_of(tenant).await.unwrap();
    assert_eq!(balance.reserved, 4);

    // Second video completes; job finishes with one failure.
    world.scheduler.dequeue_next(tenant, &worker).await.unwrap().unwrap();
    world
        .scheduler
        .update_video_status(
            job_id,
            videos[1],
            VideoStatus::Completed,
            Some(2),
            &worker,
        )
        .await
        .unwrap();

    let view = world.scheduler.get_status(job_id).await.unwrap();
    assert_eq!(view.job.status, JobStatus::Completed);
    assert_eq!(view.job.progress.failed, 1);
    assert_eq!(view.job.progress.completed, 1);

    let balance = world.ledger.balance_of(tenant).await.unwrap();
    assert_eq!(balance.reserved, 0);
    assert_eq!(balance.balance, 98);
}

#[tokio::test]
async fn two_workers_never_claim_the_same_video() {
    let world = world();
    let tenant = TenantId::new();
    world
        .plans
        .set_override(
            tenant,
            LimitOverride {
                per_tenant: Some(4),
                global: None,
            },
        )
        .await;
    world
        .ledger
        .add_credits(tenant, 100, &ActorId::from("admin"), "grant")
        .await
        .unwrap();

    let request = request_with_videos(&world, tenant, &[60, 60, 60, 60]).await;
    world.scheduler.create_job(request).await.unwrap();

    let mut claims = Vec::new();
    let worker_a = ActorId::from("worker:a");
    let worker_b = ActorId::from("worker:b");
    for worker in [&worker_a, &worker_b, &worker_a, &worker_b] {
        if let Some(claim) =
            world.scheduler.dequeue_next(tenant, worker).await.unwrap()
        {
            claims.push(claim.video_id);
        }
    }

    assert_eq!(claims.len(), 4);
    claims.sort();
    claims.dedup();
    assert_eq!(claims.len(), 4, "each video claimed exactly once");

    // Headroom is now exhausted.
    assert!(world
        .scheduler
        .dequeue_next(tenant, &worker_a)
        .await
        .unwrap()
        .is_none());
}
