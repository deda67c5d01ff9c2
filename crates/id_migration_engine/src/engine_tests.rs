use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use rand_core::OsRng;

use id_migration_proto::{MigrationError, SignedEvent, MIGRATION_EVENT_KIND};

use crate::lazy_fetch::InMemoryMigrationTransport;
use crate::signer::{build_migration_event, MigrationSigner};
use crate::store::{FileMappingPersistence, MigrationStore};
use crate::MigrationService;

fn sample_signer() -> MigrationSigner {
    MigrationSigner::from_signing_key(SigningKey::generate(&mut OsRng))
}

fn service_with_transport(transport: Arc<InMemoryMigrationTransport>) -> MigrationService {
    MigrationService::new(transport, MigrationStore::in_memory())
}

#[test]
fn ingested_chain_resolves_to_terminal_identity() {
    let a = sample_signer();
    let b = sample_signer();
    let c = sample_signer();
    let service = service_with_transport(Arc::new(InMemoryMigrationTransport::new()));

    service
        .ingest(&build_migration_event(&a, &b, 1_000).expect("build"))
        .expect("ingest a->b");
    service
        .ingest(&build_migration_event(&b, &c, 2_000).expect("build"))
        .expect("ingest b->c");

    assert_eq!(service.resolve(a.identity()), *c.identity());
    assert_eq!(
        service.migration_history(a.identity()),
        vec![
            a.identity().clone(),
            b.identity().clone(),
            c.identity().clone()
        ]
    );
    assert!(service.has_migrated(a.identity()));
    assert!(!service.has_migrated(c.identity()));
}

#[test]
fn rejected_event_leaves_resolution_unchanged() {
    let a = sample_signer();
    let b = sample_signer();
    let mut forged = build_migration_event(&a, &b, 1_000).expect("build");
    forged.sig = "00".repeat(64);
    let service = service_with_transport(Arc::new(InMemoryMigrationTransport::new()));

    let err = service.ingest(&forged).expect_err("forged event should reject");
    assert!(matches!(err, MigrationError::ValidationFailed { .. }));
    assert_eq!(service.resolve(a.identity()), *a.identity());
}

#[test]
fn old_key_holder_alone_cannot_redirect_an_identity() {
    // Attacker controls the old key A but has no key for B: the embedded
    // proof must carry B's signature, which the attacker cannot produce.
    let a = sample_signer();
    let b = sample_signer();
    let attacker_proof_key = sample_signer();

    let mut proof = attacker_proof_key
        .sign_event(
            MIGRATION_EVENT_KIND,
            vec![vec!["p".to_string(), a.identity().as_str().to_string()]],
            String::new(),
            1_000,
        )
        .expect("sign proof");
    proof.pubkey = b.identity().as_str().to_string();
    let forged = a
        .sign_event(
            MIGRATION_EVENT_KIND,
            vec![vec!["p".to_string(), b.identity().as_str().to_string()]],
            serde_json::to_string(&proof).expect("serialize"),
            1_000,
        )
        .expect("sign outer");

    let service = service_with_transport(Arc::new(InMemoryMigrationTransport::new()));
    service.ingest(&forged).expect_err("forgery should reject");
    assert_eq!(service.resolve(a.identity()), *a.identity());
}

#[test]
fn last_observed_migration_wins_for_same_from() {
    let a = sample_signer();
    let b = sample_signer();
    let c = sample_signer();
    let service = service_with_transport(Arc::new(InMemoryMigrationTransport::new()));

    service
        .ingest(&build_migration_event(&a, &b, 1_000).expect("build"))
        .expect("ingest a->b");
    service
        .ingest(&build_migration_event(&a, &c, 2_000).expect("build"))
        .expect("ingest a->c");

    assert_eq!(service.resolve(a.identity()), *c.identity());
    assert_eq!(service.snapshot().len(), 1);
}

#[tokio::test]
async fn resolve_lazy_answers_from_cache_without_querying() {
    let a = sample_signer();
    let b = sample_signer();
    let transport = Arc::new(InMemoryMigrationTransport::new());
    let service = service_with_transport(transport.clone());

    service
        .ingest(&build_migration_event(&a, &b, 1_000).expect("build"))
        .expect("ingest");

    let resolved = service
        .resolve_lazy(a.identity(), "community-1")
        .await
        .expect("resolve");
    assert_eq!(resolved, *b.identity());
    assert_eq!(transport.query_count(), 0);
}

#[tokio::test]
async fn resolve_lazy_fetches_evidence_on_cache_miss() {
    let a = sample_signer();
    let b = sample_signer();
    let transport = Arc::new(InMemoryMigrationTransport::new());
    transport.stage_event(
        a.identity(),
        build_migration_event(&a, &b, 1_000).expect("build"),
    );
    let service = service_with_transport(transport.clone());

    let resolved = service
        .resolve_lazy(a.identity(), "community-1")
        .await
        .expect("resolve");
    assert_eq!(resolved, *b.identity());
    assert_eq!(transport.query_count(), 1);
    assert_eq!(transport.queries()[0].1, "community-1");
}

#[tokio::test]
async fn resolve_lazy_without_migration_resolves_to_original() {
    let a = sample_signer();
    let transport = Arc::new(InMemoryMigrationTransport::new());
    let service = service_with_transport(transport.clone());

    let resolved = service
        .resolve_lazy(a.identity(), "community-1")
        .await
        .expect("absence is not an error");
    assert_eq!(resolved, *a.identity());
    assert_eq!(transport.query_count(), 1);
}

#[tokio::test]
async fn resolve_lazy_propagates_transport_failure_and_supports_retry() {
    let a = sample_signer();
    let b = sample_signer();
    let transport = Arc::new(InMemoryMigrationTransport::new());
    transport.fail_next_with(MigrationError::transport("relay unreachable", true));
    let service = service_with_transport(transport.clone());

    let err = service
        .resolve_lazy(a.identity(), "community-1")
        .await
        .expect_err("transport failure should propagate");
    assert!(matches!(err, MigrationError::TransportFailed { .. }));

    transport.stage_event(
        a.identity(),
        build_migration_event(&a, &b, 1_000).expect("build"),
    );
    let resolved = service
        .resolve_lazy(a.identity(), "community-1")
        .await
        .expect("retry");
    assert_eq!(resolved, *b.identity());
    assert_eq!(transport.query_count(), 2);
}

#[tokio::test]
async fn concurrent_resolve_lazy_issues_one_query() {
    let a = sample_signer();
    let b = sample_signer();
    let transport = Arc::new(InMemoryMigrationTransport::new());
    transport.stage_event(
        a.identity(),
        build_migration_event(&a, &b, 1_000).expect("build"),
    );
    transport.set_response_delay(Duration::from_millis(50));
    let service = Arc::new(service_with_transport(transport.clone()));

    let first = {
        let service = service.clone();
        let id = a.identity().clone();
        tokio::spawn(async move { service.resolve_lazy(&id, "community-1").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let service = service.clone();
        let id = a.identity().clone();
        tokio::spawn(async move { service.resolve_lazy(&id, "community-1").await })
    };

    assert_eq!(first.await.expect("join").expect("resolve"), *b.identity());
    assert_eq!(second.await.expect("join").expect("resolve"), *b.identity());
    assert_eq!(transport.query_count(), 1);
}

#[tokio::test]
async fn multi_hop_evidence_from_one_fetch_resolves_fully() {
    let a = sample_signer();
    let b = sample_signer();
    let c = sample_signer();
    let transport = Arc::new(InMemoryMigrationTransport::new());
    transport.stage_event(
        a.identity(),
        build_migration_event(&a, &b, 1_000).expect("build"),
    );
    transport.stage_event(
        a.identity(),
        build_migration_event(&b, &c, 2_000).expect("build"),
    );
    let service = service_with_transport(transport);

    let resolved = service
        .resolve_lazy(a.identity(), "community-1")
        .await
        .expect("resolve");
    assert_eq!(resolved, *c.identity());
}

#[test]
fn mapping_survives_restart_through_file_persistence() {
    let a = sample_signer();
    let b = sample_signer();
    let unique = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("duration")
        .as_nanos();
    let path = std::env::temp_dir().join(format!("id-migration-service-{unique}.json"));

    let service = MigrationService::new(
        Arc::new(InMemoryMigrationTransport::new()),
        MigrationStore::new(Box::new(FileMappingPersistence::new(&path))),
    );
    service
        .ingest(&build_migration_event(&a, &b, 1_000).expect("build"))
        .expect("ingest");
    drop(service);

    let restarted = MigrationService::new(
        Arc::new(InMemoryMigrationTransport::new()),
        MigrationStore::new(Box::new(FileMappingPersistence::new(&path))),
    );
    assert_eq!(restarted.load_persisted().expect("load"), 1);
    assert_eq!(restarted.resolve(a.identity()), *b.identity());

    std::fs::remove_file(&path).expect("cleanup");
}

#[test]
fn ingest_is_usable_as_transport_feedback_path() {
    // Events discovered out of band (for example, replayed from a relay
    // subscription) go through the same ingest path as lazy fetches.
    let a = sample_signer();
    let b = sample_signer();
    let event: SignedEvent = build_migration_event(&a, &b, 1_000).expect("build");
    let service = service_with_transport(Arc::new(InMemoryMigrationTransport::new()));

    let record = service.ingest(&event).expect("ingest");
    assert_eq!(record.source_event_id, event.id);
    assert_eq!(service.resolve(a.identity()), *b.identity());
}
