mod common;

use std::sync::Arc;

use common::{event_json, init_tracing, record_json, FakeRegistry};
use schema_registry_client::{
    RemoteRegistryStore, RetrievalCause, Schema, SchemaError, SchemaId, SchemaStore,
};

fn store_over(fake: &FakeRegistry) -> RemoteRegistryStore<FakeRegistry> {
    init_tracing();
    RemoteRegistryStore::new(fake.clone(), 100)
}

#[tokio::test]
async fn test_cached_subject_survives_backend_outage() {
    let fake = FakeRegistry::new();
    let id = fake.put("com.example.Session", &record_json("com.example", "Session"));
    let store = store_over(&fake);

    let first = store.lookup_by_subject("com.example.Session").await.unwrap();
    assert_eq!(first.id, SchemaId::new(id));
    assert_eq!(first.subject(), "com.example.Session");

    fake.set_available(false);
    let second = store.lookup_by_subject("com.example.Session").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fake.latest_calls(), 1);
    assert_eq!(store.cached_subjects(), vec!["com.example.Session".to_string()]);
}

#[tokio::test]
async fn test_cache_is_never_refreshed_until_evicted() {
    let fake = FakeRegistry::new();
    let old_id = fake.put("com.example.Session", &record_json("com.example", "Session"));
    let store = store_over(&fake);
    store.lookup_by_subject("com.example.Session").await.unwrap();

    let new_id = fake.put(
        "com.example.Session",
        r#"{"type": "record", "name": "Session", "namespace": "com.example",
            "fields": [{"name": "value", "type": "string"}]}"#,
    );
    let stale = store.lookup_by_subject("com.example.Session").await.unwrap();
    assert_eq!(stale.id, SchemaId::new(old_id));

    assert!(store.evict("com.example.Session"));
    let fresh = store.lookup_by_subject("com.example.Session").await.unwrap();
    assert_eq!(fresh.id, SchemaId::new(new_id));
    assert_eq!(fake.latest_calls(), 2);
}

#[tokio::test]
async fn test_missing_keys_are_not_found() {
    let fake = FakeRegistry::new();
    let store = store_over(&fake);

    let err = store.lookup_by_id(SchemaId::new(77)).await.unwrap_err();
    assert_eq!(err.retrieval_cause(), Some(RetrievalCause::NotFound));

    let err = store.lookup_by_subject("com.example.Nope").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(store.cache().is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_is_unavailable() {
    let fake = FakeRegistry::new();
    let id = fake.put("com.example.Session", &record_json("com.example", "Session"));
    fake.set_available(false);
    let store = store_over(&fake);

    let err = store.lookup_by_id(SchemaId::new(id)).await.unwrap_err();
    assert!(err.is_unavailable());
    let err = store.lookup_by_subject("com.example.Session").await.unwrap_err();
    assert!(err.is_unavailable());
    assert!(store.cache().is_empty());
}

#[tokio::test]
async fn test_unparseable_response_is_unavailable() {
    let fake = FakeRegistry::new();
    let id = fake.put("com.example.Broken", "{\"type\": \"record\"");
    let store = store_over(&fake);

    let err = store.lookup_by_id(SchemaId::new(id)).await.unwrap_err();
    assert!(err.is_unavailable());
    let err = store.lookup_by_subject("com.example.Broken").await.unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_lookup_by_id_returns_registered_schema() {
    let fake = FakeRegistry::new();
    let json = record_json("com.example", "Session");
    let id = fake.put("com.example.Session", &json);
    let store = store_over(&fake);

    let schema = store.lookup_by_id(SchemaId::new(id)).await.unwrap();
    assert_eq!(schema, Schema::parse_str(&json).unwrap());

    // id lookups are never cached
    store.lookup_by_id(SchemaId::new(id)).await.unwrap();
    assert_eq!(fake.by_id_calls(), 2);
}

#[tokio::test]
async fn test_empty_subject_is_rejected_before_any_call() {
    let fake = FakeRegistry::new();
    let store = store_over(&fake);

    for subject in ["", "   "] {
        assert!(matches!(
            store.lookup_by_subject(subject).await,
            Err(SchemaError::InvalidArgument(_))
        ));
    }
    assert_eq!(fake.latest_calls(), 0);
}

#[tokio::test]
async fn test_register_does_not_populate_cache() {
    let fake = FakeRegistry::new();
    let store = store_over(&fake);
    let schema = Schema::parse_str(&record_json("com.example", "Created")).unwrap();

    let id = store.register(&schema).await.unwrap();
    assert!(fake.contains("com.example.Created"));
    assert!(!store.cache().contains("com.example.Created"));

    let again = store.register(&schema).await.unwrap();
    assert_eq!(id, again);

    let registered = store.lookup_by_subject("com.example.Created").await.unwrap();
    assert_eq!(registered.id, id);
    assert_eq!(registered.schema, schema);
    assert_eq!(fake.latest_calls(), 1);
}

#[tokio::test]
async fn test_register_failures_are_registration_errors() {
    let fake = FakeRegistry::new();
    fake.reject("com.example.Rejected");
    let store = store_over(&fake);

    let rejected = Schema::parse_str(&record_json("com.example", "Rejected")).unwrap();
    match store.register(&rejected).await {
        Err(SchemaError::Registration { message, source }) => {
            assert!(message.contains("com.example.Rejected"));
            assert!(source.is_some());
        }
        other => panic!("Expected registration error, got {:?}", other),
    }

    fake.set_available(false);
    let other = Schema::parse_str(&record_json("com.example", "Other")).unwrap();
    assert!(matches!(
        store.register(&other).await,
        Err(SchemaError::Registration { .. })
    ));
}

#[tokio::test]
async fn test_all_schemas_and_event_id_filter() {
    let fake = FakeRegistry::new();
    fake.put("com.example.Opened", &event_json("com.example", "Opened", 1));
    fake.put("com.example.Closed", &event_json("com.example", "Closed", 2));
    fake.put("com.example.Plain", &record_json("com.example", "Plain"));
    let store = store_over(&fake);

    let all = store.all_schemas().await.unwrap();
    let mut subjects: Vec<&str> = all.iter().map(|r| r.subject()).collect();
    subjects.sort();
    assert_eq!(
        subjects,
        vec!["com.example.Closed", "com.example.Opened", "com.example.Plain"]
    );
    assert_eq!(store.cache().len(), 3);

    let opened = store.schemas_by_event_ids(&[1, 99]).await.unwrap();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].subject(), "com.example.Opened");

    let both = store.schemas_by_event_ids(&[1, 2]).await.unwrap();
    assert_eq!(both.len(), 2);
    // second and third passes come from the cache
    assert_eq!(fake.latest_calls(), 3);
    assert_eq!(fake.subjects_calls(), 3);
}

#[tokio::test]
async fn test_subject_listing_failure_is_aggregated() {
    let fake = FakeRegistry::new();
    fake.put("com.example.Opened", &event_json("com.example", "Opened", 1));
    fake.set_available(false);
    let store = store_over(&fake);

    let err = store.all_schemas().await.unwrap_err();
    assert_eq!(err.retrieval_cause(), Some(RetrievalCause::Unavailable));
    assert!(err.to_string().contains("Failed to retrieve schemas"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_share_one_cache_entry() {
    let fake = FakeRegistry::new();
    let id = fake.put("com.example.Session", &record_json("com.example", "Session"));
    let store = Arc::new(store_over(&fake));

    let lookups: Vec<_> = (0..64)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.lookup_by_subject("com.example.Session").await })
        })
        .collect();

    let mut results = Vec::with_capacity(lookups.len());
    for lookup in lookups {
        results.push(lookup.await.unwrap().unwrap());
    }
    assert!(results.iter().all(|r| r == &results[0]));
    assert_eq!(results[0].id, SchemaId::new(id));
    assert_eq!(store.cache().len(), 1);
    assert!((1..=64).contains(&fake.latest_calls()));

    // Once settled, lookups are served from the cache
    let settled = fake.latest_calls();
    store.lookup_by_subject("com.example.Session").await.unwrap();
    assert_eq!(fake.latest_calls(), settled);
}
