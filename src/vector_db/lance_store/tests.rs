use super::*;
use tempfile::TempDir;

async fn open_store(temp_dir: &TempDir, dimension: usize) -> LanceStore {
    let db_path = temp_dir
        .path()
        .join("lancedb")
        .to_string_lossy()
        .to_string();
    let store = LanceStore::open(&db_path).await.unwrap();
    store.initialize(dimension).await.unwrap();
    store
}

fn doc(path: &str, embedding: Vec<f32>) -> IndexedDocument {
    IndexedDocument::new(path, format!("content of {}", path), embedding, from_millis(1_000), 10)
}

#[tokio::test]
async fn test_initialize_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;
    store.initialize(3).await.unwrap();
    assert_eq!(store.dimension().await.unwrap(), Some(3));
}

#[tokio::test]
async fn test_initialize_with_other_dimension_fails() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;
    assert!(store.initialize(4).await.is_err());
}

#[tokio::test]
async fn test_dimension_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    drop(open_store(&temp_dir, 5).await);

    let db_path = temp_dir.path().join("lancedb");
    let reopened = LanceStore::open(db_path.to_str().unwrap()).await.unwrap();
    assert_eq!(reopened.dimension().await.unwrap(), Some(5));
}

#[tokio::test]
async fn test_uninitialized_store() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("lancedb");
    let store = LanceStore::open(db_path.to_str().unwrap()).await.unwrap();

    assert_eq!(store.dimension().await.unwrap(), None);
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.insert(&doc("/a.md", vec![1.0, 0.0, 0.0])).await.is_err());
}

#[tokio::test]
async fn test_insert_and_find_by_path() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;

    let original = doc("/docs/a.md", vec![1.0, 2.0, 3.0]);
    store.insert(&original).await.unwrap();

    let found = store.find_by_path("/docs/a.md").await.unwrap().unwrap();
    assert_eq!(found.id, original.id);
    assert_eq!(found.content, original.content);
    assert_eq!(found.embedding, vec![1.0, 2.0, 3.0]);
    assert_eq!(found.file_modified_at, from_millis(1_000));
    assert_eq!(found.file_size, 10);

    assert!(store.find_by_path("/docs/b.md").await.unwrap().is_none());
}

#[tokio::test]
async fn test_insert_wrong_dimension_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;

    let err = store
        .insert(&doc("/a.md", vec![1.0, 2.0]))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VectorDbError>(),
        Some(VectorDbError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_update_replaces_in_place() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;

    let original = doc("/docs/a.md", vec![1.0, 0.0, 0.0]);
    store.insert(&original).await.unwrap();

    let mut replacement = doc("/docs/a.md", vec![0.0, 1.0, 0.0]);
    replacement.id = original.id.clone();
    replacement.content = "new content".to_string();
    replacement.file_modified_at = from_millis(2_000);
    store.update(&replacement).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    let found = store.find_by_path("/docs/a.md").await.unwrap().unwrap();
    assert_eq!(found.id, original.id);
    assert_eq!(found.content, "new content");
    assert_eq!(found.embedding, vec![0.0, 1.0, 0.0]);
    assert_eq!(found.file_modified_at, from_millis(2_000));
}

#[tokio::test]
async fn test_update_unknown_path_inserts() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;

    store.update(&doc("/docs/new.md", vec![1.0, 1.0, 1.0])).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.find_by_path("/docs/new.md").await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_missing_is_noop() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;
    store.insert(&doc("/a.md", vec![1.0, 0.0, 0.0])).await.unwrap();

    assert!(!store.delete("/never-indexed.md").await.unwrap());
    assert_eq!(store.count().await.unwrap(), 1);

    assert!(store.delete("/a.md").await.unwrap());
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_paths_with_quotes() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;

    let path = "/docs/it's here.md";
    store.insert(&doc(path, vec![1.0, 0.0, 0.0])).await.unwrap();
    assert!(store.find_by_path(path).await.unwrap().is_some());
    assert_eq!(store.delete_by_prefix("/docs").await.unwrap(), 1);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_prefix_operations_respect_boundaries() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;

    store.insert(&doc("/docs/a.md", vec![1.0, 0.0, 0.0])).await.unwrap();
    store.insert(&doc("/docs/sub/b.md", vec![0.0, 1.0, 0.0])).await.unwrap();
    store.insert(&doc("/docs2/c.md", vec![0.0, 0.0, 1.0])).await.unwrap();
    store.insert(&doc("/docs_%/d.md", vec![1.0, 1.0, 0.0])).await.unwrap();

    assert_eq!(store.count_by_prefix("/docs").await.unwrap(), 2);
    assert_eq!(store.count_by_prefix("/docs/").await.unwrap(), 2);
    assert_eq!(store.count_by_prefix("/docs2").await.unwrap(), 1);

    assert_eq!(store.delete_by_prefix("/docs").await.unwrap(), 2);
    assert_eq!(store.count().await.unwrap(), 2);
    assert!(store.find_by_path("/docs2/c.md").await.unwrap().is_some());
    assert!(store.find_by_path("/docs_%/d.md").await.unwrap().is_some());
}

#[tokio::test]
async fn test_indexed_timestamps() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;

    let mut a = doc("/a.md", vec![1.0, 0.0, 0.0]);
    a.file_modified_at = from_millis(1_700_000_000_123);
    store.insert(&a).await.unwrap();
    store.insert(&doc("/b.md", vec![0.0, 1.0, 0.0])).await.unwrap();

    let timestamps = store.indexed_timestamps().await.unwrap();
    assert_eq!(timestamps.len(), 2);
    assert_eq!(timestamps["/a.md"], from_millis(1_700_000_000_123));
    assert_eq!(timestamps["/b.md"], from_millis(1_000));
}

#[tokio::test]
async fn test_find_similar_orders_by_score() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;

    store.insert(&doc("/near.md", vec![1.0, 0.0, 0.0])).await.unwrap();
    store.insert(&doc("/mid.md", vec![0.0, 1.0, 0.0])).await.unwrap();
    store.insert(&doc("/far.md", vec![-5.0, 0.0, 0.0])).await.unwrap();

    let hits = store.find_similar(&[1.0, 0.0, 0.0], 3, None).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].document.path, "/near.md");
    assert_eq!(hits[2].document.path, "/far.md");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    // Distance sqrt(2) to the orthogonal vector
    assert!((hits[1].score - 1.0 / (1.0 + 2f32.sqrt())).abs() < 1e-4);
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let top = store.find_similar(&[1.0, 0.0, 0.0], 1, None).await.unwrap();
    assert_eq!(top.len(), 1);
}

#[tokio::test]
async fn test_find_similar_with_prefix_widens() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;

    // Ten close documents outside the prefix crowd out the two inside it
    for i in 0..10 {
        let path = format!("/other/{}.md", i);
        store
            .insert(&doc(&path, vec![1.0, 0.01 * i as f32, 0.0]))
            .await
            .unwrap();
    }
    store.insert(&doc("/docs/x.md", vec![0.0, 0.0, 5.0])).await.unwrap();
    store.insert(&doc("/docs/y.md", vec![0.0, 0.0, 9.0])).await.unwrap();

    let hits = store
        .find_similar(&[1.0, 0.0, 0.0], 2, Some("/docs"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.document.path.starts_with("/docs/")));
    assert_eq!(hits[0].document.path, "/docs/x.md");
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn test_find_similar_prefix_without_matches() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;
    store.insert(&doc("/other/a.md", vec![1.0, 0.0, 0.0])).await.unwrap();

    let hits = store
        .find_similar(&[1.0, 0.0, 0.0], 5, Some("/docs"))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_find_similar_huge_k_is_capped() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;
    store.insert(&doc("/docs/a.md", vec![1.0, 0.0, 0.0])).await.unwrap();
    store.insert(&doc("/other/b.md", vec![0.0, 1.0, 0.0])).await.unwrap();

    let hits = store
        .find_similar(&[1.0, 0.0, 0.0], usize::MAX, Some("/docs"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.path, "/docs/a.md");

    let all = store
        .find_similar(&[1.0, 0.0, 0.0], usize::MAX, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_find_similar_zero_k() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;
    store.insert(&doc("/a.md", vec![1.0, 0.0, 0.0])).await.unwrap();
    assert!(store.find_similar(&[1.0, 0.0, 0.0], 0, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reset_changes_dimension() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;
    store.insert(&doc("/a.md", vec![1.0, 0.0, 0.0])).await.unwrap();

    store.reset(4).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(store.dimension().await.unwrap(), Some(4));
    store.insert(&doc("/b.md", vec![1.0, 0.0, 0.0, 0.0])).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_clear_keeps_dimension() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 3).await;
    store.insert(&doc("/a.md", vec![1.0, 0.0, 0.0])).await.unwrap();
    store.insert(&doc("/b.md", vec![0.0, 1.0, 0.0])).await.unwrap();

    store.clear().await.unwrap();

    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(store.dimension().await.unwrap(), Some(3));
    assert!(store.find_all().await.unwrap().is_empty());
}

#[test]
fn test_escape_quotes() {
    assert_eq!(path_filter("/a/it's.md"), "path = '/a/it''s.md'");
}
