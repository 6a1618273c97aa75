//! Tree store behavior through its public async surface.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use scribe_core::config::TreeConfig;
use scribe_core::events::{EventPublisher, LifecycleEvent};
use scribe_core::models::{BookId, Chapter, ChapterId, ChapterUpdate, NewChapter};
use scribe_core::persistence::{ChapterRepository, InMemoryChapterRepository};
use scribe_core::tree::{ChapterForest, DeleteStrategy, TreeStore};

fn store() -> (Arc<TreeStore>, Arc<InMemoryChapterRepository>) {
    store_with(TreeConfig::default())
}

fn store_with(config: TreeConfig) -> (Arc<TreeStore>, Arc<InMemoryChapterRepository>) {
    let repository = Arc::new(InMemoryChapterRepository::new());
    let store = TreeStore::new(
        Arc::clone(&repository) as Arc<dyn ChapterRepository>,
        config,
        EventPublisher::default(),
    );
    (Arc::new(store), repository)
}

/// Every sibling group is numbered 0..n and every level is parent level + 1.
fn assert_consistent(forest: &ChapterForest) {
    let mut groups: HashMap<Option<ChapterId>, Vec<u32>> = HashMap::new();
    for chapter in forest {
        groups.entry(chapter.parent_id).or_default().push(chapter.order);

        let expected_level = match chapter.parent_id {
            Some(parent) => forest.get(parent).expect("parent present").level + 1,
            None => 0,
        };
        assert_eq!(chapter.level, expected_level, "level of {}", chapter.title);
    }

    for (parent, orders) in groups {
        let expected: Vec<u32> = (0..orders.len() as u32).collect();
        assert_eq!(orders, expected, "sibling order under {parent:?}");
    }
}

fn sorted_rows(mut rows: Vec<Chapter>) -> Vec<Chapter> {
    rows.sort_by_key(|chapter| chapter.id.as_uuid());
    rows
}

#[tokio::test]
async fn test_move_child_to_root_between_siblings() {
    let (store, _) = store();
    let book_id = BookId::new();
    store.create_book(book_id).await.unwrap();

    let a = store.insert(book_id, NewChapter::new(None, "A")).await.unwrap();
    let b = store.insert(book_id, NewChapter::new(None, "B")).await.unwrap();
    let c = store
        .insert(book_id, NewChapter::new(Some(a.id), "C"))
        .await
        .unwrap();
    assert_eq!((c.order, c.level), (0, 1));

    let moved = store.move_chapter(book_id, c.id, None, 1).await.unwrap();
    assert_eq!((moved.order, moved.level, moved.parent_id), (1, 0, None));

    let roots: Vec<(String, u32, u32)> = store
        .children(book_id, None)
        .await
        .unwrap()
        .into_iter()
        .map(|chapter| (chapter.title, chapter.order, chapter.level))
        .collect();
    assert_eq!(
        roots,
        vec![
            ("A".to_string(), 0, 0),
            ("C".to_string(), 1, 0),
            ("B".to_string(), 2, 0),
        ]
    );
    assert!(store.children(book_id, Some(a.id)).await.unwrap().is_empty());
    assert_eq!(store.get(book_id, b.id).await.unwrap().order, 2);
}

#[tokio::test]
async fn test_cycle_is_rejected_and_tree_unchanged() {
    let (store, repository) = store();
    let book_id = BookId::new();
    store.create_book(book_id).await.unwrap();

    let a = store.insert(book_id, NewChapter::new(None, "A")).await.unwrap();
    let b = store
        .insert(book_id, NewChapter::new(Some(a.id), "B"))
        .await
        .unwrap();
    let c = store
        .insert(book_id, NewChapter::new(Some(b.id), "C"))
        .await
        .unwrap();
    let before: Vec<Chapter> = store.snapshot(book_id).await.unwrap().iter().cloned().collect();
    let version = repository.version(book_id);

    let err = store
        .move_chapter(book_id, a.id, Some(c.id), 0)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "cycle_error");

    let err = store
        .move_chapter(book_id, a.id, Some(a.id), 0)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "cycle_error");

    let after: Vec<Chapter> = store.snapshot(book_id).await.unwrap().iter().cloned().collect();
    assert_eq!(after, before);
    assert_eq!(repository.version(book_id), version);
}

#[tokio::test]
async fn test_subtree_levels_follow_a_move() {
    let (store, _) = store();
    let book_id = BookId::new();
    store.create_book(book_id).await.unwrap();

    let a = store.insert(book_id, NewChapter::new(None, "A")).await.unwrap();
    let b = store.insert(book_id, NewChapter::new(None, "B")).await.unwrap();
    let b1 = store
        .insert(book_id, NewChapter::new(Some(b.id), "B.1"))
        .await
        .unwrap();
    let b1a = store
        .insert(book_id, NewChapter::new(Some(b1.id), "B.1.a"))
        .await
        .unwrap();

    store.move_chapter(book_id, b.id, Some(a.id), 0).await.unwrap();

    let forest = store.snapshot(book_id).await.unwrap();
    assert_eq!(forest.get(b.id).unwrap().level, 1);
    assert_eq!(forest.get(b1.id).unwrap().level, 2);
    assert_eq!(forest.get(b1a.id).unwrap().level, 3);
    assert_consistent(&forest);
}

#[tokio::test]
async fn test_delete_strategies() {
    let (store, repository) = store();
    let book_id = BookId::new();
    store.create_book(book_id).await.unwrap();

    let a = store.insert(book_id, NewChapter::new(None, "A")).await.unwrap();
    let b = store.insert(book_id, NewChapter::new(None, "B")).await.unwrap();
    let c = store.insert(book_id, NewChapter::new(None, "C")).await.unwrap();
    for title in ["B.1", "B.2"] {
        store
            .insert(book_id, NewChapter::new(Some(b.id), title))
            .await
            .unwrap();
    }
    let a1 = store
        .insert(book_id, NewChapter::new(Some(a.id), "A.1"))
        .await
        .unwrap();
    store
        .insert(book_id, NewChapter::new(Some(a1.id), "A.1.a"))
        .await
        .unwrap();

    let promoted = store
        .delete(book_id, b.id, DeleteStrategy::PromoteChildren)
        .await
        .unwrap();
    assert_eq!(promoted.len(), 1);
    let titles: Vec<String> = store
        .children(book_id, None)
        .await
        .unwrap()
        .into_iter()
        .map(|chapter| chapter.title)
        .collect();
    assert_eq!(titles, vec!["A", "B.1", "B.2", "C"]);

    let removed = store
        .delete(book_id, a.id, DeleteStrategy::Cascade)
        .await
        .unwrap();
    let removed: Vec<String> = removed.into_iter().map(|chapter| chapter.title).collect();
    assert_eq!(removed, vec!["A", "A.1", "A.1.a"]);

    let forest = store.snapshot(book_id).await.unwrap();
    assert_eq!(forest.len(), 3);
    assert_eq!(forest.get(c.id).unwrap().order, 2);
    assert_consistent(&forest);

    let stored = repository.load_book(book_id).await.unwrap().unwrap();
    assert_eq!(
        sorted_rows(stored.chapters),
        sorted_rows(forest.iter().cloned().collect())
    );
}

#[tokio::test]
async fn test_update_changes_text_only() {
    let (store, _) = store();
    let book_id = BookId::new();
    store.create_book(book_id).await.unwrap();
    store.insert(book_id, NewChapter::new(None, "A")).await.unwrap();
    let b = store.insert(book_id, NewChapter::new(None, "B")).await.unwrap();

    let updated = store
        .update(
            book_id,
            b.id,
            ChapterUpdate {
                title: Some("Body".into()),
                content: Some("Once upon a time".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.title, "Body");
    assert_eq!(updated.content, "Once upon a time");
    assert_eq!((updated.order, updated.level, updated.parent_id), (1, 0, None));
}

#[tokio::test]
async fn test_depth_limit() {
    let (store, _) = store_with(TreeConfig { max_level: Some(1) });
    let book_id = BookId::new();
    store.create_book(book_id).await.unwrap();

    let a = store.insert(book_id, NewChapter::new(None, "A")).await.unwrap();
    let a1 = store
        .insert(book_id, NewChapter::new(Some(a.id), "A.1"))
        .await
        .unwrap();
    let b = store.insert(book_id, NewChapter::new(None, "B")).await.unwrap();
    store
        .insert(book_id, NewChapter::new(Some(b.id), "B.1"))
        .await
        .unwrap();

    let err = store
        .insert(book_id, NewChapter::new(Some(a1.id), "too deep"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_input");

    // B carries a child, so it cannot sit at level 1
    let err = store
        .move_chapter(book_id, b.id, Some(a.id), 0)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_input");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_operations_keep_the_tree_consistent() {
    let (store, repository) = store();
    let book_id = BookId::new();
    store.create_book(book_id).await.unwrap();

    let mut ids = Vec::new();
    for n in 0..12 {
        let parent = if n % 3 == 0 { None } else { ids.last().copied() };
        let chapter = store
            .insert(book_id, NewChapter::new(parent, format!("chapter {n}")))
            .await
            .unwrap();
        ids.push(chapter.id);
    }
    let ids = Arc::new(ids);

    let mut handles = Vec::new();
    for worker in 0..8usize {
        let store = Arc::clone(&store);
        let ids = Arc::clone(&ids);
        handles.push(tokio::spawn(async move {
            for step in 0..25usize {
                let chapter = ids[(worker * 7 + step * 5) % ids.len()];
                let parent = match (worker + step) % 4 {
                    0 => None,
                    n => Some(ids[(worker + step * n) % ids.len()]),
                };
                match store.move_chapter(book_id, chapter, parent, step % 4).await {
                    Ok(_) => {}
                    Err(e) => assert_eq!(e.code(), "cycle_error", "{e}"),
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let forest = store.snapshot(book_id).await.unwrap();
    assert_eq!(forest.len(), 12);
    assert_consistent(&forest);

    let stored = repository.load_book(book_id).await.unwrap().unwrap();
    assert_eq!(
        sorted_rows(stored.chapters),
        sorted_rows(forest.iter().cloned().collect())
    );
}

#[tokio::test]
async fn test_books_are_isolated() {
    let (store, _) = store();
    let first = BookId::new();
    let second = BookId::new();
    store.create_book(first).await.unwrap();
    store.create_book(second).await.unwrap();

    let a = store.insert(first, NewChapter::new(None, "A")).await.unwrap();
    store.insert(second, NewChapter::new(None, "X")).await.unwrap();

    let err = store
        .insert(second, NewChapter::new(Some(a.id), "cross-book"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
    assert_eq!(store.snapshot(second).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mutations_are_broadcast() {
    let events = EventPublisher::default();
    let store = TreeStore::new(
        Arc::new(InMemoryChapterRepository::new()),
        TreeConfig::default(),
        events.clone(),
    );
    let mut receiver = events.subscribe();
    let book_id = BookId::new();
    store.create_book(book_id).await.unwrap();

    let a = store.insert(book_id, NewChapter::new(None, "A")).await.unwrap();
    store
        .move_chapter(book_id, a.id, None, 0)
        .await
        .unwrap();

    let published = receiver.try_recv().unwrap();
    match published.event {
        LifecycleEvent::TreeChanged {
            book_id: changed,
            operation,
            version,
            ..
        } => {
            assert_eq!(changed, book_id);
            assert_eq!(operation, "insert");
            assert_eq!(version, 1);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(receiver.try_recv().unwrap().event.name(), "tree.changed");
}
