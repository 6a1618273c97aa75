use proptest::prelude::*;

use scribe_core::models::{BookId, ChapterId, NewChapter};
use scribe_core::tree::{BookTree, DeleteStrategy};

/// One tree operation with chapters picked by position in the current
/// pre-order listing, so any generated value resolves against any tree.
#[derive(Debug, Clone)]
pub enum TreeOp {
    Insert {
        parent: Option<usize>,
    },
    Move {
        chapter: usize,
        parent: Option<usize>,
        index: usize,
    },
    Delete {
        chapter: usize,
        strategy: DeleteStrategy,
    },
}

pub fn delete_strategy_strategy() -> impl Strategy<Value = DeleteStrategy> {
    prop_oneof![
        Just(DeleteStrategy::Cascade),
        Just(DeleteStrategy::PromoteChildren),
    ]
}

pub fn tree_op_strategy() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        3 => prop::option::of(any::<usize>()).prop_map(|parent| TreeOp::Insert { parent }),
        3 => (any::<usize>(), prop::option::of(any::<usize>()), 0usize..10)
            .prop_map(|(chapter, parent, index)| TreeOp::Move { chapter, parent, index }),
        1 => (any::<usize>(), delete_strategy_strategy())
            .prop_map(|(chapter, strategy)| TreeOp::Delete { chapter, strategy }),
    ]
}

pub fn tree_ops_strategy() -> impl Strategy<Value = Vec<TreeOp>> {
    prop::collection::vec(tree_op_strategy(), 1..80)
}

/// Chapter ids in pre-order.
pub fn preorder_ids(tree: &BookTree) -> Vec<ChapterId> {
    tree.forest().iter().map(|chapter| chapter.id).collect()
}

pub fn pick(ids: &[ChapterId], position: usize) -> Option<ChapterId> {
    if ids.is_empty() {
        None
    } else {
        ids.get(position % ids.len()).copied()
    }
}

/// Build a tree by replaying only the insert operations.
pub fn grown_tree(parents: &[Option<usize>]) -> BookTree {
    let mut tree = BookTree::new(BookId::new());
    for (n, parent) in parents.iter().enumerate() {
        let ids = preorder_ids(&tree);
        let parent = parent.and_then(|p| pick(&ids, p));
        tree.insert(NewChapter::new(parent, format!("chapter {n}")), None)
            .expect("insert under an existing parent");
    }
    tree
}
