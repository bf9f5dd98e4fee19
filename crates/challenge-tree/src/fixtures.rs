//! Challenge snapshots shared by the tree's tests.

use crate::RoyalChallengeTree;
use bold_challenger_primitives::{
    test_utils::{assertion_hash, EdgeBuilder, MockHistoryChecker, MockMetadataReader},
    ClaimId, Edge, EdgeId, OriginId,
};
use std::{collections::HashMap, sync::Arc};

pub(crate) const TOTAL_CHALLENGE_LEVELS: u8 = 3;

pub(crate) fn honest_reader() -> MockMetadataReader {
    MockMetadataReader::new(assertion_hash("assertion.a"), 0)
}

pub(crate) fn tree_with(
    reader: MockMetadataReader,
    checker: MockHistoryChecker,
) -> (RoyalChallengeTree, Arc<MockHistoryChecker>) {
    let checker = Arc::new(checker);
    let tree = RoyalChallengeTree::new(
        assertion_hash("assertion.a"),
        Arc::new(reader),
        checker.clone(),
        TOTAL_CHALLENGE_LEVELS,
        "alice",
    );
    (tree, checker)
}

/// A tree plus every edge of the snapshot it was built from, by name.
pub(crate) struct Snapshot {
    pub(crate) tree: RoyalChallengeTree,
    edges: HashMap<String, Edge>,
}

impl Snapshot {
    fn new(tree: RoyalChallengeTree) -> Self {
        Self {
            tree,
            edges: HashMap::new(),
        }
    }

    pub(crate) fn edge(&self, name: &str) -> Edge {
        self.edges
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("no edge named {name} in snapshot"))
    }

    pub(crate) fn id(&self, name: &str) -> EdgeId {
        self.edge(name).id
    }

    pub(crate) fn ids(&self, names: &[&str]) -> Vec<EdgeId> {
        names.iter().map(|name| self.id(name)).collect()
    }

    /// Builds the named edges, links the given parents to their children and registers them.
    /// Honest edges are added as royal, evil ones only as rivals.
    fn add(
        &mut self,
        edges: &[(&str, u64)],
        links: &[(&str, &str, &str)],
        origin: OriginId,
        claim: Option<ClaimId>,
        honest: bool,
    ) {
        let mut built = edges
            .iter()
            .map(|(name, created_at)| {
                let mut builder = EdgeBuilder::new(name).origin(origin).created_at(*created_at);
                // The first edge listed is the level zero edge.
                if let Some(claim) = claim.filter(|_| name == &edges[0].0) {
                    builder = builder.claim(claim);
                }
                (name.to_string(), builder.build())
            })
            .collect::<HashMap<_, _>>();
        for (parent, lower, upper) in links {
            let lower_id = built[*lower].id;
            let upper_id = built[*upper].id;
            let parent = built.get_mut(*parent).expect("unknown parent");
            parent.lower_child_id = Some(lower_id);
            parent.upper_child_id = Some(upper_id);
        }
        for (name, _) in edges {
            let edge = built[*name].clone();
            if honest {
                self.tree.add_royal_edge(edge.clone()).unwrap();
            } else {
                self.tree.record_creation_time(&edge);
            }
            self.edges.insert(name.to_string(), edge);
        }
    }
}

/// Adds one level of the three level snapshot under `prefix`, with creation blocks offset by
/// `base`:
///
/// ```text
///       /--5---6-----8-----------16 = honest
/// 0-----4
///       \--5'--6'----8'----------16' = evil
/// ```
fn add_level(snapshot: &mut Snapshot, prefix: &str, origin: OriginId, claim: ClaimId, base: u64) {
    let name = |suffix: &str| format!("{prefix}-{suffix}");
    let honest = [
        ("0.a-16.a", 0),
        ("0.a-8.a", 2),
        ("8.a-16.a", 2),
        ("0.a-4.a", 4),
        ("4.a-8.a", 4),
        ("4.a-6.a", 6),
        ("6.a-8.a", 6),
        ("4.a-5.a", 8),
        ("5.a-6.a", 8),
    ]
    .map(|(suffix, offset)| (name(suffix), base + offset));
    let evil = [
        ("0.a-16.b", 1),
        ("0.a-8.b", 3),
        ("8.b-16.b", 3),
        ("4.a-8.b", 5),
        ("4.a-6.b", 7),
        ("6.b-8.b", 7),
        ("4.a-5.b", 9),
        ("5.b-6.b", 9),
    ]
    .map(|(suffix, offset)| (name(suffix), base + offset));
    let links = [
        ("0.a-16.a", "0.a-8.a", "8.a-16.a"),
        ("0.a-8.a", "0.a-4.a", "4.a-8.a"),
        ("4.a-8.a", "4.a-6.a", "6.a-8.a"),
        ("4.a-6.a", "4.a-5.a", "5.a-6.a"),
    ]
    .map(|(parent, lower, upper)| (name(parent), name(lower), name(upper)));

    let honest = honest.iter().map(|(n, b)| (n.as_str(), *b)).collect::<Vec<_>>();
    let evil = evil.iter().map(|(n, b)| (n.as_str(), *b)).collect::<Vec<_>>();
    let links = links
        .iter()
        .map(|(p, l, u)| (p.as_str(), l.as_str(), u.as_str()))
        .collect::<Vec<_>>();
    snapshot.add(&honest, &links, origin, Some(claim), true);
    snapshot.add(&evil, &[], origin, None, false);
}

/// A challenge across all three levels. The big step challenge disputes `blk-4.a-5.a` and the
/// small step challenge disputes `big-4.a-5.a`. Block edges are created from block 1, big step
/// edges from block 11 and small step edges from block 21.
pub(crate) fn three_level_snapshot() -> Snapshot {
    let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
    let mut snapshot = Snapshot::new(tree);

    add_level(
        &mut snapshot,
        "blk",
        OriginId::default(),
        assertion_hash("assertion.a").into(),
        1,
    );
    let claimed = snapshot.edge("blk-4.a-5.a");
    add_level(
        &mut snapshot,
        "big",
        claimed.mutual_id.into(),
        claimed.id.into(),
        11,
    );
    let claimed = snapshot.edge("big-4.a-5.a");
    add_level(
        &mut snapshot,
        "smol",
        claimed.mutual_id.into(),
        claimed.id.into(),
        21,
    );
    snapshot
}

/// A block challenge whose length one edge `blk-2.a-3.a` is disputed at the big step level:
///
/// ```text
/// blk-0.a-4.a (claims assertion.a)
/// ├── blk-0.a-2.a
/// └── blk-2.a-4.a
///     ├── blk-2.a-3.a <- claimed by big-0.a-4.a
///     └── blk-3.a-4.a
/// ```
///
/// Every honest edge but `blk-0.a-2.a`, `blk-3.a-4.a` and the big step root is rivaled one block
/// after its creation. The big step root is rivaled at block 20.
pub(crate) fn essential_paths_snapshot() -> Snapshot {
    let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
    let mut snapshot = Snapshot::new(tree);

    snapshot.add(
        &[
            ("blk-0.a-4.a", 1),
            ("blk-0.a-2.a", 3),
            ("blk-2.a-4.a", 3),
            ("blk-2.a-3.a", 5),
            ("blk-3.a-4.a", 5),
        ],
        &[
            ("blk-0.a-4.a", "blk-0.a-2.a", "blk-2.a-4.a"),
            ("blk-2.a-4.a", "blk-2.a-3.a", "blk-3.a-4.a"),
        ],
        OriginId::default(),
        Some(assertion_hash("assertion.a").into()),
        true,
    );
    snapshot.add(
        &[
            ("blk-0.a-4.b", 2),
            ("blk-2.a-4.b", 4),
            ("blk-2.a-3.b", 6),
            ("blk-3.b-4.b", 6),
        ],
        &[],
        OriginId::default(),
        None,
        false,
    );

    let claimed = snapshot.edge("blk-2.a-3.a");
    snapshot.add(
        &[("big-0.a-4.a", 7)],
        &[],
        claimed.mutual_id.into(),
        Some(claimed.id.into()),
        true,
    );
    snapshot.add(
        &[("big-0.a-4.b", 20)],
        &[],
        claimed.mutual_id.into(),
        None,
        false,
    );
    snapshot
}
