//! Disjoint-set forest used to group overlapping cells into merge components.

use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Union-find with path compression and union by rank over arbitrary keys.
#[derive(Debug, Default)]
pub struct UnionFind<K: Copy + Eq + Hash> {
    parent: FxHashMap<K, K>,
    rank: FxHashMap<K, u32>,
}

impl<K: Copy + Eq + Hash> UnionFind<K> {
    /// Empty forest.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: FxHashMap::default(),
            rank: FxHashMap::default(),
        }
    }

    /// Register `key` as its own singleton set if unseen.
    pub fn insert(&mut self, key: K) {
        self.parent.entry(key).or_insert(key);
        self.rank.entry(key).or_insert(0);
    }

    /// Representative of the set containing `key`, compressing the path.
    pub fn find(&mut self, key: K) -> K {
        self.insert(key);
        let mut root = key;
        while self.parent[&root] != root {
            root = self.parent[&root];
        }
        let mut cursor = key;
        while self.parent[&cursor] != root {
            let next = self.parent[&cursor];
            self.parent.insert(cursor, root);
            cursor = next;
        }
        root
    }

    /// Merge the sets containing `a` and `b`.
    pub fn union(&mut self, a: K, b: K) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        let rank_a = self.rank[&root_a];
        let rank_b = self.rank[&root_b];
        if rank_a < rank_b {
            self.parent.insert(root_a, root_b);
        } else if rank_a > rank_b {
            self.parent.insert(root_b, root_a);
        } else {
            self.parent.insert(root_b, root_a);
            self.rank.insert(root_a, rank_a + 1);
        }
    }

    /// All sets as lists of members. Member order within a set follows
    /// insertion order of `keys`.
    pub fn components(&mut self, keys: impl IntoIterator<Item = K>) -> Vec<Vec<K>> {
        let mut by_root: FxHashMap<K, Vec<K>> = FxHashMap::default();
        let mut order: Vec<K> = Vec::new();
        for key in keys {
            let root = self.find(key);
            let members = by_root.entry(root).or_insert_with(|| {
                order.push(root);
                Vec::new()
            });
            members.push(key);
        }
        order
            .into_iter()
            .filter_map(|root| by_root.remove(&root))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singletons_until_unioned() {
        let mut uf: UnionFind<u32> = UnionFind::new();
        uf.insert(1);
        uf.insert(2);
        assert_ne!(uf.find(1), uf.find(2));
        uf.union(1, 2);
        assert_eq!(uf.find(1), uf.find(2));
    }

    #[test]
    fn transitive_chains_collapse() {
        let mut uf: UnionFind<u32> = UnionFind::new();
        uf.union(1, 2);
        uf.union(3, 4);
        uf.union(2, 3);
        let root = uf.find(1);
        for key in [2, 3, 4] {
            assert_eq!(uf.find(key), root);
        }
        assert_ne!(uf.find(5), root);
    }

    #[test]
    fn components_preserve_insertion_order() {
        let mut uf: UnionFind<u32> = UnionFind::new();
        uf.union(10, 30);
        uf.insert(20);
        let components = uf.components([10, 20, 30]);
        assert_eq!(components, vec![vec![10, 30], vec![20]]);
    }
}
