//! Arena-backed skip list
//!
//! Nodes live in a `Vec` and link to each other by slot index. Slot 0 is the
//! head sentinel, which participates in every level.
//!
//! ```text
//! Level 2:  HEAD ──────────────────► c ──────────────────► NIL
//! Level 1:  HEAD ──────► b ────────► c ──────────► e ────► NIL
//! Level 0:  HEAD ──► a ► b ──► bb ─► c ──► d ────► e ────► NIL
//! ```
//!
//! The predecessor trail built by every operation is a call-local `Vec`, so
//! concurrent readers behind a shared lock never touch common scratch space.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::record::ValueRecord;

const HEAD: usize = 0;

struct Node {
    record: ValueRecord,
    /// One forward link per level this node participates in
    next: Vec<Option<usize>>,
}

/// Probabilistic ordered map from key to [`ValueRecord`]
pub struct SkipList {
    nodes: Vec<Node>,
    /// Slots released by `delete`, reused by the next insert
    free: Vec<usize>,
    max_level: usize,
    probability: f64,
    /// `prob_table[i]` is the chance a node reaches level `i + 1`
    prob_table: Vec<f64>,
    len: usize,
    size: usize,
    rng: StdRng,
}

impl SkipList {
    /// Create an empty skip list
    pub fn new(max_level: usize, probability: f64) -> Self {
        let max_level = max_level.max(1);
        let head = Node {
            record: ValueRecord::tombstone(String::new()),
            next: vec![None; max_level],
        };

        Self {
            nodes: vec![head],
            free: Vec::new(),
            max_level,
            probability,
            prob_table: probability_table(probability, max_level),
            len: 0,
            size: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Insert or overwrite. Returns the stored record.
    ///
    /// An existing key keeps its node; only the payload and tombstone flag
    /// change, and the length is untouched.
    pub fn set(&mut self, record: ValueRecord) -> &ValueRecord {
        let trail = self.back_nodes(&record.key);

        if let Some(idx) = self.nodes[trail[0]].next[0] {
            if self.nodes[idx].record.key == record.key {
                let old_size = self.nodes[idx].record.approximate_size();
                self.size = self.size - old_size + record.approximate_size();

                let existing = &mut self.nodes[idx].record;
                existing.value = record.value;
                existing.deleted = record.deleted;
                return &self.nodes[idx].record;
            }
        }

        let height = self.random_level();
        let next = (0..height).map(|level| self.nodes[trail[level]].next[level]).collect();

        self.size += record.approximate_size();
        let idx = self.alloc(Node { record, next });
        for (level, &prev) in trail.iter().enumerate().take(height) {
            self.nodes[prev].next[level] = Some(idx);
        }

        self.len += 1;
        &self.nodes[idx].record
    }

    /// Look up `key`
    pub fn search(&self, key: &str) -> Option<&ValueRecord> {
        let mut prev = HEAD;
        for level in (0..self.max_level).rev() {
            prev = self.advance(prev, level, key);
        }

        let idx = self.nodes[prev].next[0]?;
        let record = &self.nodes[idx].record;
        (record.key == key).then_some(record)
    }

    /// Physically unlink `key`. Returns whether a node was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        let trail = self.back_nodes(key);

        let target = match self.nodes[trail[0]].next[0] {
            Some(idx) if self.nodes[idx].record.key == key => idx,
            _ => return false,
        };

        for level in 0..self.nodes[target].next.len() {
            let prev = trail[level];
            if self.nodes[prev].next[level] == Some(target) {
                self.nodes[prev].next[level] = self.nodes[target].next[level];
            }
        }

        let node = &mut self.nodes[target];
        self.size -= node.record.approximate_size();
        node.next.clear();
        node.record = ValueRecord::tombstone(String::new());
        self.free.push(target);
        self.len -= 1;
        true
    }

    /// All records in key order
    pub fn values(&self) -> Vec<ValueRecord> {
        self.iter().cloned().collect()
    }

    /// Iterate records in key order along level 0
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.nodes[HEAD].next[0],
        }
    }

    /// Replace this list with an empty one of the same shape and return the
    /// displaced contents
    pub fn swap(&mut self) -> SkipList {
        let fresh = SkipList::new(self.max_level, self.probability);
        std::mem::replace(self, fresh)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Approximate payload bytes held
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Walk right along `level` while the next key is below `key`
    fn advance(&self, mut prev: usize, level: usize, key: &str) -> usize {
        while let Some(next) = self.nodes[prev].next[level] {
            if self.nodes[next].record.key.as_str() < key {
                prev = next;
            } else {
                break;
            }
        }
        prev
    }

    /// Last node before `key` on every level, highest first
    fn back_nodes(&self, key: &str) -> Vec<usize> {
        let mut trail = vec![HEAD; self.max_level];
        let mut prev = HEAD;
        for level in (0..self.max_level).rev() {
            prev = self.advance(prev, level, key);
            trail[level] = prev;
        }
        trail
    }

    fn random_level(&mut self) -> usize {
        let r: f64 = self.rng.gen();
        let mut level = 1;
        while level < self.max_level && r < self.prob_table[level] {
            level += 1;
        }
        level
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }
}

/// `p^i` for every level index
fn probability_table(probability: f64, max_level: usize) -> Vec<f64> {
    (0..max_level).map(|i| probability.powi(i as i32)).collect()
}

/// Ordered iterator over a [`SkipList`]
pub struct Iter<'a> {
    list: &'a SkipList,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a ValueRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = &self.list.nodes[idx];
        self.cursor = node.next[0];
        Some(&node.record)
    }
}
