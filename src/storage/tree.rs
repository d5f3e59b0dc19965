//! Size-augmented, threaded AVL trees laid out inside the link records.
//!
//! Each record carries one node block per index. A node block holds `left`,
//! `right`, `size` and `meta`. When a node has no left (right) child, the
//! `left` (`right`) field holds its in-order predecessor (successor) instead,
//! with 0 meaning "none"; the `meta` flags tell the two cases apart. Threads
//! make in-order iteration and cursor resumption stack-free, sizes give
//! logarithmic rank and count queries.
//!
//! Nodes are never removed, so only the insertion half of AVL balancing
//! exists here.

use std::cmp::Ordering;

use crate::types::LinkId;

use super::layout::{
    NodeStore, NODE_LEFT, NODE_META, NODE_RIGHT, NODE_SIZE, SOURCE, SOURCE_TREE, TARGET,
    TARGET_TREE,
};

const BALANCE_MASK: u64 = 0xFF;
const LEFT_IS_CHILD: u64 = 1 << 8;
const RIGHT_IS_CHILD: u64 = 1 << 9;

/// Ordering key of a node: primary field, secondary field, then id.
pub(crate) type Key = (u64, u64, LinkId);

/// Describes one index: where its node block lives and which record fields
/// order it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeLayout {
    base: usize,
    primary: usize,
    secondary: usize,
}

/// Index ordered by `(source, target)`.
pub(crate) const BY_SOURCE: TreeLayout = TreeLayout {
    base: SOURCE_TREE,
    primary: SOURCE,
    secondary: TARGET,
};

/// Index ordered by `(target, source)`.
pub(crate) const BY_TARGET: TreeLayout = TreeLayout {
    base: TARGET_TREE,
    primary: TARGET,
    secondary: SOURCE,
};

impl TreeLayout {
    pub fn key<S: NodeStore>(&self, store: &S, node: LinkId) -> Key {
        (
            store.field(node, self.primary),
            store.field(node, self.secondary),
            node,
        )
    }

    fn left_raw<S: NodeStore>(&self, store: &S, node: LinkId) -> LinkId {
        store.field(node, self.base + NODE_LEFT)
    }

    fn right_raw<S: NodeStore>(&self, store: &S, node: LinkId) -> LinkId {
        store.field(node, self.base + NODE_RIGHT)
    }

    fn set_left_raw<S: NodeStore>(&self, store: &mut S, node: LinkId, value: LinkId) {
        store.set_field(node, self.base + NODE_LEFT, value);
    }

    fn set_right_raw<S: NodeStore>(&self, store: &mut S, node: LinkId, value: LinkId) {
        store.set_field(node, self.base + NODE_RIGHT, value);
    }

    fn meta<S: NodeStore>(&self, store: &S, node: LinkId) -> u64 {
        store.field(node, self.base + NODE_META)
    }

    fn set_flag<S: NodeStore>(&self, store: &mut S, node: LinkId, flag: u64, on: bool) {
        let meta = self.meta(store, node);
        let meta = if on { meta | flag } else { meta & !flag };
        store.set_field(node, self.base + NODE_META, meta);
    }

    pub fn balance<S: NodeStore>(&self, store: &S, node: LinkId) -> i8 {
        (self.meta(store, node) & BALANCE_MASK) as u8 as i8
    }

    fn set_balance<S: NodeStore>(&self, store: &mut S, node: LinkId, balance: i8) {
        let meta = (self.meta(store, node) & !BALANCE_MASK) | u64::from(balance as u8);
        store.set_field(node, self.base + NODE_META, meta);
    }

    pub fn size<S: NodeStore>(&self, store: &S, node: LinkId) -> u64 {
        store.field(node, self.base + NODE_SIZE)
    }

    fn set_size<S: NodeStore>(&self, store: &mut S, node: LinkId, size: u64) {
        store.set_field(node, self.base + NODE_SIZE, size);
    }

    pub fn left_child<S: NodeStore>(&self, store: &S, node: LinkId) -> Option<LinkId> {
        (self.meta(store, node) & LEFT_IS_CHILD != 0).then(|| self.left_raw(store, node))
    }

    pub fn right_child<S: NodeStore>(&self, store: &S, node: LinkId) -> Option<LinkId> {
        (self.meta(store, node) & RIGHT_IS_CHILD != 0).then(|| self.right_raw(store, node))
    }

    /// Predecessor thread of a node without a left child.
    pub fn left_thread<S: NodeStore>(&self, store: &S, node: LinkId) -> Option<LinkId> {
        match self.left_child(store, node) {
            Some(_) => None,
            None => Some(self.left_raw(store, node)),
        }
    }

    /// Successor thread of a node without a right child.
    pub fn right_thread<S: NodeStore>(&self, store: &S, node: LinkId) -> Option<LinkId> {
        match self.right_child(store, node) {
            Some(_) => None,
            None => Some(self.right_raw(store, node)),
        }
    }

    fn subtree_size<S: NodeStore>(&self, store: &S, node: Option<LinkId>) -> u64 {
        node.map_or(0, |n| self.size(store, n))
    }

    /// Links `node` into the tree rooted at `root`. The node's key fields
    /// must already be written.
    pub fn insert<S: NodeStore>(&self, store: &mut S, root: &mut LinkId, node: LinkId) {
        self.set_left_raw(store, node, 0);
        self.set_right_raw(store, node, 0);
        self.set_size(store, node, 1);
        store.set_field(node, self.base + NODE_META, 0);

        if *root == 0 {
            *root = node;
            return;
        }

        let key = self.key(store, node);
        let mut path: Vec<(LinkId, bool)> = Vec::with_capacity(64);
        let mut current = *root;
        loop {
            let go_left = key < self.key(store, current);
            path.push((current, go_left));
            if go_left {
                match self.left_child(store, current) {
                    Some(next) => current = next,
                    None => {
                        let predecessor = self.left_raw(store, current);
                        self.set_left_raw(store, node, predecessor);
                        self.set_right_raw(store, node, current);
                        self.set_left_raw(store, current, node);
                        self.set_flag(store, current, LEFT_IS_CHILD, true);
                        break;
                    }
                }
            } else {
                match self.right_child(store, current) {
                    Some(next) => current = next,
                    None => {
                        let successor = self.right_raw(store, current);
                        self.set_right_raw(store, node, successor);
                        self.set_left_raw(store, node, current);
                        self.set_right_raw(store, current, node);
                        self.set_flag(store, current, RIGHT_IS_CHILD, true);
                        break;
                    }
                }
            }
        }

        for &(ancestor, _) in &path {
            let size = self.size(store, ancestor);
            self.set_size(store, ancestor, size + 1);
        }

        let mut depth = path.len();
        while depth > 0 {
            depth -= 1;
            let (current, went_left) = path[depth];
            let balance = self.balance(store, current) + if went_left { -1 } else { 1 };
            self.set_balance(store, current, balance);
            match balance {
                0 => break,
                -1 | 1 => continue,
                _ => {
                    let subtree = self.rebalance(store, current, balance);
                    if depth == 0 {
                        *root = subtree;
                    } else {
                        let (parent, parent_left) = path[depth - 1];
                        if parent_left {
                            self.set_left_raw(store, parent, subtree);
                        } else {
                            self.set_right_raw(store, parent, subtree);
                        }
                    }
                    break;
                }
            }
        }
    }

    /// Restores balance at a node whose balance reached +-2 and returns the
    /// new subtree root. Balance is `height(right) - height(left)`.
    fn rebalance<S: NodeStore>(&self, store: &mut S, node: LinkId, balance: i8) -> LinkId {
        if balance > 0 {
            let right = self.right_raw(store, node);
            if self.balance(store, right) < 0 {
                let pivot = self.left_raw(store, right);
                let pivot_balance = self.balance(store, pivot);
                let lifted = self.rotate_right(store, right);
                self.set_right_raw(store, node, lifted);
                let top = self.rotate_left(store, node);
                self.set_balance(store, node, if pivot_balance > 0 { -1 } else { 0 });
                self.set_balance(store, right, if pivot_balance < 0 { 1 } else { 0 });
                self.set_balance(store, pivot, 0);
                top
            } else {
                let right_balance = self.balance(store, right);
                let top = self.rotate_left(store, node);
                if right_balance == 0 {
                    self.set_balance(store, node, 1);
                    self.set_balance(store, right, -1);
                } else {
                    self.set_balance(store, node, 0);
                    self.set_balance(store, right, 0);
                }
                top
            }
        } else {
            let left = self.left_raw(store, node);
            if self.balance(store, left) > 0 {
                let pivot = self.right_raw(store, left);
                let pivot_balance = self.balance(store, pivot);
                let lifted = self.rotate_left(store, left);
                self.set_left_raw(store, node, lifted);
                let top = self.rotate_right(store, node);
                self.set_balance(store, node, if pivot_balance < 0 { 1 } else { 0 });
                self.set_balance(store, left, if pivot_balance > 0 { -1 } else { 0 });
                self.set_balance(store, pivot, 0);
                top
            } else {
                let left_balance = self.balance(store, left);
                let top = self.rotate_right(store, node);
                if left_balance == 0 {
                    self.set_balance(store, node, -1);
                    self.set_balance(store, left, 1);
                } else {
                    self.set_balance(store, node, 0);
                    self.set_balance(store, left, 0);
                }
                top
            }
        }
    }

    fn rotate_left<S: NodeStore>(&self, store: &mut S, node: LinkId) -> LinkId {
        let right = self.right_raw(store, node);
        match self.left_child(store, right) {
            Some(inner) => self.set_right_raw(store, node, inner),
            None => {
                // `node` is the in-order predecessor of `right`.
                self.set_right_raw(store, node, right);
                self.set_flag(store, node, RIGHT_IS_CHILD, false);
            }
        }
        self.set_left_raw(store, right, node);
        self.set_flag(store, right, LEFT_IS_CHILD, true);

        let total = self.size(store, node);
        self.set_size(store, right, total);
        let node_size = self.subtree_size(store, self.left_child(store, node))
            + self.subtree_size(store, self.right_child(store, node))
            + 1;
        self.set_size(store, node, node_size);
        right
    }

    fn rotate_right<S: NodeStore>(&self, store: &mut S, node: LinkId) -> LinkId {
        let left = self.left_raw(store, node);
        match self.right_child(store, left) {
            Some(inner) => self.set_left_raw(store, node, inner),
            None => {
                self.set_left_raw(store, node, left);
                self.set_flag(store, node, LEFT_IS_CHILD, false);
            }
        }
        self.set_right_raw(store, left, node);
        self.set_flag(store, left, RIGHT_IS_CHILD, true);

        let total = self.size(store, node);
        self.set_size(store, left, total);
        let node_size = self.subtree_size(store, self.left_child(store, node))
            + self.subtree_size(store, self.right_child(store, node))
            + 1;
        self.set_size(store, node, node_size);
        left
    }

    /// Node whose primary and secondary fields equal the given pair.
    pub fn find<S: NodeStore>(
        &self,
        store: &S,
        root: LinkId,
        primary: u64,
        secondary: u64,
    ) -> Option<LinkId> {
        let mut current = (root != 0).then_some(root)?;
        loop {
            let (p, s, _) = self.key(store, current);
            current = match (primary, secondary).cmp(&(p, s)) {
                Ordering::Equal => return Some(current),
                Ordering::Less => self.left_child(store, current)?,
                Ordering::Greater => self.right_child(store, current)?,
            };
        }
    }

    /// First node with a key `>= bound`.
    pub fn lower_bound<S: NodeStore>(&self, store: &S, root: LinkId, bound: Key) -> Option<LinkId> {
        self.first_where(store, root, |key| key >= bound)
    }

    /// First node with a key `> bound`.
    pub fn upper_bound<S: NodeStore>(&self, store: &S, root: LinkId, bound: Key) -> Option<LinkId> {
        self.first_where(store, root, |key| key > bound)
    }

    fn first_where<S: NodeStore>(
        &self,
        store: &S,
        root: LinkId,
        accept: impl Fn(Key) -> bool,
    ) -> Option<LinkId> {
        let mut candidate = None;
        let mut current = (root != 0).then_some(root);
        while let Some(node) = current {
            if accept(self.key(store, node)) {
                candidate = Some(node);
                current = self.left_child(store, node);
            } else {
                current = self.right_child(store, node);
            }
        }
        candidate
    }

    /// In-order successor, following the right thread when there is no
    /// right subtree.
    pub fn successor<S: NodeStore>(&self, store: &S, node: LinkId) -> Option<LinkId> {
        match self.right_child(store, node) {
            Some(right) => Some(self.leftmost(store, right)),
            None => {
                let next = self.right_raw(store, node);
                (next != 0).then_some(next)
            }
        }
    }

    pub fn leftmost<S: NodeStore>(&self, store: &S, mut node: LinkId) -> LinkId {
        while let Some(left) = self.left_child(store, node) {
            node = left;
        }
        node
    }

    /// Number of nodes with a key strictly below `bound`.
    pub fn rank<S: NodeStore>(&self, store: &S, root: LinkId, bound: Key) -> u64 {
        let mut count = 0;
        let mut current = (root != 0).then_some(root);
        while let Some(node) = current {
            if self.key(store, node) < bound {
                count += self.subtree_size(store, self.left_child(store, node)) + 1;
                current = self.right_child(store, node);
            } else {
                current = self.left_child(store, node);
            }
        }
        count
    }

    /// Number of nodes whose primary field equals `primary`.
    pub fn count_primary<S: NodeStore>(&self, store: &S, root: LinkId, primary: u64) -> u64 {
        if root == 0 {
            return 0;
        }
        let below = self.rank(store, root, (primary, 0, 0));
        let through = match primary.checked_add(1) {
            Some(next) => self.rank(store, root, (next, 0, 0)),
            None => self.size(store, root),
        };
        through - below
    }

    /// Checks ordering, sizes, balance factors and threads. Returns the number
    /// of nodes reachable from `root`.
    pub fn verify<S: NodeStore>(&self, store: &S, root: LinkId) -> Result<u64, String> {
        if root == 0 {
            return Ok(0);
        }

        // In-order walk over child edges only, so threads can be checked
        // against it independently.
        let mut order = Vec::new();
        let mut stack = Vec::new();
        let mut current = Some(root);
        while current.is_some() || !stack.is_empty() {
            while let Some(node) = current {
                stack.push(node);
                current = self.left_child(store, node);
            }
            if let Some(node) = stack.pop() {
                order.push(node);
                current = self.right_child(store, node);
            }
        }

        for pair in order.windows(2) {
            if self.key(store, pair[0]) >= self.key(store, pair[1]) {
                return Err(format!("nodes {} and {} out of order", pair[0], pair[1]));
            }
        }

        for (index, &node) in order.iter().enumerate() {
            if let Some(predecessor) = self.left_thread(store, node) {
                let expected = if index == 0 { 0 } else { order[index - 1] };
                if predecessor != expected {
                    return Err(format!(
                        "node {node} predecessor thread {predecessor}, expected {expected}"
                    ));
                }
            }
            if let Some(successor) = self.right_thread(store, node) {
                let expected = order.get(index + 1).copied().unwrap_or(0);
                if successor != expected {
                    return Err(format!(
                        "node {node} successor thread {successor}, expected {expected}"
                    ));
                }
            }
        }

        // Post-order pass for heights and sizes.
        let mut heights = rustc_hash::FxHashMap::default();
        let mut pending = vec![(root, false)];
        while let Some((node, expanded)) = pending.pop() {
            let left = self.left_child(store, node);
            let right = self.right_child(store, node);
            if !expanded {
                pending.push((node, true));
                pending.extend(right.map(|r| (r, false)));
                pending.extend(left.map(|l| (l, false)));
                continue;
            }
            let height_of = |child: Option<LinkId>| child.map_or(0i64, |c| heights[&c]);
            let (left_height, right_height) = (height_of(left), height_of(right));
            let balance = right_height - left_height;
            if balance != i64::from(self.balance(store, node)) {
                return Err(format!(
                    "node {node} balance {} but subtree heights differ by {balance}",
                    self.balance(store, node)
                ));
            }
            if balance.abs() > 1 {
                return Err(format!("node {node} is unbalanced ({balance})"));
            }
            let expected_size =
                self.subtree_size(store, left) + self.subtree_size(store, right) + 1;
            if self.size(store, node) != expected_size {
                return Err(format!(
                    "node {node} size {} but subtree holds {expected_size}",
                    self.size(store, node)
                ));
            }
            heights.insert(node, left_height.max(right_height) + 1);
        }

        Ok(order.len() as u64)
    }
}
