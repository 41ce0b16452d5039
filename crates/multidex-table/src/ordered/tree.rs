//! Arena-backed red-black tree topology.
//!
//! The tree only manages links and colors. Each node carries an opaque payload
//! `V` that rotations and rebalancing never look at, so the same code serves
//! the ordered index (payload = packed handle array) and the payload-free
//! topology tests below.
//!
//! Node 0 is the head sentinel and doubles as the nil leaf. Its `parent` is the
//! root, its `left` the leftmost node and its `right` the rightmost node; all
//! three are 0 when the tree is empty. The sentinel is always black.

use multidex_common::{MultidexError, Result};

/// Arena index of a tree node.
pub(crate) type NodeId = u32;

/// Head sentinel and nil leaf.
pub(crate) const NIL: NodeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Color {
    Red,
    Black,
}

/// Which child slot of a parent a node occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

struct Node<V> {
    parent: NodeId,
    left: NodeId,
    right: NodeId,
    color: Color,
    value: V,
}

impl<V: Default> Node<V> {
    fn sentinel() -> Self {
        Self {
            parent: NIL,
            left: NIL,
            right: NIL,
            color: Color::Black,
            value: V::default(),
        }
    }
}

pub(crate) struct RbTree<V> {
    nodes: Vec<Node<V>>,
    free: Vec<NodeId>,
    count: usize,
}

impl<V: Default> RbTree<V> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node::sentinel()],
            free: Vec::new(),
            count: 0,
        }
    }

    /// Number of live nodes.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub(crate) fn root(&self) -> NodeId {
        self.nodes[NIL as usize].parent
    }

    #[inline]
    pub(crate) fn leftmost(&self) -> NodeId {
        self.nodes[NIL as usize].left
    }

    #[inline]
    pub(crate) fn rightmost(&self) -> NodeId {
        self.nodes[NIL as usize].right
    }

    #[inline]
    pub(crate) fn parent(&self, n: NodeId) -> NodeId {
        self.nodes[n as usize].parent
    }

    #[inline]
    pub(crate) fn left(&self, n: NodeId) -> NodeId {
        self.nodes[n as usize].left
    }

    #[inline]
    pub(crate) fn right(&self, n: NodeId) -> NodeId {
        self.nodes[n as usize].right
    }

    #[inline]
    pub(crate) fn value(&self, n: NodeId) -> &V {
        &self.nodes[n as usize].value
    }

    #[inline]
    pub(crate) fn value_mut(&mut self, n: NodeId) -> &mut V {
        &mut self.nodes[n as usize].value
    }

    #[inline]
    fn color(&self, n: NodeId) -> Color {
        self.nodes[n as usize].color
    }

    #[inline]
    fn set_color(&mut self, n: NodeId, color: Color) {
        if n != NIL {
            self.nodes[n as usize].color = color;
        }
    }

    #[inline]
    fn set_parent(&mut self, n: NodeId, parent: NodeId) {
        // The sentinel's parent field holds the root.
        if n != NIL {
            self.nodes[n as usize].parent = parent;
        }
    }

    #[inline]
    fn set_left(&mut self, n: NodeId, child: NodeId) {
        debug_assert!(n != NIL);
        self.nodes[n as usize].left = child;
    }

    #[inline]
    fn set_right(&mut self, n: NodeId, child: NodeId) {
        debug_assert!(n != NIL);
        self.nodes[n as usize].right = child;
    }

    #[inline]
    fn set_root(&mut self, n: NodeId) {
        self.nodes[NIL as usize].parent = n;
    }

    #[inline]
    fn set_leftmost(&mut self, n: NodeId) {
        self.nodes[NIL as usize].left = n;
    }

    #[inline]
    fn set_rightmost(&mut self, n: NodeId) {
        self.nodes[NIL as usize].right = n;
    }

    /// Points whichever link referenced `old` under `parent` at `new`.
    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        if parent == NIL {
            self.set_root(new);
        } else if self.left(parent) == old {
            self.set_left(parent, new);
        } else {
            self.set_right(parent, new);
        }
    }

    pub(crate) fn min(&self, mut n: NodeId) -> NodeId {
        while self.left(n) != NIL {
            n = self.left(n);
        }
        n
    }

    pub(crate) fn max(&self, mut n: NodeId) -> NodeId {
        while self.right(n) != NIL {
            n = self.right(n);
        }
        n
    }

    /// In-order successor, or `NIL` past the rightmost node.
    pub(crate) fn next(&self, mut n: NodeId) -> NodeId {
        if n == NIL {
            return NIL;
        }
        if self.right(n) != NIL {
            return self.min(self.right(n));
        }
        let mut p = self.parent(n);
        while p != NIL && n == self.right(p) {
            n = p;
            p = self.parent(p);
        }
        p
    }

    /// In-order predecessor. `prev(NIL)` is the rightmost node.
    pub(crate) fn prev(&self, mut n: NodeId) -> NodeId {
        if n == NIL {
            return self.rightmost();
        }
        if self.left(n) != NIL {
            return self.max(self.left(n));
        }
        let mut p = self.parent(n);
        while p != NIL && n == self.left(p) {
            n = p;
            p = self.parent(p);
        }
        p
    }

    fn allocate(&mut self, value: V) -> Result<NodeId> {
        let node = Node {
            parent: NIL,
            left: NIL,
            right: NIL,
            color: Color::Red,
            value,
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id as usize] = node;
            return Ok(id);
        }
        if self.nodes.len() > NodeId::MAX as usize {
            return Err(MultidexError::out_of_memory("allocating tree node", 1));
        }
        self.nodes
            .try_reserve(1)
            .map_err(|_| MultidexError::out_of_memory("allocating tree node", 1))?;
        // Keep room to recycle every node so release never allocates.
        self.free
            .try_reserve(self.nodes.len())
            .map_err(|_| MultidexError::out_of_memory("allocating tree node", 1))?;
        self.nodes.push(node);
        Ok((self.nodes.len() - 1) as NodeId)
    }

    fn release(&mut self, n: NodeId) -> V {
        let node = &mut self.nodes[n as usize];
        node.parent = NIL;
        node.left = NIL;
        node.right = NIL;
        self.free.push(n);
        std::mem::take(&mut node.value)
    }

    fn rotate_left(&mut self, x: NodeId) {
        let y = self.right(x);
        let xp = self.parent(x);
        let yl = self.left(y);

        self.set_right(x, yl);
        self.set_parent(yl, x);
        self.set_parent(y, xp);
        self.replace_child(xp, x, y);
        self.set_left(y, x);
        self.set_parent(x, y);
    }

    fn rotate_right(&mut self, x: NodeId) {
        let y = self.left(x);
        let xp = self.parent(x);
        let yr = self.right(y);

        self.set_left(x, yr);
        self.set_parent(yr, x);
        self.set_parent(y, xp);
        self.replace_child(xp, x, y);
        self.set_right(y, x);
        self.set_parent(x, y);
    }

    /// Links a new red node into the empty `side` slot of `parent` and
    /// rebalances. `parent == NIL` installs the root of an empty tree.
    pub(crate) fn attach(&mut self, parent: NodeId, side: Side, value: V) -> Result<NodeId> {
        let z = self.allocate(value)?;
        self.nodes[z as usize].parent = parent;

        if parent == NIL {
            debug_assert!(self.root() == NIL);
            self.set_root(z);
            self.set_leftmost(z);
            self.set_rightmost(z);
        } else {
            match side {
                Side::Left => {
                    debug_assert!(self.left(parent) == NIL);
                    self.set_left(parent, z);
                    if parent == self.leftmost() {
                        self.set_leftmost(z);
                    }
                }
                Side::Right => {
                    debug_assert!(self.right(parent) == NIL);
                    self.set_right(parent, z);
                    if parent == self.rightmost() {
                        self.set_rightmost(z);
                    }
                }
            }
        }

        self.count += 1;
        self.insert_fixup(z);
        Ok(z)
    }

    fn insert_fixup(&mut self, mut z: NodeId) {
        while z != self.root() && self.color(self.parent(z)) == Color::Red {
            let p = self.parent(z);
            let g = self.parent(p);
            if p == self.left(g) {
                let uncle = self.right(g);
                if self.color(uncle) == Color::Red {
                    self.set_color(p, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(g, Color::Red);
                    z = g;
                } else {
                    if z == self.right(p) {
                        z = p;
                        self.rotate_left(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.rotate_right(g);
                }
            } else {
                let uncle = self.left(g);
                if self.color(uncle) == Color::Red {
                    self.set_color(p, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(g, Color::Red);
                    z = g;
                } else {
                    if z == self.left(p) {
                        z = p;
                        self.rotate_right(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.rotate_left(g);
                }
            }
        }
        let root = self.root();
        self.set_color(root, Color::Black);
    }

    /// Unlinks `z`, rebalances, and returns its payload.
    pub(crate) fn remove(&mut self, z: NodeId) -> V {
        debug_assert!(z != NIL);
        let zp = self.parent(z);
        let zl = self.left(z);
        let zr = self.right(z);

        let x;
        let x_parent;
        let removed_color;

        if zl == NIL || zr == NIL {
            // At most one child: splice it into z's place.
            x = if zl == NIL { zr } else { zl };
            x_parent = zp;
            removed_color = self.color(z);

            self.set_parent(x, zp);
            self.replace_child(zp, z, x);

            if self.leftmost() == z {
                let lm = if zr == NIL { zp } else { self.min(x) };
                self.set_leftmost(lm);
            }
            if self.rightmost() == z {
                let rm = if zl == NIL { zp } else { self.max(x) };
                self.set_rightmost(rm);
            }
        } else {
            // Two children: lift the in-order successor y into z's place.
            let y = self.min(zr);
            x = self.right(y);
            removed_color = self.color(y);

            self.set_parent(zl, y);
            self.set_left(y, zl);
            if y != zr {
                let yp = self.parent(y);
                x_parent = yp;
                self.set_parent(x, yp);
                self.set_left(yp, x);
                self.set_right(y, zr);
                self.set_parent(zr, y);
            } else {
                x_parent = y;
            }
            self.replace_child(zp, z, y);
            self.set_parent(y, zp);
            let z_color = self.color(z);
            self.set_color(y, z_color);
        }

        if removed_color == Color::Black {
            self.erase_fixup(x, x_parent);
        }

        self.count -= 1;
        self.release(z)
    }

    fn erase_fixup(&mut self, mut x: NodeId, mut x_parent: NodeId) {
        while x != self.root() && self.color(x) == Color::Black {
            if x == self.left(x_parent) {
                let mut w = self.right(x_parent);
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(x_parent, Color::Red);
                    self.rotate_left(x_parent);
                    w = self.right(x_parent);
                }
                if self.color(self.left(w)) == Color::Black
                    && self.color(self.right(w)) == Color::Black
                {
                    self.set_color(w, Color::Red);
                    x = x_parent;
                    x_parent = self.parent(x);
                } else {
                    if self.color(self.right(w)) == Color::Black {
                        let wl = self.left(w);
                        self.set_color(wl, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_right(w);
                        w = self.right(x_parent);
                    }
                    let pc = self.color(x_parent);
                    self.set_color(w, pc);
                    self.set_color(x_parent, Color::Black);
                    let wr = self.right(w);
                    self.set_color(wr, Color::Black);
                    self.rotate_left(x_parent);
                    break;
                }
            } else {
                let mut w = self.left(x_parent);
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(x_parent, Color::Red);
                    self.rotate_right(x_parent);
                    w = self.left(x_parent);
                }
                if self.color(self.right(w)) == Color::Black
                    && self.color(self.left(w)) == Color::Black
                {
                    self.set_color(w, Color::Red);
                    x = x_parent;
                    x_parent = self.parent(x);
                } else {
                    if self.color(self.left(w)) == Color::Black {
                        let wr = self.right(w);
                        self.set_color(wr, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_left(w);
                        w = self.left(x_parent);
                    }
                    let pc = self.color(x_parent);
                    self.set_color(w, pc);
                    self.set_color(x_parent, Color::Black);
                    let wl = self.left(w);
                    self.set_color(wl, Color::Black);
                    self.rotate_right(x_parent);
                    break;
                }
            }
        }
        self.set_color(x, Color::Black);
    }

    /// Drops every node. Runs in O(n) without recursion.
    pub(crate) fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[NIL as usize] = Node::sentinel();
        self.free.clear();
        self.count = 0;
    }

    /// Checks links, colors, black heights and the sentinel extremes.
    pub(crate) fn check(&self) -> Result<()> {
        let corrupted = |msg: String| Err(MultidexError::IndexCorrupted(msg));

        if self.color(NIL) != Color::Black {
            return corrupted("sentinel is not black".to_string());
        }
        let root = self.root();
        if root == NIL {
            if self.leftmost() != NIL || self.rightmost() != NIL || self.count != 0 {
                return corrupted("empty tree with dangling sentinel links".to_string());
            }
            return Ok(());
        }
        if self.color(root) != Color::Black {
            return corrupted(format!("root {root} is red"));
        }
        if self.parent(root) != NIL {
            return corrupted(format!("root {root} has a parent"));
        }
        if self.leftmost() != self.min(root) {
            return corrupted("leftmost sentinel link is stale".to_string());
        }
        if self.rightmost() != self.max(root) {
            return corrupted("rightmost sentinel link is stale".to_string());
        }

        let mut visited = 0;
        self.check_subtree(root, &mut visited)?;
        if visited != self.count {
            return corrupted(format!(
                "tree counts {} nodes, {visited} reachable",
                self.count
            ));
        }
        Ok(())
    }

    /// Returns the black height of the subtree rooted at `n`.
    fn check_subtree(&self, n: NodeId, visited: &mut usize) -> Result<usize> {
        if n == NIL {
            return Ok(1);
        }
        *visited += 1;
        let (l, r) = (self.left(n), self.right(n));
        for child in [l, r] {
            if child != NIL && self.parent(child) != n {
                return Err(MultidexError::IndexCorrupted(format!(
                    "node {child} does not point back to parent {n}"
                )));
            }
            if self.color(n) == Color::Red && self.color(child) == Color::Red {
                return Err(MultidexError::IndexCorrupted(format!(
                    "red node {n} has red child {child}"
                )));
            }
        }
        let lh = self.check_subtree(l, visited)?;
        let rh = self.check_subtree(r, visited)?;
        if lh != rh {
            return Err(MultidexError::IndexCorrupted(format!(
                "black height mismatch under node {n}: {lh} vs {rh}"
            )));
        }
        Ok(lh + usize::from(self.color(n) == Color::Black))
    }
}

impl<V: Default> Default for RbTree<V> {
    fn default() -> Self {
        Self::new()
    }
}
