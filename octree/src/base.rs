use std::mem;

use crate::{
    iter::Iter,
    node::{self, Children},
};

/// An octree of fixed depth whose leaves are addressed by integer keys in
/// `[0, 2^depth)` on each axis.
#[derive(Debug, Clone)]
pub struct OcTree<L> {
    root: Children<L>,
    depth: usize,
    len: usize,
}

impl<L> OcTree<L> {
    /// # Panics
    ///
    /// If `depth` is 0 or doesn't fit a key.
    pub fn new(depth: usize) -> Self {
        assert!((1..usize::BITS as usize).contains(&depth));
        OcTree {
            root: Default::default(),
            depth,
            len: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max_key(&self) -> usize {
        (1 << self.depth) - 1
    }

    /// The number of leaves.
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn mask(&self) -> usize {
        1 << (self.depth - 1)
    }

    fn contains_key(&self, key: &[usize; 3]) -> bool {
        key.iter().all(|&k| k <= self.max_key())
    }

    pub fn get(&self, key: &[usize; 3]) -> Option<&L> {
        if !self.contains_key(key) {
            return None;
        }
        node::find(&self.root, key, self.mask())
    }

    pub fn get_mut(&mut self, key: &[usize; 3]) -> Option<&mut L> {
        if !self.contains_key(key) {
            return None;
        }
        let mask = self.mask();
        node::find_mut(&mut self.root, key, mask)
    }

    /// # Panics
    ///
    /// If `key` is out of range.
    pub fn get_or_insert_with<F>(&mut self, key: &[usize; 3], content: F) -> &mut L
    where
        F: FnOnce() -> L,
    {
        assert!(self.contains_key(key), "key {key:?} out of range");
        let mask = self.mask();
        let len = &mut self.len;
        node::get_or_insert_with(&mut self.root, key, mask, || {
            *len += 1;
            content()
        })
    }

    /// Returns the previous content at `key`, if any.
    pub fn insert(&mut self, key: &[usize; 3], content: L) -> Option<L> {
        if let Some(old) = self.get_mut(key) {
            return Some(mem::replace(old, content));
        }
        self.get_or_insert_with(key, || content);
        None
    }

    pub fn remove(&mut self, key: &[usize; 3]) -> Option<L> {
        if !self.contains_key(key) {
            return None;
        }
        let mask = self.mask();
        let ret = node::remove(&mut self.root, key, mask);
        if ret.is_some() {
            self.len -= 1;
        }
        ret
    }

    /// Leaves with their keys, depth first in child order.
    pub fn iter(&self) -> Iter<'_, L> {
        Iter::new(&self.root, self.mask())
    }
}
