//! Persistent append-only list.
//!
//! Appending allocates one node and shares every existing node with the
//! list it was derived from, so deriving a plan from another never copies
//! its accumulated filters, annotations or order keys.

use std::sync::Arc;

use serde::ser::{Serialize, SerializeSeq, Serializer};

struct Node<T> {
    value: T,
    prev: Option<Arc<Node<T>>>,
}

pub struct PList<T> {
    last: Option<Arc<Node<T>>>,
    len: usize,
}

impl<T> PList<T> {
    pub fn new() -> Self {
        Self { last: None, len: 0 }
    }

    /// A new list with `value` appended. `self` is unchanged.
    #[must_use]
    pub fn push(&self, value: T) -> Self {
        Self {
            last: Some(Arc::new(Node {
                value,
                prev: self.last.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements in insertion order.
    pub fn to_vec(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.last.as_deref();
        while let Some(node) = cursor {
            out.push(&node.value);
            cursor = node.prev.as_deref();
        }
        out.reverse();
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.to_vec().into_iter()
    }

    /// Whether `self` and `other` share their last node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.last, &other.last) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Clone for PList<T> {
    fn clone(&self) -> Self {
        Self {
            last: self.last.clone(),
            len: self.len,
        }
    }
}

impl<T> Default for PList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Serialize> Serialize for PList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len))?;
        for item in self.iter() {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

impl<T> Drop for PList<T> {
    // Unlink iteratively so long lists don't overflow the stack.
    fn drop(&mut self) {
        let mut cursor = self.last.take();
        while let Some(node) = cursor {
            match Arc::try_unwrap(node) {
                Ok(mut node) => cursor = node.prev.take(),
                Err(_) => break,
            }
        }
    }
}
