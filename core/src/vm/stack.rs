use core::fmt;

use thiserror::Error;

/// A push past the configured slot limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("value stack limit of {limit} slots exceeded")]
pub struct StackOverflow {
    pub limit: usize,
}

/// The VM's value stack: locals of every active frame followed by the
/// operands of the innermost one.
///
/// `capacity` is the configured slot limit. The VM checks a frame's
/// headroom against it before entering a call; `push` and `push_n` refuse
/// to exceed it regardless of what a chunk declares.
pub struct Stack<T> {
    items: Vec<T>,
    limit: usize,
}

impl<T> Stack<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Vec::with_capacity(limit.min(256)),
            limit,
        }
    }

    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), StackOverflow> {
        if self.items.len() >= self.limit {
            return Err(StackOverflow { limit: self.limit });
        }
        self.items.push(value);
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    /// Value `depth` slots below the top; `peek_at(0)` is the top.
    #[inline]
    pub fn peek_at(&self, depth: usize) -> Option<&T> {
        let index = self.items.len().checked_sub(depth.checked_add(1)?)?;
        self.items.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The slot limit, not the allocation size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.limit
    }

    /// Unwinds to `len` slots, dropping a returning frame.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    /// Takes the top `n` values in push order.
    pub fn pop_n(&mut self, n: usize) -> Option<Vec<T>> {
        let start = self.items.len().checked_sub(n)?;
        Some(self.items.split_off(start))
    }

    /// Slot at absolute position `index`, counted from the bottom.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }
}

impl<T: Clone> Stack<T> {
    /// Reserves `count` slots holding `value`, e.g. a frame's locals.
    pub fn push_n(&mut self, value: T, count: usize) -> Result<(), StackOverflow> {
        if self.limit.saturating_sub(self.items.len()) < count {
            return Err(StackOverflow { limit: self.limit });
        }
        self.items.extend(core::iter::repeat_n(value, count));
        Ok(())
    }
}

impl<T: fmt::Debug> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("items", &self.items)
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifo() {
        let mut stack = Stack::new(8);
        assert!(stack.is_empty());
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.peek(), Some(&2));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.capacity(), 8);
    }

    #[test]
    fn test_peek_at_counts_from_top() {
        let mut stack = Stack::new(8);
        for i in 1..=3 {
            stack.push(i).unwrap();
        }
        assert_eq!(stack.peek_at(0), Some(&3));
        assert_eq!(stack.peek_at(2), Some(&1));
        assert_eq!(stack.peek_at(3), None);
        assert_eq!(stack.peek_at(usize::MAX), None);
        assert_eq!(Stack::<i32>::new(1).peek_at(0), None);
    }

    #[test]
    fn test_pop_n_keeps_push_order() {
        let mut stack = Stack::new(8);
        for i in 1..=4 {
            stack.push(i).unwrap();
        }
        assert_eq!(stack.pop_n(2), Some(vec![3, 4]));
        assert_eq!(stack.pop_n(3), None);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop_n(0), Some(vec![]));
    }

    #[test]
    fn test_frame_slots() {
        let mut stack = Stack::new(8);
        stack.push(-1).unwrap();
        stack.push_n(0, 3).unwrap();
        *stack.get_mut(2).unwrap() = 7;
        assert_eq!(stack.get(2), Some(&7));
        stack.truncate(1);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.get(2), None);
    }

    #[test]
    fn test_limit_is_enforced() {
        let mut stack = Stack::new(2);
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.push(3), Err(StackOverflow { limit: 2 }));
        assert_eq!(stack.len(), 2);

        stack.truncate(1);
        assert_eq!(stack.push_n(0, 2), Err(StackOverflow { limit: 2 }));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.push_n(0, 1), Ok(()));
    }
}
