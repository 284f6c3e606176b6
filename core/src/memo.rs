//! Memoization of pure native calls.
//!
//! A call is announced with [`MemoCache::stack`] before it runs and settled
//! with [`MemoCache::store`] afterwards. Natives can re-enter the VM, so
//! several calls may be pending at once; they always settle in LIFO order.

use smallvec::SmallVec;
use tracing::trace;

use crate::values::Value;

pub type MemoArgs = SmallVec<[Value; 4]>;

#[derive(Debug)]
struct Entry {
    name: String,
    args: MemoArgs,
    result: Option<Value>,
}

#[derive(Debug, Default)]
pub struct MemoCache {
    entries: Vec<Entry>,
    /// Indices into `entries` of calls that have not settled yet.
    pending: Vec<usize>,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a settled result for `name` called with `args`. Arguments
    /// match structurally, so `2` and `2.0` are different calls.
    pub fn get(&self, name: &str, args: &[Value]) -> Option<Value> {
        self.entries
            .iter()
            .find(|entry| {
                entry.result.is_some()
                    && entry.name == name
                    && entry.args.len() == args.len()
                    && entry.args.iter().zip(args).all(|(a, b)| a == b)
            })
            .and_then(|entry| entry.result.clone())
    }

    /// Records a pending call.
    pub fn stack(&mut self, name: &str, args: &[Value]) {
        trace!(name, depth = self.pending.len(), "memo stack");
        self.pending.push(self.entries.len());
        self.entries.push(Entry {
            name: name.to_string(),
            args: args.iter().cloned().collect(),
            result: None,
        });
    }

    /// Settles the most recently stacked call. Returns false when nothing is
    /// pending.
    pub fn store(&mut self, result: Value) -> bool {
        let Some(index) = self.pending.pop() else {
            return false;
        };
        trace!(name = %self.entries[index].name, "memo store");
        self.entries[index].result = Some(result);
        true
    }

    /// Drops the most recently stacked call without a result.
    pub fn discard(&mut self) {
        if let Some(index) = self.pending.pop() {
            self.entries.remove(index);
        }
    }

    /// Number of calls stacked and not yet settled.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of settled results.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
    }
}
