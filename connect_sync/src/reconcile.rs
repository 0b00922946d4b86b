use std::collections::HashSet;

/// A record that is stored under a stable key, usually an ARN.
pub trait SyncRecord: Send + Sync {
    fn key(&self) -> &str;
}

/// Records split by whether their key is already stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<R> {
    pub to_insert: Vec<R>,
    pub to_update: Vec<R>,
}

impl<R> Partition<R> {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_insert.len() + self.to_update.len()
    }
}

/// Split `records` against a key snapshot. Input order is kept on both sides.
pub fn reconcile<R: SyncRecord>(records: Vec<R>, existing: &HashSet<String>) -> Partition<R> {
    let (to_update, to_insert) = records
        .into_iter()
        .partition(|record| existing.contains(record.key()));
    Partition { to_insert, to_update }
}
