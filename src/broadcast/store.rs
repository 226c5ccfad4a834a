use parking_lot::RwLock;

/// A value together with the logical time it was first accepted by the cluster.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Record {
    pub value: i64,
    pub accepted_at: i64,
}

/// Append-only set of records, sorted and keyed by acceptance timestamp.
///
/// Two records never share a timestamp: the first insert for a timestamp
/// wins and later inserts with the same timestamp are dropped.
#[derive(Debug, Default)]
pub struct ValueStore {
    records: RwLock<Vec<Record>>,
}

impl ValueStore {
    pub fn new() -> Self {
        ValueStore::default()
    }

    /// Returns `false` if a record with `accepted_at` already exists.
    pub fn insert(&self, value: i64, accepted_at: i64) -> bool {
        let mut records = self.records.write();
        match records.binary_search_by_key(&accepted_at, |record| record.accepted_at) {
            Ok(_) => false,
            Err(pos) => {
                records.insert(pos, Record { value, accepted_at });
                true
            }
        }
    }

    /// Every value, ascending by acceptance timestamp.
    pub fn read_all(&self) -> Vec<i64> {
        self.records.read().iter().map(|record| record.value).collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[cfg(test)]
    pub fn records(&self) -> Vec<Record> {
        self.records.read().clone()
    }
}
