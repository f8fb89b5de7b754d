//! In-memory job record store.
//! Records are kept in dispatch order and retained for the process lifetime.

use std::collections::HashMap;

use crate::job::JobRecord;

/// Owns every job record, keyed by job ID.
#[derive(Debug, Default)]
pub struct JobRecordStore {
    records: Vec<JobRecord>,
    index: HashMap<String, usize>,
}

impl JobRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created record. Returns its ID.
    pub fn insert(&mut self, record: JobRecord) -> String {
        let id = record.id.clone();
        self.index.insert(id.clone(), self.records.len());
        self.records.push(record);
        id
    }

    pub fn get(&self, id: &str) -> Option<&JobRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut JobRecord> {
        self.index.get(id).map(|&i| &mut self.records[i])
    }

    /// All records for a session, in dispatch order.
    pub fn by_session<'a>(&'a self, session_id: &'a str) -> impl Iterator<Item = &'a JobRecord> {
        self.records.iter().filter(move |r| r.session_id == session_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
