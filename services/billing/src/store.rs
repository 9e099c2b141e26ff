//! In-memory record tables with soft delete
//!
//! Rows are never removed: deleting stamps `deleted_at` so historical
//! documents can still resolve the customer or product they reference.

use crate::error::{BillingError, BillingResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Bookkeeping shared by every record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when soft-deleted
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RecordMeta {
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything stored in a `Table`
pub trait Record: Clone + Send + Sync {
    /// Kind name used in errors and logs
    const KIND: &'static str;

    fn meta(&self) -> &RecordMeta;
    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn id(&self) -> Uuid {
        self.meta().id
    }

    fn is_active(&self) -> bool {
        self.meta().is_active()
    }
}

/// One table of records keyed by id
#[derive(Debug)]
pub struct Table<T: Record> {
    rows: RwLock<FxHashMap<Uuid, T>>,
}

impl<T: Record> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Table<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(FxHashMap::default()),
        }
    }

    fn not_found(id: Uuid) -> BillingError {
        BillingError::NotFound { kind: T::KIND, id }
    }

    /// Store a new record
    pub fn insert(&self, record: T) -> BillingResult<Uuid> {
        let id = record.id();
        let mut rows = self.rows.write();
        if rows.contains_key(&id) {
            return Err(BillingError::Duplicate { kind: T::KIND, id });
        }
        rows.insert(id, record);
        debug!(kind = T::KIND, %id, "Record inserted");
        Ok(id)
    }

    /// Active record by id
    pub fn get(&self, id: Uuid) -> BillingResult<T> {
        self.rows
            .read()
            .get(&id)
            .filter(|row| row.is_active())
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    /// Record by id, soft-deleted or not
    pub fn get_including_deleted(&self, id: Uuid) -> BillingResult<T> {
        self.rows
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    /// Active records, oldest first
    #[must_use]
    pub fn list_active(&self) -> Vec<T> {
        let mut list: Vec<T> = self
            .rows
            .read()
            .values()
            .filter(|row| row.is_active())
            .cloned()
            .collect();
        list.sort_by_key(|row| (row.meta().created_at, row.id()));
        list
    }

    /// Every record, oldest first
    #[must_use]
    pub fn list_all(&self) -> Vec<T> {
        let mut list: Vec<T> = self.rows.read().values().cloned().collect();
        list.sort_by_key(|row| (row.meta().created_at, row.id()));
        list
    }

    #[must_use]
    pub fn count_active(&self) -> usize {
        self.rows.read().values().filter(|row| row.is_active()).count()
    }

    /// Mutate an active record in place.
    ///
    /// The closure works on a copy; the row is only replaced when it returns
    /// `Ok`, so a rejected edit leaves the stored record untouched.
    pub fn update<R>(
        &self,
        id: Uuid,
        edit: impl FnOnce(&mut T) -> BillingResult<R>,
    ) -> BillingResult<R> {
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(&id)
            .filter(|row| row.is_active())
            .ok_or_else(|| Self::not_found(id))?;
        let mut draft = row.clone();
        let out = edit(&mut draft)?;
        draft.meta_mut().updated_at = Utc::now();
        *row = draft;
        Ok(out)
    }

    /// Mark a record deleted. Returns `false` if it already was.
    pub fn soft_delete(&self, id: Uuid) -> BillingResult<bool> {
        let mut rows = self.rows.write();
        let row = rows.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        if row.meta().deleted_at.is_some() {
            return Ok(false);
        }
        let now = Utc::now();
        let meta = row.meta_mut();
        meta.deleted_at = Some(now);
        meta.updated_at = now;
        info!(kind = T::KIND, %id, "Record soft-deleted");
        Ok(true)
    }

    /// Clear the deletion mark. Returns `false` if the record was active.
    pub fn restore(&self, id: Uuid) -> BillingResult<bool> {
        let mut rows = self.rows.write();
        let row = rows.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        if row.meta().deleted_at.is_none() {
            return Ok(false);
        }
        let meta = row.meta_mut();
        meta.deleted_at = None;
        meta.updated_at = Utc::now();
        info!(kind = T::KIND, %id, "Record restored");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Note {
        meta: RecordMeta,
        text: String,
    }

    impl Record for Note {
        const KIND: &'static str = "note";

        fn meta(&self) -> &RecordMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut RecordMeta {
            &mut self.meta
        }
    }

    fn note(text: &str) -> Note {
        Note {
            meta: RecordMeta::new(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_soft_deleted_rows_hidden_but_kept() {
        let table = Table::new();
        let id = table.insert(note("a")).expect("insert");
        table.insert(note("b")).expect("insert");

        assert!(table.soft_delete(id).expect("delete"));
        assert!(!table.soft_delete(id).expect("second delete is a no-op"));

        assert!(matches!(table.get(id), Err(BillingError::NotFound { kind: "note", .. })));
        assert_eq!(table.get_including_deleted(id).expect("kept").text, "a");
        assert_eq!(table.count_active(), 1);
        assert_eq!(table.list_all().len(), 2);

        assert!(table.restore(id).expect("restore"));
        assert_eq!(table.get(id).expect("active again").text, "a");
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let table = Table::new();
        let n = note("a");
        table.insert(n.clone()).expect("insert");
        assert!(matches!(table.insert(n), Err(BillingError::Duplicate { .. })));
    }

    #[test]
    fn test_failed_update_leaves_row_untouched() {
        let table = Table::new();
        let id = table.insert(note("a")).expect("insert");

        let result: BillingResult<()> = table.update(id, |n| {
            n.text = "changed".to_string();
            Err(BillingError::validation("nope"))
        });
        assert!(result.is_err());
        assert_eq!(table.get(id).expect("row").text, "a");

        table
            .update(id, |n| {
                n.text = "changed".to_string();
                Ok(())
            })
            .expect("update");
        assert_eq!(table.get(id).expect("row").text, "changed");
    }

    #[test]
    fn test_deleted_rows_cannot_be_updated() {
        let table = Table::new();
        let id = table.insert(note("a")).expect("insert");
        table.soft_delete(id).expect("delete");
        assert!(table.update(id, |_| Ok(())).is_err());
    }
}
