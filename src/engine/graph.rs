// SPDX-License-Identifier: Apache-2.0

//! Record arena
//!
//! Owns every canonical [`Record`] of one run. Records are interned by
//! [`RecordKey`] so a row reached through several edges is stored once and
//! all links point at the same [`RecordId`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::record::{Record, RecordId, RecordKey, Relation};
use crate::engine::types::ForeignKeyEdge;

#[derive(Debug, Default)]
pub struct RecordGraph {
    records: Vec<Record>,
    index: HashMap<RecordKey, RecordId>,
}

impl RecordGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` unless an equal identity exists.
    ///
    /// Returns the canonical id and `true` when the record was newly inserted.
    pub fn intern(&mut self, record: Record) -> (RecordId, bool) {
        let key = record.key();
        if let Some(&id) = self.index.get(&key) {
            return (id, false);
        }
        let id = RecordId(self.records.len());
        self.records.push(record);
        self.index.insert(key, id);
        (id, true)
    }

    pub fn id_of(&self, key: &RecordKey) -> Option<RecordId> {
        self.index.get(key).copied()
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(id.0)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.records.get_mut(id.0)
    }

    /// Looks up a record by table name and rendered primary-key values.
    pub fn find<S: Into<String>>(
        &self,
        table: &str,
        key_values: impl IntoIterator<Item = S>,
    ) -> Option<&Record> {
        self.id_of(&RecordKey::new(table, key_values))
            .and_then(|id| self.get(id))
    }

    /// Records `parent` as a parent of `child` through `edge`.
    pub(crate) fn link_parent(&mut self, child: RecordId, parent: RecordId, edge: Arc<ForeignKeyEdge>) {
        if let Some(record) = self.records.get_mut(child.0) {
            record.push_parent(parent, edge);
        }
    }

    /// Records `child` as a child of `parent` through `edge`.
    pub(crate) fn link_child(&mut self, parent: RecordId, child: RecordId, edge: Arc<ForeignKeyEdge>) {
        if let Some(record) = self.records.get_mut(parent.0) {
            record.push_child(child, edge);
        }
    }

    pub fn records(&self) -> impl Iterator<Item = (RecordId, &Record)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (RecordId(i), r))
    }

    pub fn starting_points(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.is_starting_point())
    }

    pub fn parents_of(&self, id: RecordId) -> impl Iterator<Item = (&Record, &Relation)> {
        self.relations(id, |r| r.parents())
    }

    pub fn children_of(&self, id: RecordId) -> impl Iterator<Item = (&Record, &Relation)> {
        self.relations(id, |r| r.children())
    }

    fn relations<'a>(
        &'a self,
        id: RecordId,
        side: fn(&Record) -> &[Relation],
    ) -> impl Iterator<Item = (&'a Record, &'a Relation)> + 'a {
        self.get(id)
            .map(side)
            .unwrap_or_default()
            .iter()
            .filter_map(move |rel| self.get(rel.record).map(|r| (r, rel)))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
