//! Branch store
//!
//! A branch is a snapshot of a sheet taken when the branch was created (its
//! base) plus the state it has diverged to through local edits. Merging a
//! branch back compares the three states with [`prepare_merge`].

use crate::calculation::Recomputer;
use crate::error::{Error, Result};
use crate::merge::{apply_merge, prepare_merge, ConflictPick, MergeResult};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sheetmaster_core::SheetState;
use std::collections::BTreeMap;
use tracing::debug;

/// Most branches kept by a default store
pub const DEFAULT_BRANCH_LIMIT: usize = 20;

/// A named divergent copy of a sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// State of main when the branch was created
    pub base_state: SheetState,
    /// Current state of the branch
    pub state: SheetState,
}

fn new_branch_id(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("br_{:x}_{:06x}", now.timestamp_millis(), suffix)
}

/// Branches of one sheet, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchStore {
    branches: Vec<Branch>,
    limit: usize,
}

impl Default for BranchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchStore {
    /// Create an empty store holding at most [`DEFAULT_BRANCH_LIMIT`] branches
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_BRANCH_LIMIT)
    }

    /// Create an empty store holding at most `limit` branches
    pub fn with_limit(limit: usize) -> Self {
        Self {
            branches: Vec::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Branch off `main`, evicting the oldest branch when the store is full
    pub fn create(&mut self, name: impl Into<String>, main: &SheetState) -> Result<&Branch> {
        if self.limit == 0 {
            return Err(Error::BranchLimit(self.limit));
        }

        let now = Utc::now();
        let branch = Branch {
            id: new_branch_id(now),
            name: name.into(),
            created_at: now,
            updated_at: now,
            base_state: main.clone(),
            state: main.clone(),
        };
        debug!(id = %branch.id, name = %branch.name, "branch created");

        self.branches.insert(0, branch);
        if self.branches.len() > self.limit {
            let evicted = self.branches.split_off(self.limit);
            debug!(count = evicted.len(), "evicted oldest branches");
        }
        Ok(&self.branches[0])
    }

    pub fn get(&self, id: &str) -> Option<&Branch> {
        self.branches.iter().find(|b| b.id == id)
    }

    /// All branches, newest first
    pub fn list(&self) -> &[Branch] {
        &self.branches
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Branch> {
        self.branches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| Error::BranchNotFound(id.to_string()))
    }

    pub fn rename(&mut self, id: &str, name: impl Into<String>) -> Result<()> {
        let branch = self.get_mut(id)?;
        branch.name = name.into();
        branch.updated_at = Utc::now();
        Ok(())
    }

    /// Record the branch's latest state
    pub fn update_state(&mut self, id: &str, state: SheetState) -> Result<()> {
        let branch = self.get_mut(id)?;
        branch.state = state;
        branch.updated_at = Utc::now();
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> Result<Branch> {
        let index = self
            .branches
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| Error::BranchNotFound(id.to_string()))?;
        Ok(self.branches.remove(index))
    }

    /// Three-way merge of the branch into `main`
    pub fn prepare_merge(&self, id: &str, main: &SheetState) -> Result<MergeResult> {
        let branch = self
            .get(id)
            .ok_or_else(|| Error::BranchNotFound(id.to_string()))?;
        prepare_merge(&branch.base_state, main, &branch.state)
    }

    /// Merge the branch into `main` with `picks` and remove the branch
    ///
    /// The branch is kept when the merge fails.
    pub fn merge_into(
        &mut self,
        id: &str,
        main: &SheetState,
        picks: &BTreeMap<String, ConflictPick>,
        recomputer: &Recomputer,
    ) -> Result<SheetState> {
        let result = self.prepare_merge(id, main)?;
        let merged = apply_merge(result, picks, recomputer)?;
        self.delete(id)?;
        debug!(id, "branch merged");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheetmaster_core::{CellAddress, ComputedValue};

    fn a(label: &str) -> CellAddress {
        CellAddress::parse(label).unwrap()
    }

    fn sheet(cells: &[(&str, &str)]) -> SheetState {
        let mut state = SheetState::new();
        for (label, value) in cells {
            state.grid.set_value(a(label), *value).unwrap();
        }
        state
    }

    #[test]
    fn test_create_snapshots_main() {
        let main = sheet(&[("A1", "1")]);
        let mut store = BranchStore::new();
        let branch = store.create("what-if", &main).unwrap().clone();

        assert!(branch.id.starts_with("br_"));
        assert_eq!(branch.base_state, main);
        assert_eq!(branch.state, main);
        assert_eq!(store.get(&branch.id), Some(&branch));
    }

    #[test]
    fn test_newest_first_and_eviction() {
        let main = SheetState::new();
        let mut store = BranchStore::with_limit(2);
        let first = store.create("one", &main).unwrap().id.clone();
        store.create("two", &main).unwrap();
        store.create("three", &main).unwrap();

        let names: Vec<&str> = store.list().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["three", "two"]);
        assert!(store.get(&first).is_none());
    }

    #[test]
    fn test_zero_limit() {
        let mut store = BranchStore::with_limit(0);
        assert_eq!(
            store.create("x", &SheetState::new()).unwrap_err(),
            Error::BranchLimit(0)
        );
    }

    #[test]
    fn test_rename_update_delete() {
        let mut store = BranchStore::new();
        let id = store.create("draft", &SheetState::new()).unwrap().id.clone();

        store.rename(&id, "final").unwrap();
        store.update_state(&id, sheet(&[("B2", "x")])).unwrap();
        let branch = store.get(&id).unwrap();
        assert_eq!(branch.name, "final");
        assert_eq!(branch.state.grid.raw_value(a("B2")), "x");
        assert!(branch.updated_at >= branch.created_at);

        store.delete(&id).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.rename(&id, "gone"), Err(Error::BranchNotFound(id.clone())));
        assert_eq!(store.delete(&id).unwrap_err(), Error::BranchNotFound(id));
    }

    #[test]
    fn test_merge_into_main() {
        let main = sheet(&[("A1", "1"), ("B1", "=A1*3")]);
        let mut store = BranchStore::new();
        let id = store.create("edit", &main).unwrap().id.clone();
        store.update_state(&id, sheet(&[("A1", "4"), ("B1", "=A1*3")])).unwrap();

        let merged = store.merge_into(&id, &main, &BTreeMap::new(), &Recomputer::default()).unwrap();
        assert_eq!(merged.grid.computed(a("B1")), Some(&ComputedValue::Number(12.0)));
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_failed_merge_keeps_branch() {
        let main = sheet(&[("A1", "1")]);
        let mut store = BranchStore::new();
        let id = store.create("edit", &main).unwrap().id.clone();

        let picks = BTreeMap::from([("9,9".to_string(), ConflictPick::Branch)]);
        assert!(store.merge_into(&id, &main, &picks, &Recomputer::default()).is_err());
        assert!(store.get(&id).is_some());
    }
}
