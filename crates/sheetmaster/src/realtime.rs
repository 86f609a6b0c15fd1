//! Remote edit queue
//!
//! Edits from collaborators arrive on transport threads. They are sent into an
//! [`EditQueue`] owned by whoever owns the [`SheetState`], which drains them in
//! batches: each batch is coalesced per cell, applied as one grid update and
//! followed by exactly one recompute, so readers never see `computed` lagging
//! behind `value`.

use crate::calculation::{RecomputeOptions, RecomputeStats, Recomputer};
use serde::{Deserialize, Serialize};
use sheetmaster_core::{CellAddress, Grid, SheetState, MAX_ROWS};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, SendError, Sender, TryRecvError};
use tracing::{debug, warn};

/// Most edits drained by one [`EditQueue::apply_pending`] call by default
pub const DEFAULT_BATCH_LIMIT: usize = 100;

/// One cell write from a collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEdit {
    pub row: u32,
    pub col: u16,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl RemoteEdit {
    pub fn new(row: u32, col: u16, value: impl Into<String>) -> Self {
        Self {
            row,
            col,
            value: value.into(),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn address(&self) -> CellAddress {
        CellAddress::new(self.row, self.col)
    }
}

/// Sending half handed to transport threads
#[derive(Debug, Clone)]
pub struct EditSender {
    tx: Sender<RemoteEdit>,
}

impl EditSender {
    /// Queue an edit; fails once the queue has been dropped
    pub fn send(&self, edit: RemoteEdit) -> Result<(), SendError<RemoteEdit>> {
        self.tx.send(edit)
    }
}

/// What one [`EditQueue::apply_pending`] call did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Edits drained from the channel
    pub received: usize,
    /// Distinct cells written after coalescing
    pub applied: usize,
    /// Edits discarded because they fall outside the grid
    pub dropped: usize,
    /// Stats of the recompute that followed, absent when nothing was applied
    pub recompute: Option<RecomputeStats>,
}

/// Single-writer queue of remote edits
#[derive(Debug)]
pub struct EditQueue {
    rx: Receiver<RemoteEdit>,
    tx: Sender<RemoteEdit>,
    batch_limit: usize,
    recomputer: Recomputer,
}

impl Default for EditQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EditQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            rx,
            tx,
            batch_limit: DEFAULT_BATCH_LIMIT,
            recomputer: Recomputer::default(),
        }
    }

    /// Drain at most `limit` edits per batch (at least one)
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Recompute options used after each batch
    pub fn with_recompute_options(mut self, options: RecomputeOptions) -> Self {
        self.recomputer = Recomputer::new(options);
        self
    }

    /// A new sending handle
    pub fn sender(&self) -> EditSender {
        EditSender {
            tx: self.tx.clone(),
        }
    }

    /// Drain one batch into `state` and recompute once
    ///
    /// `state` must hold recomputed values; it serves as the previous grid for
    /// an incremental recompute.
    pub fn apply_pending(&self, state: &mut SheetState) -> BatchReport {
        let mut pending: BTreeMap<CellAddress, String> = BTreeMap::new();
        let mut report = BatchReport::default();

        while report.received < self.batch_limit {
            match self.rx.try_recv() {
                Ok(edit) => {
                    report.received += 1;
                    pending.insert(edit.address(), edit.value);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if pending.is_empty() {
            return report;
        }

        let previous = state.grid.clone();
        let (applied, dropped) = write_values(&mut state.grid, pending);
        report.applied = applied;
        report.dropped = dropped;

        let (grid, stats) = self.recomputer.update(&state.grid, Some(&previous));
        state.grid = grid;
        report.recompute = Some(stats);

        debug!(
            received = report.received,
            applied = report.applied,
            dropped = report.dropped,
            "remote batch applied"
        );
        report
    }
}

/// Write raw values, growing the row bound as needed
///
/// Returns the number of values written and the number dropped.
fn write_values(grid: &mut Grid, values: impl IntoIterator<Item = (CellAddress, String)>) -> (usize, usize) {
    let (mut applied, mut dropped) = (0, 0);
    for (addr, value) in values {
        if addr.row < MAX_ROWS {
            grid.ensure_rows(addr.row + 1);
        }
        match grid.set_value(addr, value) {
            Ok(()) => applied += 1,
            Err(err) => {
                warn!(cell = %addr, error = %err, "dropping remote edit");
                dropped += 1;
            }
        }
    }
    (applied, dropped)
}

/// Build a recomputed grid from `"row:col" -> value` entries
///
/// Entries with malformed keys are skipped.
pub fn grid_from_crdt<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Grid
where
    K: AsRef<str>,
    V: Into<String>,
{
    let mut grid = Grid::new();
    let values = entries.into_iter().filter_map(|(key, value)| {
        let key = key.as_ref();
        match CellAddress::from_key(key, ':') {
            Some(addr) => Some((addr, value.into())),
            None => {
                warn!(key, "skipping malformed cell key");
                None
            }
        }
    });
    write_values(&mut grid, values);
    crate::calculation::recompute(&grid)
}
