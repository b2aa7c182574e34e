//! Schema migration engine
//!
//! The store keeps one schema version. `migrate_if_needed` walks every
//! version between the stored one and the target, running the caller's step
//! callback for each and committing the version only after the callback
//! returns `Ok`. A failed step leaves the version at the last committed step,
//! so the next run retries the failed step from scratch. Step callbacks must
//! therefore tolerate being re-run over a partially rewritten collection.
//!
//! Steps are plain closures supplied on every run; nothing but the version
//! number is persisted.

use std::convert::Infallible;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use super::codec::Codec;
use super::error::{Result, StepError, StoreError};
use super::storage::BulkWriteReport;
use super::store::{encode_record, DocumentStore};

/// Where the migration engine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Idle,
    /// Running the callback for `step`; the stored version is `step - 1`.
    Migrating { step: u32 },
}

/// Result of a `migrate_if_needed` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Version before the call
    pub from: u32,
    /// Version after the call
    pub to: u32,
    /// Steps committed by this call, ascending
    pub applied: Vec<u32>,
}

impl MigrationOutcome {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Marks one step as running; returns the engine to idle when dropped,
/// including on unwind.
struct StepGuard<'a> {
    state: &'a Mutex<MigrationState>,
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = MigrationState::Idle;
    }
}

impl DocumentStore {
    pub fn migration_state(&self) -> MigrationState {
        *self.migration.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter_step(&self, step: u32) -> Result<StepGuard<'_>> {
        let mut state = self.migration.lock().unwrap_or_else(PoisonError::into_inner);
        if let MigrationState::Migrating { step: running } = *state {
            return Err(StoreError::MigrationInProgress { step: running });
        }
        *state = MigrationState::Migrating { step };
        Ok(StepGuard { state: &self.migration })
    }

    /// Bring the store up to `target_version`.
    ///
    /// `on_step(v)` runs once for each pending version `v`, in ascending
    /// order, and usually calls [`DocumentStore::migrate_collection`]. The
    /// version is committed after each successful step. The first failing
    /// step aborts the run with `MigrationAborted`, carrying the callback's
    /// error unchanged as its source.
    pub fn migrate_if_needed<F, E>(&self, target_version: u32, mut on_step: F) -> Result<MigrationOutcome>
    where
        F: FnMut(u32) -> std::result::Result<(), E>,
        E: Into<StepError>,
    {
        if let MigrationState::Migrating { step } = self.migration_state() {
            return Err(StoreError::MigrationInProgress { step });
        }

        let registry = self.registry();
        let from = registry.get_schema_version()?;
        let mut outcome = MigrationOutcome {
            from,
            to: from,
            applied: Vec::new(),
        };

        if from >= target_version {
            debug!(target: "docstore::migration", current = from, requested = target_version, "Schema up to date");
            return Ok(outcome);
        }

        info!(target: "docstore::migration", from, to = target_version, "Starting schema migration");

        for step in (from + 1)..=target_version {
            let guard = self.enter_step(step)?;
            debug!(target: "docstore::migration", step, "Running migration step");

            if let Err(err) = on_step(step) {
                drop(guard);
                let source: StepError = err.into();
                warn!(
                    target: "docstore::migration",
                    step,
                    committed = outcome.to,
                    error = %source,
                    "Migration step failed"
                );
                return Err(StoreError::MigrationAborted { version: step, source });
            }

            // Last action of the step: a crash before this line leaves the
            // previous version in place and the step is re-run next time.
            registry.set_schema_version(step)?;
            drop(guard);

            outcome.to = step;
            outcome.applied.push(step);
            info!(target: "docstore::migration", version = step, "Committed schema version");
        }

        Ok(outcome)
    }

    /// Rewrite every document of `collection` from `Old` to `New` in place.
    ///
    /// Only valid inside a `migrate_if_needed` step. Documents are rewritten
    /// one by one in scan order; a failure part-way leaves earlier documents
    /// in the new shape and later ones untouched, and is reported as
    /// `RewriteIncomplete` listing the rewritten ids. `Old` decoding must
    /// therefore also accept already-rewritten documents if the step is to be
    /// safely re-run.
    pub fn migrate_collection<Old, New, CO, CN, F>(
        &self,
        collection: &str,
        old_codec: &CO,
        new_codec: &CN,
        mut transform: F,
    ) -> Result<BulkWriteReport>
    where
        CO: Codec<Old> + ?Sized,
        CN: Codec<New> + ?Sized,
        F: FnMut(Old) -> New,
    {
        self.try_migrate_collection(collection, old_codec, new_codec, |old| {
            Ok::<_, Infallible>(transform(old))
        })
    }

    /// [`DocumentStore::migrate_collection`] with a fallible transform.
    /// A transform error stops the rewrite; its `RewriteIncomplete` source
    /// is `TransformFailed`.
    pub fn try_migrate_collection<Old, New, CO, CN, F, E>(
        &self,
        collection: &str,
        old_codec: &CO,
        new_codec: &CN,
        mut transform: F,
    ) -> Result<BulkWriteReport>
    where
        CO: Codec<Old> + ?Sized,
        CN: Codec<New> + ?Sized,
        F: FnMut(Old) -> std::result::Result<New, E>,
        E: Into<StepError>,
    {
        let step = match self.migration_state() {
            MigrationState::Migrating { step } => step,
            MigrationState::Idle => {
                return Err(StoreError::NoActiveMigration {
                    collection: collection.to_string(),
                })
            }
        };

        let mut report = BulkWriteReport::new(collection);
        let result = self.scan_decoded(collection, old_codec, |id, old| {
            let new = transform(old).map_err(|e| StoreError::TransformFailed {
                collection: collection.to_string(),
                id: id.clone(),
                source: e.into(),
            })?;
            let payload = encode_record(new_codec, collection, &id, &new)?;
            self.backend.put(collection, &id, &payload)?;
            report.record(id, Ok(()));
            Ok(())
        });

        match result {
            Ok(()) => {
                info!(
                    target: "docstore::migration",
                    collection,
                    step,
                    rewritten = report.len(),
                    "Rewrote collection"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(
                    target: "docstore::migration",
                    collection,
                    step,
                    rewritten = report.len(),
                    error = %err,
                    "Collection rewrite stopped part-way"
                );
                Err(StoreError::RewriteIncomplete {
                    collection: collection.to_string(),
                    rewritten: report.written().into_iter().map(str::to_string).collect(),
                    source: Box::new(err),
                })
            }
        }
    }
}
