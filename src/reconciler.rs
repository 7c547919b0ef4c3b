//! One reconciliation pass: diff running containers against the recorded
//! versions, notify on changes and persist the new state.
//!
//! Store mutations are applied in memory as each container is processed and
//! flushed once at the end of a pass that changed anything.  A pass stops at
//! the first collaborator failure and skips the flush, so an update whose
//! notification already went out is not durable.  Callers that keep the
//! reconciler around after a failed pass call
//! [`Reconciler::discard_pending`] so the next pass starts from the last
//! flushed state and detects the change again.

use log::{debug, info};

use crate::error::{ReconcileError, StoreError};
use crate::notify::Notifier;
use crate::runtime::ContainerRuntime;
use crate::store::VersionStore;
use crate::types::ContainerRecord;

/// Counts of what a successful pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub observed: usize,
    pub first_seen: usize,
    pub unchanged: usize,
    pub updated: usize,
    pub flushed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    FirstSeen,
    Unchanged,
    Updated,
}

pub struct Reconciler<R, S, N> {
    runtime: R,
    store: S,
    notifier: N,
}

impl<R, S, N> Reconciler<R, S, N>
where
    R: ContainerRuntime,
    S: VersionStore,
    N: Notifier,
{
    pub fn new(runtime: R, store: S, notifier: N) -> Self {
        Self {
            runtime,
            store,
            notifier,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Runs a single pass over the current runtime snapshot.
    ///
    /// Containers are handled in snapshot order.  A name repeated within one
    /// snapshot is checked again against the already mutated store, so the
    /// last occurrence wins.
    pub async fn run_once(&mut self) -> Result<PassSummary, ReconcileError> {
        let running = self
            .runtime
            .list_running_containers()
            .await
            .map_err(ReconcileError::ListContainers)?;

        let mut summary = PassSummary {
            observed: running.len(),
            ..Default::default()
        };
        let mut dirty = false;

        for container in &running {
            match self.reconcile(container).await? {
                Outcome::FirstSeen => {
                    summary.first_seen += 1;
                    dirty = true;
                }
                Outcome::Updated => {
                    summary.updated += 1;
                    dirty = true;
                }
                Outcome::Unchanged => summary.unchanged += 1,
            }
        }

        if dirty {
            self.store.flush().await.map_err(ReconcileError::Flush)?;
            summary.flushed = true;
        }

        info!(
            "Pass complete: {} running, {} new, {} updated, {} unchanged",
            summary.observed, summary.first_seen, summary.updated, summary.unchanged
        );
        Ok(summary)
    }

    /// Drops store mutations a failed pass left unflushed.
    pub async fn discard_pending(&mut self) -> Result<(), StoreError> {
        self.store.discard_pending().await
    }

    async fn reconcile(&mut self, container: &ContainerRecord) -> Result<Outcome, ReconcileError> {
        let recorded = match self.store.get_container(&container.name).await {
            Ok(recorded) => recorded,
            Err(err) if err.is_not_found() => {
                self.store
                    .create_container(container)
                    .await
                    .map_err(|source| ReconcileError::Create {
                        name: container.name.clone(),
                        source,
                    })?;
                info!(
                    "First seen {} at version {:?}",
                    container.name, container.image_version
                );
                return Ok(Outcome::FirstSeen);
            }
            Err(source) => {
                return Err(ReconcileError::Lookup {
                    name: container.name.clone(),
                    source,
                })
            }
        };

        if recorded.image_version == container.image_version {
            debug!("{} unchanged at {:?}", container.name, container.image_version);
            return Ok(Outcome::Unchanged);
        }

        self.store
            .update_container(container)
            .await
            .map_err(|source| ReconcileError::Update {
                name: container.name.clone(),
                source,
            })?;
        info!(
            "{} updated from {:?} to {:?}",
            container.name, recorded.image_version, container.image_version
        );

        self.notifier
            .create_notification(container)
            .await
            .map_err(|source| ReconcileError::Notify {
                name: container.name.clone(),
                source,
            })?;

        Ok(Outcome::Updated)
    }
}
