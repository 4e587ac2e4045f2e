use std::collections::BTreeSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::PortalError,
    models::{Specialization, SyncReport},
};

/// SpecializationStore
///
/// The narrow set of data operations the reconciliation needs. Implementations run every call
/// against one unit of work (a Postgres transaction, or a held in-memory lock), which is what
/// makes a whole sync atomic with respect to other syncs for the same doctor.
#[async_trait]
pub trait SpecializationStore: Send {
    /// Specializations currently mapped to the doctor.
    async fn current_mappings(&mut self, doctor_id: Uuid)
    -> Result<Vec<Specialization>, PortalError>;

    /// Look up a specialization by exact name, creating it if absent. Idempotent.
    async fn ensure_specialization(&mut self, name: &str) -> Result<Specialization, PortalError>;

    /// Insert the `(doctor_id, specialization_id)` join row. Existing rows are left as-is.
    async fn link(&mut self, doctor_id: Uuid, specialization_id: Uuid) -> Result<(), PortalError>;

    /// Delete join rows for this doctor only. Returns the number of rows removed.
    async fn unlink(
        &mut self,
        doctor_id: Uuid,
        specialization_ids: &[Uuid],
    ) -> Result<u64, PortalError>;
}

/// SyncPlan
///
/// The diff between the current mapping and the desired name set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncPlan {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
    /// Ids of the join rows to delete, resolved from the already-loaded mapping.
    pub remove_ids: Vec<Uuid>,
}

impl SyncPlan {
    pub fn new(current: &[Specialization], desired: &BTreeSet<String>) -> Self {
        let current_names: BTreeSet<&str> = current.iter().map(|s| s.name.as_str()).collect();

        let to_add = desired
            .iter()
            .filter(|name| !current_names.contains(name.as_str()))
            .cloned()
            .collect();

        let removed: BTreeSet<&str> = current_names
            .iter()
            .copied()
            .filter(|name| !desired.contains(*name))
            .collect();

        let remove_ids = current
            .iter()
            .filter(|s| removed.contains(s.name.as_str()))
            .map(|s| s.id)
            .collect();

        Self {
            to_add,
            to_remove: removed.into_iter().map(str::to_string).collect(),
            remove_ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// sync_specializations
///
/// Reconciles the doctor's specialization mapping to exactly `desired`.
///
/// Names compare by exact, case-sensitive string equality. Creating a missing specialization is
/// best-effort per name: a failure is logged, recorded in `SyncReport::failed`, and the loop
/// moves on. Join-row writes are not best-effort and abort the sync with the error.
/// Shared `Specialization` rows are never deleted.
pub async fn sync_specializations<S>(
    store: &mut S,
    doctor_id: Uuid,
    desired: &BTreeSet<String>,
) -> Result<SyncReport, PortalError>
where
    S: SpecializationStore + ?Sized,
{
    let current = store.current_mappings(doctor_id).await?;
    let plan = SyncPlan::new(&current, desired);

    let mut report = SyncReport::default();
    if plan.is_empty() {
        return Ok(report);
    }

    for name in &plan.to_add {
        let specialization = match store.ensure_specialization(name).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(%doctor_id, specialization = %name, error = %e, "skipping specialization that could not be created");
                report.failed.push(name.clone());
                continue;
            }
        };
        store.link(doctor_id, specialization.id).await?;
        report.added.push(name.clone());
    }

    if !plan.remove_ids.is_empty() {
        let removed = store.unlink(doctor_id, &plan.remove_ids).await?;
        tracing::debug!(%doctor_id, removed, "unlinked specializations");
    }
    report.removed = plan.to_remove;

    tracing::info!(
        %doctor_id,
        added = report.added.len(),
        removed = report.removed.len(),
        failed = report.failed.len(),
        "specializations synced"
    );
    Ok(report)
}

/// Collects request names into the desired set. Duplicates collapse; spelling is kept verbatim.
pub fn desired_set<I, T>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}
