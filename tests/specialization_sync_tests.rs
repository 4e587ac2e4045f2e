use async_trait::async_trait;
use care_portal::{
    InMemoryRepository, PortalError,
    models::{CreateDoctorRequest, Doctor, Specialization, SyncReport},
    repository::Repository,
    specializations::{SpecializationStore, SyncPlan, desired_set, sync_specializations},
};
use chrono::Utc;
use uuid::Uuid;

// --- Helpers ---

async fn seed_doctor(repo: &InMemoryRepository, license: &str) -> Doctor {
    let req = CreateDoctorRequest {
        first_name: "Gregory".to_string(),
        last_name: "House".to_string(),
        license_number: license.to_string(),
        consultation_fee: 250.0,
        ..Default::default()
    };
    repo.create_doctor(Uuid::new_v4(), &req).await.unwrap()
}

async fn mapped_names(repo: &InMemoryRepository, doctor_id: Uuid) -> Vec<String> {
    repo.get_doctor_specializations(doctor_id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect()
}

fn spec(name: &str) -> Specialization {
    Specialization {
        id: Uuid::new_v4(),
        name: name.to_string(),
        created_at: Utc::now(),
    }
}

// --- SyncPlan ---

#[test]
fn test_plan_diffs_current_against_desired() {
    let cardiology = spec("Cardiology");
    let neurology = spec("Neurology");
    let current = vec![cardiology.clone(), neurology.clone()];

    let plan = SyncPlan::new(&current, &desired_set(["Cardiology", "Pediatrics"]));

    assert_eq!(plan.to_add, vec!["Pediatrics".to_string()]);
    assert_eq!(plan.to_remove, vec!["Neurology".to_string()]);
    assert_eq!(plan.remove_ids, vec![neurology.id]);
}

#[test]
fn test_plan_is_empty_when_sets_match() {
    let current = vec![spec("Cardiology")];
    assert!(SyncPlan::new(&current, &desired_set(["Cardiology"])).is_empty());
    assert!(SyncPlan::new(&[], &desired_set(Vec::<String>::new())).is_empty());
}

#[test]
fn test_plan_is_case_sensitive() {
    let current = vec![spec("Cardiology")];
    let plan = SyncPlan::new(&current, &desired_set(["cardiology"]));
    assert_eq!(plan.to_add, vec!["cardiology".to_string()]);
    assert_eq!(plan.to_remove, vec!["Cardiology".to_string()]);
}

#[test]
fn test_desired_set_collapses_duplicates() {
    let set = desired_set(["Cardiology", "Cardiology", "Neurology"]);
    assert_eq!(set.len(), 2);
}

// --- Reconciliation against the in-memory store ---

#[tokio::test]
async fn test_sync_adds_and_removes() {
    let repo = InMemoryRepository::new();
    let doctor = seed_doctor(&repo, "LIC-1").await;

    repo.sync_doctor_specializations(doctor.id, &desired_set(["Cardiology", "Neurology"]))
        .await
        .unwrap();

    let report = repo
        .sync_doctor_specializations(doctor.id, &desired_set(["Cardiology", "Pediatrics"]))
        .await
        .unwrap();

    assert_eq!(
        report,
        SyncReport {
            added: vec!["Pediatrics".to_string()],
            removed: vec!["Neurology".to_string()],
            failed: vec![],
        }
    );
    assert_eq!(
        mapped_names(&repo, doctor.id).await,
        vec!["Cardiology".to_string(), "Pediatrics".to_string()]
    );
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let repo = InMemoryRepository::new();
    let doctor = seed_doctor(&repo, "LIC-2").await;
    let desired = desired_set(["Dermatology"]);

    repo.sync_doctor_specializations(doctor.id, &desired)
        .await
        .unwrap();
    let second = repo
        .sync_doctor_specializations(doctor.id, &desired)
        .await
        .unwrap();

    assert!(second.is_noop());
    assert_eq!(repo.list_specializations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sync_to_empty_removes_all_but_keeps_specializations() {
    let repo = InMemoryRepository::new();
    let doctor = seed_doctor(&repo, "LIC-3").await;
    repo.sync_doctor_specializations(doctor.id, &desired_set(["Oncology", "Radiology"]))
        .await
        .unwrap();

    let report = repo
        .sync_doctor_specializations(doctor.id, &desired_set(Vec::<String>::new()))
        .await
        .unwrap();

    assert_eq!(report.removed.len(), 2);
    assert!(mapped_names(&repo, doctor.id).await.is_empty());
    // Shared rows are never deleted.
    assert_eq!(repo.list_specializations().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sync_reuses_existing_specializations_across_doctors() {
    let repo = InMemoryRepository::new();
    let first = seed_doctor(&repo, "LIC-4").await;
    let second = seed_doctor(&repo, "LIC-5").await;

    repo.sync_doctor_specializations(first.id, &desired_set(["Cardiology"]))
        .await
        .unwrap();
    repo.sync_doctor_specializations(second.id, &desired_set(["Cardiology"]))
        .await
        .unwrap();

    let all = repo.list_specializations().await.unwrap();
    assert_eq!(all.len(), 1);

    // Removing from one doctor leaves the other's mapping intact.
    repo.sync_doctor_specializations(first.id, &desired_set(Vec::<String>::new()))
        .await
        .unwrap();
    assert_eq!(
        mapped_names(&repo, second.id).await,
        vec!["Cardiology".to_string()]
    );
}

#[tokio::test]
async fn test_sync_skips_names_that_cannot_be_created() {
    let repo = InMemoryRepository::new().with_failing_specializations(["Broken"]);
    let doctor = seed_doctor(&repo, "LIC-6").await;

    let report = repo
        .sync_doctor_specializations(doctor.id, &desired_set(["Broken", "Cardiology"]))
        .await
        .unwrap();

    assert_eq!(report.added, vec!["Cardiology".to_string()]);
    assert_eq!(report.failed, vec!["Broken".to_string()]);
    assert_eq!(
        mapped_names(&repo, doctor.id).await,
        vec!["Cardiology".to_string()]
    );
}

#[tokio::test]
async fn test_sync_unknown_doctor_is_not_found() {
    let repo = InMemoryRepository::new();
    let err = repo
        .sync_doctor_specializations(Uuid::new_v4(), &desired_set(["Cardiology"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_doctor_keeps_shared_specializations() {
    let repo = InMemoryRepository::new();
    let doctor = seed_doctor(&repo, "LIC-7").await;
    repo.sync_doctor_specializations(doctor.id, &desired_set(["Cardiology"]))
        .await
        .unwrap();

    assert!(repo.delete_doctor(doctor.id).await.unwrap());
    assert!(mapped_names(&repo, doctor.id).await.is_empty());
    assert_eq!(repo.list_specializations().await.unwrap().len(), 1);
}

// --- Reconciliation against a scripted store ---

/// Records calls and can be told to fail on link.
#[derive(Default)]
struct ScriptedStore {
    current: Vec<Specialization>,
    fail_link: bool,
    calls: Vec<String>,
}

#[async_trait]
impl SpecializationStore for ScriptedStore {
    async fn current_mappings(
        &mut self,
        _doctor_id: Uuid,
    ) -> Result<Vec<Specialization>, PortalError> {
        self.calls.push("current".to_string());
        Ok(self.current.clone())
    }

    async fn ensure_specialization(&mut self, name: &str) -> Result<Specialization, PortalError> {
        self.calls.push(format!("ensure:{}", name));
        Ok(spec(name))
    }

    async fn link(&mut self, _doctor_id: Uuid, _specialization_id: Uuid) -> Result<(), PortalError> {
        self.calls.push("link".to_string());
        if self.fail_link {
            return Err(PortalError::Backend("link failed".to_string()));
        }
        Ok(())
    }

    async fn unlink(
        &mut self,
        _doctor_id: Uuid,
        specialization_ids: &[Uuid],
    ) -> Result<u64, PortalError> {
        self.calls.push(format!("unlink:{}", specialization_ids.len()));
        Ok(specialization_ids.len() as u64)
    }
}

#[tokio::test]
async fn test_noop_sync_performs_no_writes() {
    let mut store = ScriptedStore {
        current: vec![spec("Cardiology")],
        ..Default::default()
    };

    let report = sync_specializations(&mut store, Uuid::new_v4(), &desired_set(["Cardiology"]))
        .await
        .unwrap();

    assert!(report.is_noop());
    assert_eq!(store.calls, vec!["current".to_string()]);
}

#[tokio::test]
async fn test_link_failure_aborts_sync() {
    let mut store = ScriptedStore {
        fail_link: true,
        ..Default::default()
    };

    let result =
        sync_specializations(&mut store, Uuid::new_v4(), &desired_set(["Cardiology"])).await;

    assert!(matches!(result, Err(PortalError::Backend(_))));
    assert!(!store.calls.iter().any(|c| c.starts_with("unlink")));
}

#[tokio::test]
async fn test_additions_happen_before_removals() {
    let mut store = ScriptedStore {
        current: vec![spec("Neurology")],
        ..Default::default()
    };

    sync_specializations(&mut store, Uuid::new_v4(), &desired_set(["Cardiology"]))
        .await
        .unwrap();

    assert_eq!(
        store.calls,
        vec![
            "current".to_string(),
            "ensure:Cardiology".to_string(),
            "link".to_string(),
            "unlink:1".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_sync_adds_missing_and_keeps_existing() {
    let repo = InMemoryRepository::new();
    let doctor = seed_doctor(&repo, "LIC-8").await;
    repo.sync_doctor_specializations(doctor.id, &desired_set(["Cardiology"]))
        .await
        .unwrap();
    let cardiology_id = repo.get_doctor_specializations(doctor.id).await.unwrap()[0].id;

    let report = repo
        .sync_doctor_specializations(doctor.id, &desired_set(["Cardiology", "Oncology"]))
        .await
        .unwrap();

    assert_eq!(report.added, vec!["Oncology".to_string()]);
    assert!(report.removed.is_empty());
    let mapped = repo.get_doctor_specializations(doctor.id).await.unwrap();
    assert!(mapped.iter().any(|s| s.id == cardiology_id));
    assert_eq!(mapped.len(), 2);
}
