//! Runs against a real Postgres named by DATABASE_URL. Each test returns early when it is unset.

use care_portal::{
    PortalError,
    models::{CreateDoctorRequest, Doctor, NewCertification, UpdateDoctorRequest},
    repository::{PostgresRepository, Repository},
    roles::Role,
    specializations::desired_set,
};
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

/// A simple structure to hold the database pool for testing
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Option<Self> {
        dotenv::dotenv().ok();

        let Ok(db_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping Postgres integration test");
            return None;
        };

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        Some(DbTestContext { pool })
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Licence numbers and specialization names are unique per run so tests can share a database.
fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

async fn create_test_doctor(repo: &PostgresRepository) -> Doctor {
    let req = CreateDoctorRequest {
        first_name: "Robert".to_string(),
        last_name: "Chase".to_string(),
        license_number: unique("LIC"),
        consultation_fee: 150.0,
        years_of_experience: Some(6),
        ..Default::default()
    };
    repo.create_doctor(Uuid::new_v4(), &req)
        .await
        .expect("Failed to create test doctor")
}

// --- Tests ---

#[tokio::test]
async fn test_role_assignment_round_trip() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let user_id = Uuid::new_v4();

    assert_eq!(repo.get_role_name(user_id).await.unwrap(), None);

    repo.assign_role(user_id, Role::LabTechnician).await.unwrap();
    assert_eq!(
        repo.get_role_name(user_id).await.unwrap().as_deref(),
        Some("Lab Technician")
    );

    // Reassignment replaces the single role.
    repo.assign_role(user_id, Role::Admin).await.unwrap();
    assert_eq!(
        repo.get_role_name(user_id).await.unwrap().as_deref(),
        Some("Admin")
    );
}

#[tokio::test]
async fn test_doctor_crud() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let doctor = create_test_doctor(&repo).await;

    let fetched = repo.get_doctor(doctor.id).await.unwrap().unwrap();
    assert_eq!(fetched.license_number, doctor.license_number);
    assert_eq!(
        repo.get_doctor_by_user(doctor.user_id)
            .await
            .unwrap()
            .map(|d| d.id),
        Some(doctor.id)
    );

    let updated = repo
        .update_doctor(
            doctor.id,
            &UpdateDoctorRequest {
                bio: Some("Intensivist".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.bio.as_deref(), Some("Intensivist"));
    assert_eq!(updated.first_name, "Robert");

    assert!(repo.delete_doctor(doctor.id).await.unwrap());
    assert!(!repo.delete_doctor(doctor.id).await.unwrap());
    assert!(repo.get_doctor(doctor.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_license_is_validation_error() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let doctor = create_test_doctor(&repo).await;

    let req = CreateDoctorRequest {
        first_name: "Dup".to_string(),
        last_name: "Licence".to_string(),
        license_number: doctor.license_number.clone(),
        ..Default::default()
    };
    let err = repo.create_doctor(Uuid::new_v4(), &req).await.unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));
}

#[tokio::test]
async fn test_specialization_sync_in_postgres() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let doctor = create_test_doctor(&repo).await;

    let keep = unique("Cardiology");
    let drop = unique("Neurology");
    let add = unique("Pediatrics");

    repo.sync_doctor_specializations(doctor.id, &desired_set([keep.clone(), drop.clone()]))
        .await
        .unwrap();

    let report = repo
        .sync_doctor_specializations(doctor.id, &desired_set([keep.clone(), add.clone()]))
        .await
        .unwrap();
    assert_eq!(report.added, vec![add.clone()]);
    assert_eq!(report.removed, vec![drop.clone()]);
    assert!(report.failed.is_empty());

    let mut names: Vec<String> = repo
        .get_doctor_specializations(doctor.id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    names.sort();
    let mut expected = vec![keep, add];
    expected.sort();
    assert_eq!(names, expected);

    // The unlinked specialization still exists globally.
    let catalogue = repo.list_specializations().await.unwrap();
    assert!(catalogue.iter().any(|s| s.name == drop));
}

#[tokio::test]
async fn test_concurrent_syncs_for_same_doctor_serialize() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = std::sync::Arc::new(ctx.repository());
    let doctor_id = create_test_doctor(&repo).await.id;
    let shared = unique("Shared");

    let a = {
        let repo = repo.clone();
        let set = desired_set([shared.clone(), unique("A")]);
        tokio::spawn(async move { repo.sync_doctor_specializations(doctor_id, &set).await })
    };
    let b = {
        let repo = repo.clone();
        let set = desired_set([shared.clone(), unique("B")]);
        tokio::spawn(async move { repo.sync_doctor_specializations(doctor_id, &set).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    // Whichever ran last wins; the mapping is one of the two desired sets, never a mix.
    let mapped = repo.get_doctor_specializations(doctor_id).await.unwrap();
    assert_eq!(mapped.len(), 2);
    assert!(mapped.iter().any(|s| s.name == shared));
}

#[tokio::test]
async fn test_child_records_cascade_with_doctor() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let doctor = create_test_doctor(&repo).await;

    let cert = repo
        .add_certification(
            doctor.id,
            &NewCertification {
                name: "ACLS".to_string(),
                issuing_body: "AHA".to_string(),
                issue_date: NaiveDate::from_ymd_opt(2023, 5, 1),
                expiry_date: NaiveDate::from_ymd_opt(2025, 5, 1),
            },
        )
        .await
        .unwrap();
    assert_eq!(repo.list_certifications(doctor.id).await.unwrap(), vec![cert]);

    repo.delete_doctor(doctor.id).await.unwrap();
    assert!(repo.list_certifications(doctor.id).await.unwrap().is_empty());
}
