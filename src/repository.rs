use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use sqlx::{Connection, PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    error::PortalError,
    models::{
        AvailabilitySlot, Certification, CreateDoctorRequest, Doctor, Education,
        NewAvailabilitySlot, NewCertification, NewEducation, Specialization, SyncReport,
        UpdateDoctorRequest,
    },
    roles::Role,
    specializations::{SpecializationStore, sync_specializations},
};

/// Repository Trait
///
/// The contract between the portal and its relational data service. Handlers and the session
/// resolver only ever see `Arc<dyn Repository>`, so Postgres and the in-memory store are
/// interchangeable.
///
/// Reads of a missing row return `Ok(None)`; every failure comes back as a `PortalError`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Roles ---
    /// Name of the role assigned to the user through `user_roles`, if any.
    async fn get_role_name(&self, user_id: Uuid) -> Result<Option<String>, PortalError>;
    /// Admin action: replaces the user's single role assignment.
    async fn assign_role(&self, user_id: Uuid, role: Role) -> Result<(), PortalError>;

    // --- Doctors ---
    async fn create_doctor(
        &self,
        user_id: Uuid,
        req: &CreateDoctorRequest,
    ) -> Result<Doctor, PortalError>;
    async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, PortalError>;
    async fn get_doctor_by_user(&self, user_id: Uuid) -> Result<Option<Doctor>, PortalError>;
    async fn list_doctors(&self) -> Result<Vec<Doctor>, PortalError>;
    // Partial update; absent fields keep their stored value. Specializations are not touched here.
    async fn update_doctor(
        &self,
        id: Uuid,
        req: &UpdateDoctorRequest,
    ) -> Result<Option<Doctor>, PortalError>;
    // Removes the doctor, its join rows and child records. Shared specializations survive.
    async fn delete_doctor(&self, id: Uuid) -> Result<bool, PortalError>;

    // --- Specializations ---
    async fn list_specializations(&self) -> Result<Vec<Specialization>, PortalError>;
    async fn get_doctor_specializations(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<Specialization>, PortalError>;
    /// Reconciles the doctor's mapping to `desired` as one unit of work.
    async fn sync_doctor_specializations(
        &self,
        doctor_id: Uuid,
        desired: &BTreeSet<String>,
    ) -> Result<SyncReport, PortalError>;

    // --- Auxiliary child records ---
    async fn add_education(
        &self,
        doctor_id: Uuid,
        req: &NewEducation,
    ) -> Result<Education, PortalError>;
    async fn delete_education(&self, id: Uuid, doctor_id: Uuid) -> Result<bool, PortalError>;
    async fn list_education(&self, doctor_id: Uuid) -> Result<Vec<Education>, PortalError>;

    async fn add_certification(
        &self,
        doctor_id: Uuid,
        req: &NewCertification,
    ) -> Result<Certification, PortalError>;
    async fn delete_certification(&self, id: Uuid, doctor_id: Uuid)
    -> Result<bool, PortalError>;
    async fn list_certifications(&self, doctor_id: Uuid)
    -> Result<Vec<Certification>, PortalError>;

    async fn add_availability(
        &self,
        doctor_id: Uuid,
        req: &NewAvailabilitySlot,
    ) -> Result<AvailabilitySlot, PortalError>;
    async fn delete_availability(&self, id: Uuid, doctor_id: Uuid) -> Result<bool, PortalError>;
    async fn list_availability(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<AvailabilitySlot>, PortalError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

macro_rules! doctor_columns {
    () => {
        "id, user_id, first_name, last_name, license_number, consultation_fee, phone, email, \
         bio, years_of_experience, created_at, updated_at"
    };
}

/// Logs a database failure under the operation name and converts it into a `PortalError`.
fn db_err(op: &'static str) -> impl Fn(sqlx::Error) -> PortalError {
    move |e| {
        tracing::error!("{} error: {:?}", op, e);
        PortalError::from(e)
    }
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// get_role_name
    ///
    /// Joins `user_roles` to `roles`. A user without a row yields `None`.
    async fn get_role_name(&self, user_id: Uuid) -> Result<Option<String>, PortalError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("get_role_name"))
    }

    /// assign_role
    ///
    /// Upserts on the `user_roles` primary key, so a user never holds more than one role.
    async fn assign_role(&self, user_id: Uuid, role: Role) -> Result<(), PortalError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            SELECT $1, id FROM roles WHERE name = $2
            ON CONFLICT (user_id) DO UPDATE SET role_id = EXCLUDED.role_id
            "#,
        )
        .bind(user_id)
        .bind(role.name())
        .execute(&self.pool)
        .await
        .map_err(db_err("assign_role"))?;

        if result.rows_affected() == 0 {
            return Err(PortalError::NotFound(format!(
                "role '{}' is not seeded",
                role
            )));
        }
        Ok(())
    }

    async fn create_doctor(
        &self,
        user_id: Uuid,
        req: &CreateDoctorRequest,
    ) -> Result<Doctor, PortalError> {
        sqlx::query_as::<_, Doctor>(concat!(
            "INSERT INTO doctors (id, user_id, first_name, last_name, license_number, \
             consultation_fee, phone, email, bio, years_of_experience, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW()) RETURNING ",
            doctor_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(&req.license_number)
        .bind(req.consultation_fee)
        .bind(&req.phone)
        .bind(&req.email)
        .bind(&req.bio)
        .bind(req.years_of_experience)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("create_doctor"))
    }

    async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, PortalError> {
        sqlx::query_as::<_, Doctor>(concat!(
            "SELECT ",
            doctor_columns!(),
            " FROM doctors WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("get_doctor"))
    }

    async fn get_doctor_by_user(&self, user_id: Uuid) -> Result<Option<Doctor>, PortalError> {
        sqlx::query_as::<_, Doctor>(concat!(
            "SELECT ",
            doctor_columns!(),
            " FROM doctors WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("get_doctor_by_user"))
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, PortalError> {
        sqlx::query_as::<_, Doctor>(concat!(
            "SELECT ",
            doctor_columns!(),
            " FROM doctors ORDER BY last_name, first_name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list_doctors"))
    }

    /// update_doctor
    ///
    /// Uses `COALESCE` so only the fields present in `req` overwrite stored values.
    async fn update_doctor(
        &self,
        id: Uuid,
        req: &UpdateDoctorRequest,
    ) -> Result<Option<Doctor>, PortalError> {
        sqlx::query_as::<_, Doctor>(concat!(
            "UPDATE doctors SET \
                first_name = COALESCE($2, first_name), \
                last_name = COALESCE($3, last_name), \
                license_number = COALESCE($4, license_number), \
                consultation_fee = COALESCE($5, consultation_fee), \
                phone = COALESCE($6, phone), \
                email = COALESCE($7, email), \
                bio = COALESCE($8, bio), \
                years_of_experience = COALESCE($9, years_of_experience), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING ",
            doctor_columns!()
        ))
        .bind(id)
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(&req.license_number)
        .bind(req.consultation_fee)
        .bind(&req.phone)
        .bind(&req.email)
        .bind(&req.bio)
        .bind(req.years_of_experience)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("update_doctor"))
    }

    /// delete_doctor
    ///
    /// Join rows and child records go with the doctor via `ON DELETE CASCADE`;
    /// `doctor_specializations.specialization_id` is `RESTRICT`, so the shared catalogue is untouched.
    async fn delete_doctor(&self, id: Uuid) -> Result<bool, PortalError> {
        let result = sqlx::query("DELETE FROM doctors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err("delete_doctor"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_specializations(&self) -> Result<Vec<Specialization>, PortalError> {
        sqlx::query_as::<_, Specialization>(
            "SELECT id, name, created_at FROM specializations ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list_specializations"))
    }

    async fn get_doctor_specializations(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<Specialization>, PortalError> {
        let mut conn = self.pool.acquire().await.map_err(db_err("acquire"))?;
        PgSpecializationStore { conn: &mut *conn }
            .current_mappings(doctor_id)
            .await
    }

    /// sync_doctor_specializations
    ///
    /// Runs the reconciliation in one transaction. The doctor row is locked `FOR UPDATE` first,
    /// so two syncs for the same doctor cannot both read the same "current" set.
    async fn sync_doctor_specializations(
        &self,
        doctor_id: Uuid,
        desired: &BTreeSet<String>,
    ) -> Result<SyncReport, PortalError> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin sync"))?;

        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM doctors WHERE id = $1 FOR UPDATE")
            .bind(doctor_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err("lock doctor"))?;
        if locked.is_none() {
            return Err(PortalError::NotFound(format!("doctor {} not found", doctor_id)));
        }

        let report = {
            let mut store = PgSpecializationStore { conn: &mut *tx };
            sync_specializations(&mut store, doctor_id, desired).await?
        };

        tx.commit().await.map_err(db_err("commit sync"))?;
        Ok(report)
    }

    async fn add_education(
        &self,
        doctor_id: Uuid,
        req: &NewEducation,
    ) -> Result<Education, PortalError> {
        sqlx::query_as::<_, Education>(
            r#"
            INSERT INTO doctor_education (id, doctor_id, degree, institution, graduation_year, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id, doctor_id, degree, institution, graduation_year, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(doctor_id)
        .bind(&req.degree)
        .bind(&req.institution)
        .bind(req.graduation_year)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("add_education"))
    }

    async fn delete_education(&self, id: Uuid, doctor_id: Uuid) -> Result<bool, PortalError> {
        let result = sqlx::query("DELETE FROM doctor_education WHERE id = $1 AND doctor_id = $2")
            .bind(id)
            .bind(doctor_id)
            .execute(&self.pool)
            .await
            .map_err(db_err("delete_education"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_education(&self, doctor_id: Uuid) -> Result<Vec<Education>, PortalError> {
        sqlx::query_as::<_, Education>(
            r#"
            SELECT id, doctor_id, degree, institution, graduation_year, created_at
            FROM doctor_education
            WHERE doctor_id = $1
            ORDER BY graduation_year DESC NULLS LAST, created_at
            "#,
        )
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list_education"))
    }

    async fn add_certification(
        &self,
        doctor_id: Uuid,
        req: &NewCertification,
    ) -> Result<Certification, PortalError> {
        sqlx::query_as::<_, Certification>(
            r#"
            INSERT INTO doctor_certifications (id, doctor_id, name, issuing_body, issue_date, expiry_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING id, doctor_id, name, issuing_body, issue_date, expiry_date, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(doctor_id)
        .bind(&req.name)
        .bind(&req.issuing_body)
        .bind(req.issue_date)
        .bind(req.expiry_date)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("add_certification"))
    }

    async fn delete_certification(
        &self,
        id: Uuid,
        doctor_id: Uuid,
    ) -> Result<bool, PortalError> {
        let result =
            sqlx::query("DELETE FROM doctor_certifications WHERE id = $1 AND doctor_id = $2")
                .bind(id)
                .bind(doctor_id)
                .execute(&self.pool)
                .await
                .map_err(db_err("delete_certification"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_certifications(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<Certification>, PortalError> {
        sqlx::query_as::<_, Certification>(
            r#"
            SELECT id, doctor_id, name, issuing_body, issue_date, expiry_date, created_at
            FROM doctor_certifications
            WHERE doctor_id = $1
            ORDER BY issue_date DESC NULLS LAST, created_at
            "#,
        )
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list_certifications"))
    }

    async fn add_availability(
        &self,
        doctor_id: Uuid,
        req: &NewAvailabilitySlot,
    ) -> Result<AvailabilitySlot, PortalError> {
        sqlx::query_as::<_, AvailabilitySlot>(
            r#"
            INSERT INTO doctor_availability (id, doctor_id, day_of_week, start_time, end_time, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id, doctor_id, day_of_week, start_time, end_time, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(doctor_id)
        .bind(req.day_of_week)
        .bind(req.start_time)
        .bind(req.end_time)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("add_availability"))
    }

    async fn delete_availability(&self, id: Uuid, doctor_id: Uuid) -> Result<bool, PortalError> {
        let result =
            sqlx::query("DELETE FROM doctor_availability WHERE id = $1 AND doctor_id = $2")
                .bind(id)
                .bind(doctor_id)
                .execute(&self.pool)
                .await
                .map_err(db_err("delete_availability"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_availability(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<AvailabilitySlot>, PortalError> {
        sqlx::query_as::<_, AvailabilitySlot>(
            r#"
            SELECT id, doctor_id, day_of_week, start_time, end_time, created_at
            FROM doctor_availability
            WHERE doctor_id = $1
            ORDER BY day_of_week, start_time
            "#,
        )
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list_availability"))
    }
}

/// PgSpecializationStore
///
/// `SpecializationStore` over a single Postgres connection. Inside `sync_doctor_specializations`
/// the connection is an open transaction, and each `ensure_specialization` runs under a savepoint
/// so one failed create does not poison the rest of the sync.
struct PgSpecializationStore<'c> {
    conn: &'c mut PgConnection,
}

#[async_trait]
impl<'c> SpecializationStore for PgSpecializationStore<'c> {
    async fn current_mappings(
        &mut self,
        doctor_id: Uuid,
    ) -> Result<Vec<Specialization>, PortalError> {
        sqlx::query_as::<_, Specialization>(
            r#"
            SELECT s.id, s.name, s.created_at
            FROM doctor_specializations ds
            JOIN specializations s ON s.id = ds.specialization_id
            WHERE ds.doctor_id = $1
            ORDER BY s.name
            "#,
        )
        .bind(doctor_id)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(db_err("current_mappings"))
    }

    async fn ensure_specialization(&mut self, name: &str) -> Result<Specialization, PortalError> {
        let mut savepoint = self.conn.begin().await.map_err(db_err("savepoint"))?;

        let existing = sqlx::query_as::<_, Specialization>(
            "SELECT id, name, created_at FROM specializations WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&mut *savepoint)
        .await
        .map_err(db_err("find_specialization"))?;

        let specialization = match existing {
            Some(s) => s,
            None => {
                // Another writer may create the same name between the lookup and the insert.
                sqlx::query(
                    "INSERT INTO specializations (id, name, created_at) VALUES ($1, $2, NOW()) \
                     ON CONFLICT (name) DO NOTHING",
                )
                .bind(Uuid::new_v4())
                .bind(name)
                .execute(&mut *savepoint)
                .await
                .map_err(db_err("create_specialization"))?;

                sqlx::query_as::<_, Specialization>(
                    "SELECT id, name, created_at FROM specializations WHERE name = $1",
                )
                .bind(name)
                .fetch_one(&mut *savepoint)
                .await
                .map_err(db_err("find_specialization"))?
            }
        };

        savepoint.commit().await.map_err(db_err("release savepoint"))?;
        Ok(specialization)
    }

    async fn link(&mut self, doctor_id: Uuid, specialization_id: Uuid) -> Result<(), PortalError> {
        sqlx::query(
            "INSERT INTO doctor_specializations (doctor_id, specialization_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(doctor_id)
        .bind(specialization_id)
        .execute(&mut *self.conn)
        .await
        .map_err(db_err("link_specialization"))?;
        Ok(())
    }

    async fn unlink(
        &mut self,
        doctor_id: Uuid,
        specialization_ids: &[Uuid],
    ) -> Result<u64, PortalError> {
        let result = sqlx::query(
            "DELETE FROM doctor_specializations WHERE doctor_id = $1 AND specialization_id = ANY($2)",
        )
        .bind(doctor_id)
        .bind(specialization_ids)
        .execute(&mut *self.conn)
        .await
        .map_err(db_err("unlink_specializations"))?;
        Ok(result.rows_affected())
    }
}
