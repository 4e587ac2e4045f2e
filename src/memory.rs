use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashMap, HashSet},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::PortalError,
    models::{
        AvailabilitySlot, Certification, CreateDoctorRequest, Doctor, DoctorSpecialization,
        Education, NewAvailabilitySlot, NewCertification, NewEducation, Specialization,
        SyncReport, UpdateDoctorRequest,
    },
    repository::Repository,
    roles::Role,
    specializations::{SpecializationStore, sync_specializations},
};

#[derive(Default)]
struct Tables {
    // user_id -> stored role name (kept as a raw string so unknown names can be seeded)
    user_roles: HashMap<Uuid, String>,
    doctors: HashMap<Uuid, Doctor>,
    specializations: Vec<Specialization>,
    doctor_specializations: HashSet<DoctorSpecialization>,
    education: Vec<Education>,
    certifications: Vec<Certification>,
    availability: Vec<AvailabilitySlot>,
}

/// InMemoryRepository
///
/// A process-local implementation of `Repository` used by the test suites and for running the
/// API without a database. All tables sit behind one async mutex, so a specialization sync holds
/// the lock for its whole duration and concurrent syncs serialize.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    /// Specialization names whose creation is made to fail, simulating a backend error.
    failing_specializations: HashSet<String>,
    /// When true, every operation fails with `PortalError::Backend`.
    unavailable: bool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose every call fails, for exercising soft-failure paths.
    pub fn new_unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Makes `ensure_specialization` fail for these names when they do not exist yet.
    pub fn with_failing_specializations<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.failing_specializations = names.into_iter().map(Into::into).collect();
        self
    }

    /// Stores a raw role name for the user, bypassing the `Role` enum.
    pub async fn seed_role_name(&self, user_id: Uuid, role_name: &str) {
        self.tables
            .lock()
            .await
            .user_roles
            .insert(user_id, role_name.to_string());
    }

    fn check_available(&self) -> Result<(), PortalError> {
        if self.unavailable {
            return Err(PortalError::Backend(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn doctor_from_request(id: Uuid, user_id: Uuid, req: &CreateDoctorRequest) -> Doctor {
    let now = Utc::now();
    Doctor {
        id,
        user_id,
        first_name: req.first_name.clone(),
        last_name: req.last_name.clone(),
        license_number: req.license_number.clone(),
        consultation_fee: req.consultation_fee,
        phone: req.phone.clone(),
        email: req.email.clone(),
        bio: req.bio.clone(),
        years_of_experience: req.years_of_experience,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_role_name(&self, user_id: Uuid) -> Result<Option<String>, PortalError> {
        self.check_available()?;
        Ok(self.tables.lock().await.user_roles.get(&user_id).cloned())
    }

    async fn assign_role(&self, user_id: Uuid, role: Role) -> Result<(), PortalError> {
        self.check_available()?;
        self.tables
            .lock()
            .await
            .user_roles
            .insert(user_id, role.name().to_string());
        Ok(())
    }

    async fn create_doctor(
        &self,
        user_id: Uuid,
        req: &CreateDoctorRequest,
    ) -> Result<Doctor, PortalError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if tables.doctors.values().any(|d| d.user_id == user_id) {
            return Err(PortalError::Validation(
                "a record with the same doctors_user_id_key already exists".to_string(),
            ));
        }
        if tables
            .doctors
            .values()
            .any(|d| d.license_number == req.license_number)
        {
            return Err(PortalError::Validation(
                "a record with the same doctors_license_number_key already exists".to_string(),
            ));
        }
        let doctor = doctor_from_request(Uuid::new_v4(), user_id, req);
        tables.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, PortalError> {
        self.check_available()?;
        Ok(self.tables.lock().await.doctors.get(&id).cloned())
    }

    async fn get_doctor_by_user(&self, user_id: Uuid) -> Result<Option<Doctor>, PortalError> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .await
            .doctors
            .values()
            .find(|d| d.user_id == user_id)
            .cloned())
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, PortalError> {
        self.check_available()?;
        let mut doctors: Vec<Doctor> = self.tables.lock().await.doctors.values().cloned().collect();
        doctors.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str())
                .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });
        Ok(doctors)
    }

    async fn update_doctor(
        &self,
        id: Uuid,
        req: &UpdateDoctorRequest,
    ) -> Result<Option<Doctor>, PortalError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if let Some(license) = &req.license_number {
            if tables
                .doctors
                .values()
                .any(|d| d.id != id && &d.license_number == license)
            {
                return Err(PortalError::Validation(
                    "a record with the same doctors_license_number_key already exists".to_string(),
                ));
            }
        }
        let Some(doctor) = tables.doctors.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = &req.first_name {
            doctor.first_name = v.clone();
        }
        if let Some(v) = &req.last_name {
            doctor.last_name = v.clone();
        }
        if let Some(v) = &req.license_number {
            doctor.license_number = v.clone();
        }
        if let Some(v) = req.consultation_fee {
            doctor.consultation_fee = v;
        }
        if let Some(v) = &req.phone {
            doctor.phone = Some(v.clone());
        }
        if let Some(v) = &req.email {
            doctor.email = Some(v.clone());
        }
        if let Some(v) = &req.bio {
            doctor.bio = Some(v.clone());
        }
        if let Some(v) = req.years_of_experience {
            doctor.years_of_experience = Some(v);
        }
        doctor.updated_at = Utc::now();
        Ok(Some(doctor.clone()))
    }

    async fn delete_doctor(&self, id: Uuid) -> Result<bool, PortalError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if tables.doctors.remove(&id).is_none() {
            return Ok(false);
        }
        // Mirrors the ON DELETE CASCADE foreign keys; specializations themselves stay.
        tables.doctor_specializations.retain(|m| m.doctor_id != id);
        tables.education.retain(|e| e.doctor_id != id);
        tables.certifications.retain(|c| c.doctor_id != id);
        tables.availability.retain(|a| a.doctor_id != id);
        Ok(true)
    }

    async fn list_specializations(&self) -> Result<Vec<Specialization>, PortalError> {
        self.check_available()?;
        let mut all = self.tables.lock().await.specializations.clone();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn get_doctor_specializations(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<Specialization>, PortalError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        MemoryStore {
            tables: &mut *tables,
            failing: &self.failing_specializations,
        }
        .current_mappings(doctor_id)
        .await
    }

    async fn sync_doctor_specializations(
        &self,
        doctor_id: Uuid,
        desired: &BTreeSet<String>,
    ) -> Result<SyncReport, PortalError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if !tables.doctors.contains_key(&doctor_id) {
            return Err(PortalError::NotFound(format!(
                "doctor {} not found",
                doctor_id
            )));
        }
        let mut store = MemoryStore {
            tables: &mut *tables,
            failing: &self.failing_specializations,
        };
        sync_specializations(&mut store, doctor_id, desired).await
    }

    async fn add_education(
        &self,
        doctor_id: Uuid,
        req: &NewEducation,
    ) -> Result<Education, PortalError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        ensure_doctor(&tables, doctor_id)?;
        let record = Education {
            id: Uuid::new_v4(),
            doctor_id,
            degree: req.degree.clone(),
            institution: req.institution.clone(),
            graduation_year: req.graduation_year,
            created_at: Utc::now(),
        };
        tables.education.push(record.clone());
        Ok(record)
    }

    async fn delete_education(&self, id: Uuid, doctor_id: Uuid) -> Result<bool, PortalError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let before = tables.education.len();
        tables
            .education
            .retain(|e| !(e.id == id && e.doctor_id == doctor_id));
        Ok(tables.education.len() < before)
    }

    async fn list_education(&self, doctor_id: Uuid) -> Result<Vec<Education>, PortalError> {
        self.check_available()?;
        let mut records: Vec<Education> = self
            .tables
            .lock()
            .await
            .education
            .iter()
            .filter(|e| e.doctor_id == doctor_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            desc_nulls_last(&a.graduation_year, &b.graduation_year)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(records)
    }

    async fn add_certification(
        &self,
        doctor_id: Uuid,
        req: &NewCertification,
    ) -> Result<Certification, PortalError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        ensure_doctor(&tables, doctor_id)?;
        let record = Certification {
            id: Uuid::new_v4(),
            doctor_id,
            name: req.name.clone(),
            issuing_body: req.issuing_body.clone(),
            issue_date: req.issue_date,
            expiry_date: req.expiry_date,
            created_at: Utc::now(),
        };
        tables.certifications.push(record.clone());
        Ok(record)
    }

    async fn delete_certification(
        &self,
        id: Uuid,
        doctor_id: Uuid,
    ) -> Result<bool, PortalError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let before = tables.certifications.len();
        tables
            .certifications
            .retain(|c| !(c.id == id && c.doctor_id == doctor_id));
        Ok(tables.certifications.len() < before)
    }

    async fn list_certifications(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<Certification>, PortalError> {
        self.check_available()?;
        let mut records: Vec<Certification> = self
            .tables
            .lock()
            .await
            .certifications
            .iter()
            .filter(|c| c.doctor_id == doctor_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            desc_nulls_last(&a.issue_date, &b.issue_date).then(a.created_at.cmp(&b.created_at))
        });
        Ok(records)
    }

    async fn add_availability(
        &self,
        doctor_id: Uuid,
        req: &NewAvailabilitySlot,
    ) -> Result<AvailabilitySlot, PortalError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        ensure_doctor(&tables, doctor_id)?;
        let record = AvailabilitySlot {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week: req.day_of_week,
            start_time: req.start_time,
            end_time: req.end_time,
            created_at: Utc::now(),
        };
        tables.availability.push(record.clone());
        Ok(record)
    }

    async fn delete_availability(&self, id: Uuid, doctor_id: Uuid) -> Result<bool, PortalError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let before = tables.availability.len();
        tables
            .availability
            .retain(|a| !(a.id == id && a.doctor_id == doctor_id));
        Ok(tables.availability.len() < before)
    }

    async fn list_availability(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<AvailabilitySlot>, PortalError> {
        self.check_available()?;
        let mut slots: Vec<AvailabilitySlot> = self
            .tables
            .lock()
            .await
            .availability
            .iter()
            .filter(|a| a.doctor_id == doctor_id)
            .cloned()
            .collect();
        slots.sort_by_key(|a| (a.day_of_week, a.start_time));
        Ok(slots)
    }
}

// Mirrors `ORDER BY col DESC NULLS LAST`.
fn desc_nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// Foreign-key check for child inserts.
fn ensure_doctor(tables: &Tables, doctor_id: Uuid) -> Result<(), PortalError> {
    if tables.doctors.contains_key(&doctor_id) {
        Ok(())
    } else {
        Err(PortalError::NotFound(format!("doctor {} not found", doctor_id)))
    }
}

struct MemoryStore<'a> {
    tables: &'a mut Tables,
    failing: &'a HashSet<String>,
}

#[async_trait]
impl<'a> SpecializationStore for MemoryStore<'a> {
    async fn current_mappings(
        &mut self,
        doctor_id: Uuid,
    ) -> Result<Vec<Specialization>, PortalError> {
        let ids: HashSet<Uuid> = self
            .tables
            .doctor_specializations
            .iter()
            .filter(|m| m.doctor_id == doctor_id)
            .map(|m| m.specialization_id)
            .collect();
        let mut mapped: Vec<Specialization> = self
            .tables
            .specializations
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect();
        mapped.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(mapped)
    }

    async fn ensure_specialization(&mut self, name: &str) -> Result<Specialization, PortalError> {
        if let Some(existing) = self.tables.specializations.iter().find(|s| s.name == name) {
            return Ok(existing.clone());
        }
        if self.failing.contains(name) {
            return Err(PortalError::Backend(format!(
                "could not create specialization '{}'",
                name
            )));
        }
        let created = Specialization {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.tables.specializations.push(created.clone());
        Ok(created)
    }

    async fn link(&mut self, doctor_id: Uuid, specialization_id: Uuid) -> Result<(), PortalError> {
        self.tables.doctor_specializations.insert(DoctorSpecialization {
            doctor_id,
            specialization_id,
        });
        Ok(())
    }

    async fn unlink(
        &mut self,
        doctor_id: Uuid,
        specialization_ids: &[Uuid],
    ) -> Result<u64, PortalError> {
        let before = self.tables.doctor_specializations.len();
        self.tables.doctor_specializations.retain(|m| {
            !(m.doctor_id == doctor_id && specialization_ids.contains(&m.specialization_id))
        });
        Ok((before - self.tables.doctor_specializations.len()) as u64)
    }
}
