use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::PortalError, roles::Role};

// --- Uniform Result Envelope ---

/// ActionResult
///
/// The `{ success, error? }` envelope every mutating endpoint answers with. Errors are converted
/// into this shape by `PortalError::into_response`, so callers only ever branch on `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

// --- Session & Role Schemas ---

/// SignInRequest
///
/// Credentials forwarded to the identity provider. The password is never stored or logged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

impl SignInRequest {
    pub fn validate(&self) -> Result<(), PortalError> {
        require("email", &self.email)?;
        require("password", &self.password)
    }
}

/// SignInResponse
///
/// Successful sign-in. `role` is `None` when the user has no role row; `redirect_to` is then
/// the default destination.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInResponse {
    pub success: bool,
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub redirect_to: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// AuthStatus
///
/// Answer to "who am I and where should I go", usable with or without a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub user_id: Option<Uuid>,
    pub role: Option<Role>,
    pub redirect_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AssignRoleRequest {
    pub role: Role,
}

// --- Doctor Schemas ---

/// Doctor
///
/// A doctor profile from the `doctors` table. Owned by exactly one auth user (`user_id`), but
/// edited and deleted independently of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub license_number: String,
    pub consultation_fee: f64,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub years_of_experience: Option<i32>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// CreateDoctorRequest
///
/// Payload assembled by the multi-step doctor form (POST /doctors).
/// `user_id` is honoured only for admins; a doctor always creates their own profile.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateDoctorRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub license_number: String,
    #[serde(default)]
    pub consultation_fee: f64,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub years_of_experience: Option<i32>,
    /// Initial specialization names, created on the fly when unknown.
    #[serde(default)]
    pub specializations: Vec<String>,
}

impl CreateDoctorRequest {
    pub fn validate(&self) -> Result<(), PortalError> {
        require("first_name", &self.first_name)?;
        require("last_name", &self.last_name)?;
        require("license_number", &self.license_number)?;
        check_fee(Some(self.consultation_fee))?;
        check_experience(self.years_of_experience)?;
        check_specialization_names(&self.specializations)
    }
}

/// UpdateDoctorRequest
///
/// Partial update (PUT /doctors/{id}). Absent fields are left untouched. When
/// `specializations` is present, the doctor's mapping is reconciled to exactly that set.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateDoctorRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consultation_fee: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_of_experience: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specializations: Option<Vec<String>>,
}

impl UpdateDoctorRequest {
    pub fn validate(&self) -> Result<(), PortalError> {
        // Present-but-blank required fields would erase data the form marks as mandatory.
        if let Some(v) = &self.first_name {
            require("first_name", v)?;
        }
        if let Some(v) = &self.last_name {
            require("last_name", v)?;
        }
        if let Some(v) = &self.license_number {
            require("license_number", v)?;
        }
        check_fee(self.consultation_fee)?;
        check_experience(self.years_of_experience)?;
        match &self.specializations {
            Some(names) => check_specialization_names(names),
            None => Ok(()),
        }
    }
}

// --- Specialization Schemas ---

/// Specialization
///
/// A globally shared tag from the `specializations` table. Never owned by a doctor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Specialization {
    pub id: Uuid,
    pub name: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// DoctorSpecialization
///
/// One row of the many-to-many join table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct DoctorSpecialization {
    pub doctor_id: Uuid,
    pub specialization_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SyncSpecializationsRequest {
    pub names: Vec<String>,
}

impl SyncSpecializationsRequest {
    pub fn validate(&self) -> Result<(), PortalError> {
        check_specialization_names(&self.names)
    }
}

/// SyncReport
///
/// Outcome of a reconciliation. `failed` lists names whose specialization row could not be
/// created; those names were skipped and the rest of the sync still applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

// --- Auxiliary Child Records ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Education {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub degree: String,
    pub institution: String,
    pub graduation_year: Option<i32>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NewEducation {
    pub degree: String,
    pub institution: String,
    #[serde(default)]
    pub graduation_year: Option<i32>,
}

impl NewEducation {
    pub fn validate(&self) -> Result<(), PortalError> {
        require("degree", &self.degree)?;
        require("institution", &self.institution)?;
        match self.graduation_year {
            Some(year) if !(1900..=2200).contains(&year) => Err(PortalError::Validation(
                format!("graduation_year {} is out of range", year),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Certification {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub name: String,
    pub issuing_body: String,
    #[ts(type = "string | null")]
    pub issue_date: Option<NaiveDate>,
    #[ts(type = "string | null")]
    pub expiry_date: Option<NaiveDate>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NewCertification {
    pub name: String,
    pub issuing_body: String,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub expiry_date: Option<NaiveDate>,
}

impl NewCertification {
    pub fn validate(&self) -> Result<(), PortalError> {
        require("name", &self.name)?;
        require("issuing_body", &self.issuing_body)?;
        if let (Some(issued), Some(expires)) = (self.issue_date, self.expiry_date) {
            if expires < issued {
                return Err(PortalError::Validation(
                    "expiry_date must not be before issue_date".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// AvailabilitySlot
///
/// A weekly recurring slot. `day_of_week` runs 0 (Sunday) to 6 (Saturday).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i16,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "09:00:00")]
    pub start_time: NaiveTime,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "17:00:00")]
    pub end_time: NaiveTime,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NewAvailabilitySlot {
    pub day_of_week: i16,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "09:00:00")]
    pub start_time: NaiveTime,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "17:00:00")]
    pub end_time: NaiveTime,
}

impl NewAvailabilitySlot {
    pub fn validate(&self) -> Result<(), PortalError> {
        if !(0..=6).contains(&self.day_of_week) {
            return Err(PortalError::Validation(format!(
                "day_of_week must be between 0 and 6, got {}",
                self.day_of_week
            )));
        }
        if self.start_time >= self.end_time {
            return Err(PortalError::Validation(
                "start_time must be before end_time".to_string(),
            ));
        }
        Ok(())
    }
}

/// DoctorProfile
///
/// Aggregated read model for the profile page: the doctor row plus every related collection.
/// Create and update responses also carry the outcome of the specialization sync they ran, so
/// names that could not be saved can be shown inline on the form.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DoctorProfile {
    pub doctor: Doctor,
    pub specializations: Vec<Specialization>,
    pub education: Vec<Education>,
    pub certifications: Vec<Certification>,
    pub availability: Vec<AvailabilitySlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization_sync: Option<SyncReport>,
}

// --- Validation Helpers ---

fn require(field: &str, value: &str) -> Result<(), PortalError> {
    if value.trim().is_empty() {
        return Err(PortalError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn check_fee(fee: Option<f64>) -> Result<(), PortalError> {
    match fee {
        Some(f) if !f.is_finite() || f < 0.0 => Err(PortalError::Validation(
            "consultation_fee must be a non-negative amount".to_string(),
        )),
        _ => Ok(()),
    }
}

fn check_experience(years: Option<i32>) -> Result<(), PortalError> {
    match years {
        Some(y) if y < 0 => Err(PortalError::Validation(
            "years_of_experience must not be negative".to_string(),
        )),
        _ => Ok(()),
    }
}

fn check_specialization_names(names: &[String]) -> Result<(), PortalError> {
    if names.iter().any(|n| n.trim().is_empty()) {
        return Err(PortalError::Validation(
            "specialization names must not be empty".to_string(),
        ));
    }
    Ok(())
}
