use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::PortalError;

/// Landing area for an authenticated user whose role is missing or unrecognized.
pub const DEFAULT_DESTINATION: &str = "/dashboard";

/// Landing area for a caller without a session.
pub const SIGN_IN_PATH: &str = "/login";

/// Role
///
/// The fixed set of portal roles. The serialized form is the display name stored in the
/// `roles.name` column (e.g. `"Lab Technician"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    Patient,
    Receptionist,
    #[serde(rename = "Lab Technician")]
    LabTechnician,
    Pharmacist,
    #[serde(rename = "Billing Specialist")]
    BillingSpecialist,
    Radiologist,
    #[serde(rename = "IT Support")]
    ItSupport,
}

impl Role {
    pub const ALL: [Role; 10] = [
        Role::Admin,
        Role::Doctor,
        Role::Nurse,
        Role::Patient,
        Role::Receptionist,
        Role::LabTechnician,
        Role::Pharmacist,
        Role::BillingSpecialist,
        Role::Radiologist,
        Role::ItSupport,
    ];

    /// The canonical role name as stored in the database.
    pub fn name(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Doctor => "Doctor",
            Role::Nurse => "Nurse",
            Role::Patient => "Patient",
            Role::Receptionist => "Receptionist",
            Role::LabTechnician => "Lab Technician",
            Role::Pharmacist => "Pharmacist",
            Role::BillingSpecialist => "Billing Specialist",
            Role::Radiologist => "Radiologist",
            Role::ItSupport => "IT Support",
        }
    }

    /// Exact-match lookup of a stored role name. Anything else is `None`.
    pub fn from_name(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.name() == name)
    }

    pub fn landing_path(self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Doctor => "/doctor/dashboard",
            Role::Nurse => "/nurse/dashboard",
            Role::Patient => "/patient/dashboard",
            Role::Receptionist => "/receptionist/dashboard",
            Role::LabTechnician => "/lab/dashboard",
            Role::Pharmacist => "/pharmacy/dashboard",
            Role::BillingSpecialist => "/billing/dashboard",
            Role::Radiologist => "/radiology/dashboard",
            Role::ItSupport => "/it-support/dashboard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_name(s).ok_or_else(|| PortalError::Validation(format!("unknown role '{}'", s)))
    }
}

/// redirect_target
///
/// Maps a resolved role to the landing path the routing layer should redirect to.
/// Total: `None` falls through to [`DEFAULT_DESTINATION`].
pub fn redirect_target(role: Option<Role>) -> &'static str {
    role.map(Role::landing_path).unwrap_or(DEFAULT_DESTINATION)
}

/// Same as [`redirect_target`] but over raw role names, for callers holding an unparsed string.
pub fn redirect_target_for_name(name: Option<&str>) -> &'static str {
    redirect_target(name.and_then(Role::from_name))
}
