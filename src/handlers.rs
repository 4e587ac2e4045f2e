use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::PortalError,
    models::{
        ActionResult, AssignRoleRequest, AuthStatus, AvailabilitySlot, Certification,
        CreateDoctorRequest, Doctor, DoctorProfile, Education, NewAvailabilitySlot,
        NewCertification, NewEducation, SignInRequest, SignInResponse, Specialization,
        SyncReport, SyncSpecializationsRequest, UpdateDoctorRequest,
    },
    repository::Repository,
    roles::Role,
    session,
    specializations::desired_set,
};

// --- Helpers ---

async fn load_doctor(repo: &dyn Repository, id: Uuid) -> Result<Doctor, PortalError> {
    repo.get_doctor(id)
        .await?
        .ok_or_else(|| PortalError::NotFound(format!("doctor {} not found", id)))
}

/// Owner-or-admin check for every write on a doctor and its child records.
fn authorize_doctor_write(auth: &AuthUser, doctor: &Doctor) -> Result<(), PortalError> {
    if auth.is_admin() || doctor.user_id == auth.id {
        Ok(())
    } else {
        Err(PortalError::Forbidden(
            "only the profile owner or an admin may change this doctor".to_string(),
        ))
    }
}

async fn build_profile(repo: &dyn Repository, doctor: Doctor) -> Result<DoctorProfile, PortalError> {
    let id = doctor.id;
    Ok(DoctorProfile {
        specializations: repo.get_doctor_specializations(id).await?,
        education: repo.list_education(id).await?,
        certifications: repo.list_certifications(id).await?,
        availability: repo.list_availability(id).await?,
        doctor,
        specialization_sync: None,
    })
}

fn deleted_or_not_found(deleted: bool, what: &str) -> Result<Json<ActionResult>, PortalError> {
    if deleted {
        Ok(Json(ActionResult::ok()))
    } else {
        Err(PortalError::NotFound(format!("{} not found", what)))
    }
}

// --- Session Handlers ---

/// sign_in
///
/// [Public Route] Verifies credentials with the identity provider and answers with the landing
/// path for the user's role. A user without a role still signs in and lands on `/dashboard`.
#[utoipa::path(
    post,
    path = "/auth/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = SignInResponse),
        (status = 401, description = "Bad credentials", body = ActionResult),
        (status = 422, description = "Missing email or password", body = ActionResult)
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<SignInResponse>, PortalError> {
    let outcome = session::sign_in(state.identity.as_ref(), state.repo.as_ref(), &payload).await?;
    Ok(Json(outcome))
}

/// sign_out
///
/// [Authenticated Route] Revokes the caller's session at the identity provider.
#[utoipa::path(
    post,
    path = "/auth/sign-out",
    responses((status = 200, description = "Signed out", body = ActionResult))
)]
pub async fn sign_out(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ActionResult>, PortalError> {
    session::sign_out(state.identity.as_ref(), &auth).await?;
    Ok(Json(ActionResult::ok()))
}

/// auth_status
///
/// [Public Route] Reports whether the caller is signed in and where to route them.
/// Never fails: a missing or invalid token simply reads as unauthenticated.
#[utoipa::path(
    get,
    path = "/auth/status",
    responses((status = 200, description = "Current status", body = AuthStatus))
)]
pub async fn auth_status(auth: Option<AuthUser>) -> Json<AuthStatus> {
    Json(session::check_auth_status(auth.as_ref()))
}

/// get_me
///
/// [Authenticated Route] The caller's identity, role and landing path.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Current user", body = AuthStatus))
)]
pub async fn get_me(auth: AuthUser) -> Json<AuthStatus> {
    Json(session::check_auth_status(Some(&auth)))
}

/// assign_role
///
/// [Admin Route] Sets the single role of a user.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "Auth user ID")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = ActionResult),
        (status = 403, description = "Not an admin", body = ActionResult)
    )
)]
pub async fn assign_role(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<Json<ActionResult>, PortalError> {
    auth.require_any(&[Role::Admin])?;
    state.repo.assign_role(user_id, payload.role).await?;
    tracing::info!(admin = %auth.id, %user_id, role = %payload.role, "role assigned");
    Ok(Json(ActionResult::ok()))
}

// --- Doctor Handlers ---

/// list_doctors
///
/// [Authenticated Route] All doctor profiles, ordered by name.
#[utoipa::path(
    get,
    path = "/doctors",
    responses((status = 200, description = "Doctors", body = [Doctor]))
)]
pub async fn list_doctors(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Doctor>>, PortalError> {
    Ok(Json(state.repo.list_doctors().await?))
}

/// get_doctor_profile
///
/// [Authenticated Route] A doctor with specializations, education, certifications and availability.
#[utoipa::path(
    get,
    path = "/doctors/{id}",
    params(("id" = Uuid, Path, description = "Doctor ID")),
    responses(
        (status = 200, description = "Profile", body = DoctorProfile),
        (status = 404, description = "Not Found", body = ActionResult)
    )
)]
pub async fn get_doctor_profile(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DoctorProfile>, PortalError> {
    let doctor = load_doctor(state.repo.as_ref(), id).await?;
    Ok(Json(build_profile(state.repo.as_ref(), doctor).await?))
}

/// get_my_doctor_profile
///
/// [Authenticated Route] The profile owned by the caller, for the doctor dashboard.
#[utoipa::path(
    get,
    path = "/doctors/me",
    responses(
        (status = 200, description = "Profile", body = DoctorProfile),
        (status = 404, description = "No profile yet", body = ActionResult)
    )
)]
pub async fn get_my_doctor_profile(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DoctorProfile>, PortalError> {
    let doctor = state
        .repo
        .get_doctor_by_user(auth.id)
        .await?
        .ok_or_else(|| PortalError::NotFound("no doctor profile for this user".to_string()))?;
    Ok(Json(build_profile(state.repo.as_ref(), doctor).await?))
}

/// create_doctor
///
/// [Authenticated Route] Final step of the multi-step doctor form.
///
/// Admins may create a profile for any `user_id`; a Doctor always creates their own.
/// The initial specialization list is reconciled right after the insert and its `SyncReport`
/// is returned in `specialization_sync`.
#[utoipa::path(
    post,
    path = "/doctors",
    request_body = CreateDoctorRequest,
    responses(
        (status = 201, description = "Created", body = DoctorProfile),
        (status = 403, description = "Role not allowed", body = ActionResult),
        (status = 422, description = "Missing required field", body = ActionResult)
    )
)]
pub async fn create_doctor(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<DoctorProfile>), PortalError> {
    auth.require_any(&[Role::Admin, Role::Doctor])?;
    payload.validate()?;

    let owner = if auth.is_admin() {
        payload.user_id.unwrap_or(auth.id)
    } else {
        auth.id
    };

    let doctor = state.repo.create_doctor(owner, &payload).await?;
    tracing::info!(doctor_id = %doctor.id, user_id = %owner, "doctor created");

    let sync = if payload.specializations.is_empty() {
        None
    } else {
        let desired = desired_set(payload.specializations.iter().cloned());
        Some(
            state
                .repo
                .sync_doctor_specializations(doctor.id, &desired)
                .await?,
        )
    };

    let mut profile = build_profile(state.repo.as_ref(), doctor).await?;
    profile.specialization_sync = sync;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// update_doctor
///
/// [Authenticated Route] Partial update. When `specializations` is sent, the mapping is
/// reconciled to exactly that list and the outcome is returned in `specialization_sync`.
#[utoipa::path(
    put,
    path = "/doctors/{id}",
    params(("id" = Uuid, Path, description = "Doctor ID")),
    request_body = UpdateDoctorRequest,
    responses(
        (status = 200, description = "Updated", body = DoctorProfile),
        (status = 403, description = "Not owner or admin", body = ActionResult),
        (status = 404, description = "Not Found", body = ActionResult)
    )
)]
pub async fn update_doctor(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDoctorRequest>,
) -> Result<Json<DoctorProfile>, PortalError> {
    payload.validate()?;
    let existing = load_doctor(state.repo.as_ref(), id).await?;
    authorize_doctor_write(&auth, &existing)?;

    let doctor = state
        .repo
        .update_doctor(id, &payload)
        .await?
        .ok_or_else(|| PortalError::NotFound(format!("doctor {} not found", id)))?;

    let sync = match &payload.specializations {
        Some(names) => {
            let desired = desired_set(names.iter().cloned());
            Some(state.repo.sync_doctor_specializations(id, &desired).await?)
        }
        None => None,
    };

    let mut profile = build_profile(state.repo.as_ref(), doctor).await?;
    profile.specialization_sync = sync;
    Ok(Json(profile))
}

/// delete_doctor
///
/// [Authenticated Route] Removes the profile and everything it owns. The auth user and the
/// shared specializations are untouched.
#[utoipa::path(
    delete,
    path = "/doctors/{id}",
    params(("id" = Uuid, Path, description = "Doctor ID")),
    responses(
        (status = 200, description = "Deleted", body = ActionResult),
        (status = 404, description = "Not Found", body = ActionResult)
    )
)]
pub async fn delete_doctor(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResult>, PortalError> {
    let doctor = load_doctor(state.repo.as_ref(), id).await?;
    authorize_doctor_write(&auth, &doctor)?;
    let deleted = state.repo.delete_doctor(id).await?;
    if deleted {
        tracing::info!(doctor_id = %id, by = %auth.id, "doctor deleted");
    }
    deleted_or_not_found(deleted, "doctor")
}

/// sync_doctor_specializations
///
/// [Authenticated Route] Reconciles the doctor's specializations to the given names.
/// Unknown names are created; names that could not be created are reported in `failed`.
#[utoipa::path(
    put,
    path = "/doctors/{id}/specializations",
    params(("id" = Uuid, Path, description = "Doctor ID")),
    request_body = SyncSpecializationsRequest,
    responses((status = 200, description = "Synced", body = SyncReport))
)]
pub async fn sync_doctor_specializations(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SyncSpecializationsRequest>,
) -> Result<Json<SyncReport>, PortalError> {
    payload.validate()?;
    let doctor = load_doctor(state.repo.as_ref(), id).await?;
    authorize_doctor_write(&auth, &doctor)?;

    let desired = desired_set(payload.names);
    Ok(Json(
        state.repo.sync_doctor_specializations(id, &desired).await?,
    ))
}

/// list_specializations
///
/// [Public Route] The shared specialization catalogue, for form suggestions.
#[utoipa::path(
    get,
    path = "/specializations",
    responses((status = 200, description = "Specializations", body = [Specialization]))
)]
pub async fn list_specializations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Specialization>>, PortalError> {
    Ok(Json(state.repo.list_specializations().await?))
}

// --- Auxiliary Child Records ---

#[utoipa::path(
    post,
    path = "/doctors/{id}/education",
    params(("id" = Uuid, Path, description = "Doctor ID")),
    request_body = NewEducation,
    responses((status = 201, description = "Added", body = Education))
)]
pub async fn add_education(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
    Json(payload): Json<NewEducation>,
) -> Result<(StatusCode, Json<Education>), PortalError> {
    payload.validate()?;
    let doctor = load_doctor(state.repo.as_ref(), doctor_id).await?;
    authorize_doctor_write(&auth, &doctor)?;
    let record = state.repo.add_education(doctor_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    delete,
    path = "/doctors/{id}/education/{record_id}",
    params(
        ("id" = Uuid, Path, description = "Doctor ID"),
        ("record_id" = Uuid, Path, description = "Education record ID")
    ),
    responses(
        (status = 200, description = "Deleted", body = ActionResult),
        (status = 404, description = "Not Found", body = ActionResult)
    )
)]
pub async fn delete_education(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((doctor_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ActionResult>, PortalError> {
    let doctor = load_doctor(state.repo.as_ref(), doctor_id).await?;
    authorize_doctor_write(&auth, &doctor)?;
    let deleted = state.repo.delete_education(record_id, doctor_id).await?;
    deleted_or_not_found(deleted, "education record")
}

#[utoipa::path(
    post,
    path = "/doctors/{id}/certifications",
    params(("id" = Uuid, Path, description = "Doctor ID")),
    request_body = NewCertification,
    responses((status = 201, description = "Added", body = Certification))
)]
pub async fn add_certification(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
    Json(payload): Json<NewCertification>,
) -> Result<(StatusCode, Json<Certification>), PortalError> {
    payload.validate()?;
    let doctor = load_doctor(state.repo.as_ref(), doctor_id).await?;
    authorize_doctor_write(&auth, &doctor)?;
    let record = state.repo.add_certification(doctor_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    delete,
    path = "/doctors/{id}/certifications/{record_id}",
    params(
        ("id" = Uuid, Path, description = "Doctor ID"),
        ("record_id" = Uuid, Path, description = "Certification ID")
    ),
    responses(
        (status = 200, description = "Deleted", body = ActionResult),
        (status = 404, description = "Not Found", body = ActionResult)
    )
)]
pub async fn delete_certification(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((doctor_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ActionResult>, PortalError> {
    let doctor = load_doctor(state.repo.as_ref(), doctor_id).await?;
    authorize_doctor_write(&auth, &doctor)?;
    let deleted = state.repo.delete_certification(record_id, doctor_id).await?;
    deleted_or_not_found(deleted, "certification")
}

#[utoipa::path(
    post,
    path = "/doctors/{id}/availability",
    params(("id" = Uuid, Path, description = "Doctor ID")),
    request_body = NewAvailabilitySlot,
    responses((status = 201, description = "Added", body = AvailabilitySlot))
)]
pub async fn add_availability(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
    Json(payload): Json<NewAvailabilitySlot>,
) -> Result<(StatusCode, Json<AvailabilitySlot>), PortalError> {
    payload.validate()?;
    let doctor = load_doctor(state.repo.as_ref(), doctor_id).await?;
    authorize_doctor_write(&auth, &doctor)?;
    let record = state.repo.add_availability(doctor_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    delete,
    path = "/doctors/{id}/availability/{record_id}",
    params(
        ("id" = Uuid, Path, description = "Doctor ID"),
        ("record_id" = Uuid, Path, description = "Availability slot ID")
    ),
    responses(
        (status = 200, description = "Deleted", body = ActionResult),
        (status = 404, description = "Not Found", body = ActionResult)
    )
)]
pub async fn delete_availability(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((doctor_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ActionResult>, PortalError> {
    let doctor = load_doctor(state.repo.as_ref(), doctor_id).await?;
    authorize_doctor_write(&auth, &doctor)?;
    let deleted = state.repo.delete_availability(record_id, doctor_id).await?;
    deleted_or_not_found(deleted, "availability slot")
}
