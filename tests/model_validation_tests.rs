use axum::{http::StatusCode, response::IntoResponse};
use care_portal::{
    PortalError,
    models::{
        ActionResult, CreateDoctorRequest, NewAvailabilitySlot, NewCertification, NewEducation,
        SignInRequest, SyncSpecializationsRequest, UpdateDoctorRequest,
    },
};
use chrono::{NaiveDate, NaiveTime};

fn valid_doctor() -> CreateDoctorRequest {
    CreateDoctorRequest {
        first_name: "Allison".to_string(),
        last_name: "Cameron".to_string(),
        license_number: "IMM-3".to_string(),
        consultation_fee: 75.5,
        ..Default::default()
    }
}

// --- Request Validation ---

#[test]
fn test_create_doctor_required_fields() {
    assert!(valid_doctor().validate().is_ok());

    let mut missing_name = valid_doctor();
    missing_name.first_name = "   ".to_string();
    assert_eq!(
        missing_name.validate(),
        Err(PortalError::Validation("first_name is required".to_string()))
    );

    let mut negative_fee = valid_doctor();
    negative_fee.consultation_fee = -1.0;
    assert!(negative_fee.validate().is_err());

    let mut negative_years = valid_doctor();
    negative_years.years_of_experience = Some(-2);
    assert!(negative_years.validate().is_err());

    let mut blank_specialization = valid_doctor();
    blank_specialization.specializations = vec!["Cardiology".to_string(), "".to_string()];
    assert!(blank_specialization.validate().is_err());
}

#[test]
fn test_update_doctor_allows_absent_but_not_blank() {
    assert!(UpdateDoctorRequest::default().validate().is_ok());

    let blank_license = UpdateDoctorRequest {
        license_number: Some(String::new()),
        ..Default::default()
    };
    assert!(blank_license.validate().is_err());

    let clear_specializations = UpdateDoctorRequest {
        specializations: Some(vec![]),
        ..Default::default()
    };
    assert!(clear_specializations.validate().is_ok());
}

#[test]
fn test_sign_in_requires_both_fields() {
    let missing_password = SignInRequest {
        email: "a@b.c".to_string(),
        password: String::new(),
    };
    assert_eq!(
        missing_password.validate(),
        Err(PortalError::Validation("password is required".to_string()))
    );
}

#[test]
fn test_sync_request_rejects_whitespace_names() {
    let request = SyncSpecializationsRequest {
        names: vec!["\t".to_string()],
    };
    assert!(request.validate().is_err());
}

#[test]
fn test_child_record_validation() {
    let education = NewEducation {
        degree: "MD".to_string(),
        institution: "Harvard".to_string(),
        graduation_year: Some(1850),
    };
    assert!(education.validate().is_err());

    let certification = NewCertification {
        name: "Board Certified".to_string(),
        issuing_body: "ABIM".to_string(),
        issue_date: NaiveDate::from_ymd_opt(2020, 1, 1),
        expiry_date: NaiveDate::from_ymd_opt(2019, 1, 1),
    };
    assert!(certification.validate().is_err());

    let inverted_slot = NewAvailabilitySlot {
        day_of_week: 2,
        start_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    };
    assert!(inverted_slot.validate().is_err());

    let bad_day = NewAvailabilitySlot {
        day_of_week: 7,
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
    };
    assert!(bad_day.validate().is_err());
}

// --- Serialization ---

#[test]
fn test_create_doctor_request_defaults_optional_fields() {
    let parsed: CreateDoctorRequest = serde_json::from_str(
        r#"{"first_name":"A","last_name":"B","license_number":"C"}"#,
    )
    .unwrap();
    assert_eq!(parsed.consultation_fee, 0.0);
    assert!(parsed.specializations.is_empty());
    assert!(parsed.user_id.is_none());
}

#[test]
fn test_action_result_omits_absent_error() {
    assert_eq!(
        serde_json::to_string(&ActionResult::ok()).unwrap(),
        r#"{"success":true}"#
    );
    assert_eq!(
        serde_json::to_string(&ActionResult::failure("nope")).unwrap(),
        r#"{"success":false,"error":"nope"}"#
    );
}

// --- Error Mapping ---

#[test]
fn test_error_statuses() {
    assert_eq!(
        PortalError::Auth("x".into()).status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        PortalError::Forbidden("x".into()).status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        PortalError::NotFound("x".into()).status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        PortalError::Validation("x".into()).status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        PortalError::Backend("x".into()).into_response().status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn test_backend_detail_is_not_exposed() {
    let err = PortalError::Backend("connection refused at 10.0.0.3".to_string());
    assert!(!err.public_message().contains("10.0.0.3"));

    let err = PortalError::NotFound("doctor not found".to_string());
    assert_eq!(err.public_message(), "doctor not found");
}

#[test]
fn test_row_not_found_maps_to_not_found() {
    let err: PortalError = sqlx::Error::RowNotFound.into();
    assert!(matches!(err, PortalError::NotFound(_)));
}
