use axum::{extract::State, Json};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    error::Error,
    store::{AppointmentCollection, UserCollection},
    util::{now, FormattedDateTime, JsonBody, ObjectIdString, PathObjectId},
};

use super::{
    session::{RequireAdmin, RequirePatient},
    user::{Role, UserModel},
    MessageResponse,
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
        }
    }

    /// Parses a status an admin may set. `Pending` is only ever the initial
    /// state.
    pub fn parse_decision(value: &str) -> Result<Self, Error> {
        match value {
            "Accepted" => Ok(Self::Accepted),
            "Rejected" => Ok(Self::Rejected),
            other => Err(Error::InvalidInput(format!(
                "Invalid status {other:?}, expected Accepted or Rejected"
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSnapshot {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppointmentModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub patient_id: ObjectId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,

    pub doctor_id: ObjectId,
    pub doctor: DoctorSnapshot,
    pub department: String,

    pub appointment_date: bson::DateTime,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub has_visited: bool,

    pub status: AppointmentStatus,
    pub created_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: ObjectIdString,

    pub patient_id: ObjectIdString,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,

    pub doctor_id: ObjectIdString,
    pub doctor: DoctorSnapshot,
    pub department: String,

    pub appointment_date: FormattedDateTime,
    pub reason: Option<String>,
    pub address: Option<String>,
    pub has_visited: bool,

    pub status: AppointmentStatus,
    pub created_at: FormattedDateTime,
}

impl From<AppointmentModel> for Appointment {
    fn from(value: AppointmentModel) -> Self {
        Self {
            id: value.id.into(),
            patient_id: value.patient_id.into(),
            first_name: value.first_name,
            last_name: value.last_name,
            email: value.email,
            phone: value.phone,
            doctor_id: value.doctor_id.into(),
            doctor: value.doctor,
            department: value.department,
            appointment_date: value.appointment_date.into(),
            reason: value.reason,
            address: value.address,
            has_visited: value.has_visited,
            status: value.status,
            created_at: value.created_at.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AppointmentResponse {
    pub success: bool,
    pub message: String,
    pub appointment: Appointment,
}

impl AppointmentResponse {
    fn new(message: &str, appointment: AppointmentModel) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            appointment: appointment.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AppointmentList {
    pub success: bool,
    pub appointments: Vec<Appointment>,
}

/// The doctor is picked either by id or by name and department.
#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BookRequest {
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub doctor_first_name: Option<String>,
    #[serde(default)]
    pub doctor_last_name: Option<String>,
    #[serde(default)]
    pub department: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub appointment_date: OffsetDateTime,

    #[validate(length(max = 500))]
    #[serde(default)]
    pub reason: Option<String>,

    #[validate(length(max = 200))]
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub has_visited: bool,
}

async fn resolve_doctor(users: &UserCollection, request: &BookRequest) -> Result<UserModel, Error> {
    if let Some(id) = &request.doctor_id {
        let id = id
            .parse::<ObjectId>()
            .map_err(|_| Error::NotFound("doctor"))?;

        return users
            .find_by_id(id)
            .await?
            .filter(|it| it.role == Role::Doctor)
            .ok_or(Error::NotFound("doctor"));
    }

    let (Some(first_name), Some(last_name), Some(department)) = (
        &request.doctor_first_name,
        &request.doctor_last_name,
        &request.department,
    ) else {
        return Err(Error::InvalidInput(
            "Either doctorId or doctorFirstName, doctorLastName and department are required"
                .to_string(),
        ));
    };

    let mut doctors = users
        .find_doctors_by_name(first_name, last_name, department)
        .await?;

    match doctors.len() {
        0 => Err(Error::NotFound("doctor")),
        1 => Ok(doctors.remove(0)),
        _ => Err(Error::Conflict(
            "More than one doctor matches, select the doctor by id".to_string(),
        )),
    }
}

pub async fn book(
    users: &UserCollection,
    appointments: &AppointmentCollection,
    patient: UserModel,
    request: BookRequest,
) -> Result<AppointmentModel, Error> {
    request.validate()?;

    let doctor = resolve_doctor(users, &request)
        .await
        .tap_err(|err| tracing::debug!("doctor selection failed: {}", err))?;

    let model = AppointmentModel {
        id: ObjectId::new(),

        patient_id: patient.id,
        first_name: patient.first_name,
        last_name: patient.last_name,
        email: patient.email,
        phone: patient.phone,

        doctor_id: doctor.id,
        doctor: DoctorSnapshot {
            first_name: doctor.first_name,
            last_name: doctor.last_name,
        },
        department: doctor
            .doctor_department
            .or(request.department)
            .unwrap_or_default(),

        appointment_date: request.appointment_date.into(),
        reason: request.reason,
        address: request.address,
        has_visited: request.has_visited,

        status: AppointmentStatus::Pending,
        created_at: now(),
    };
    appointments.insert(&model).await?;

    Ok(model)
}

#[tracing::instrument(skip_all, fields(patient = %patient.id))]
pub async fn book_appointment(
    State(users): State<UserCollection>,
    State(appointments): State<AppointmentCollection>,
    RequirePatient(patient): RequirePatient,
    JsonBody(request): JsonBody<BookRequest>,
) -> Result<Json<AppointmentResponse>, Error> {
    let model = book(&users, &appointments, patient, request).await?;
    tracing::debug!("booked appointment {}", model.id);

    Ok(Json(AppointmentResponse::new("Appointment sent", model)))
}

pub async fn list_appointments(
    State(appointments): State<AppointmentCollection>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<AppointmentList>, Error> {
    let appointments = appointments.find_all().await?;

    Ok(Json(AppointmentList {
        success: true,
        appointments: appointments.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[tracing::instrument(skip_all, fields(id = %id, admin = %admin.id))]
pub async fn update_status(
    State(appointments): State<AppointmentCollection>,
    RequireAdmin(admin): RequireAdmin,
    PathObjectId(id): PathObjectId,
    JsonBody(request): JsonBody<UpdateStatusRequest>,
) -> Result<Json<AppointmentResponse>, Error> {
    let status = AppointmentStatus::parse_decision(&request.status)?;

    let model = appointments
        .update_status(id, status)
        .await?
        .ok_or(Error::NotFound("appointment"))?;

    Ok(Json(AppointmentResponse::new("Appointment status updated", model)))
}

#[tracing::instrument(skip_all, fields(id = %id, admin = %admin.id))]
pub async fn delete_appointment(
    State(appointments): State<AppointmentCollection>,
    RequireAdmin(admin): RequireAdmin,
    PathObjectId(id): PathObjectId,
) -> Result<Json<MessageResponse>, Error> {
    if !appointments.delete(id).await? {
        return Err(Error::NotFound("appointment"));
    }

    Ok(Json(MessageResponse::new("Appointment deleted")))
}
