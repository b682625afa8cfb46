//! Modèle de données

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;
use thiserror::Error;
use uuid::Uuid;

use crate::utils::input_validation::{CrpNumber, Email};
use crate::utils::password_utils::PWHash;

/// Role d'un utilisateur: Patient ou Psychologue
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display,
)]
pub enum Role {
    #[display("Patient")]
    Patient,
    #[display("Psychologue")]
    Psychologist,
}

/// Un identifiant unique d'utilisateur.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Display,
)]
pub struct UserID(Uuid);

impl UserID {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Un identifiant unique de demande de prise en charge
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Display,
)]
pub struct RequestID(Uuid);

impl RequestID {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Un identifiant unique de séance
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Display,
)]
pub struct AppointmentID(Uuid);

impl AppointmentID {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Un utilisateur inscrit, patient ou psychologue.
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Display)]
#[display("{name}")]
pub struct User {
    pub id: UserID,
    pub name: String,
    pub email: Email,
    pub phone: String,
    pub role: Role,
    pub password: PWHash,
    pub created_at: DateTime<Utc>,
}

/// Le profil professionnel d'un psychologue
#[derive(Debug, Clone, Serialize, Deserialize, Hash)]
pub struct PsychologistProfile {
    pub user_id: UserID,
    pub license_id: CrpNumber,
    pub speciality: String,
}

/// Niveau d'urgence déclaré par le patient
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[display("Basse - je peux attendre")]
    Low,
    #[default]
    #[display("Moyenne - de préférence bientôt")]
    Medium,
    #[display("Haute - j'ai besoin d'aide rapidement")]
    High,
}

/// Une plage horaire souhaitée par le patient
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[display("{start}-{end}")]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[display("pending")]
    Pending,
    #[display("accepted")]
    Accepted,
    #[display("rejected")]
    Rejected,
}

/// La demande d'un patient d'être suivi par un psychologue donné.
///
/// Une demande est créée `Pending` et n'en sort qu'une seule fois,
/// vers `Accepted` ou `Rejected`. Elle n'est jamais supprimée.
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Display)]
#[display("{patient_name} <{patient_email}>")]
pub struct Request {
    pub id: RequestID,
    pub patient_id: UserID,
    pub patient_name: String,
    pub patient_email: Email,
    pub patient_phone: String,
    pub preferred_psychologist_id: UserID,
    pub description: String,
    pub urgency: Urgency,
    pub preferred_dates: Vec<NaiveDate>,
    pub preferred_times: Vec<TimeSlot>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// La réponse d'un psychologue à une demande.
///
/// Accepter fixe la date de la première séance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept { date: DateTime<Utc> },
    Reject,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[display("scheduled")]
    Scheduled,
    #[display("completed")]
    Completed,
    #[display("canceled")]
    Canceled,
}

/// Une séance entre un patient et un psychologue
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Display)]
#[display("{date} ({status})")]
pub struct Appointment {
    pub id: AppointmentID,
    pub patient_id: UserID,
    pub psychologist_id: UserID,
    pub date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Transition refusée depuis un état terminal
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Transition impossible de {from} vers {to}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
}

impl InvalidTransition {
    pub fn new(from: impl ToString, to: impl ToString) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
