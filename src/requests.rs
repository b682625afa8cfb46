//! Cycle de vie des demandes de prise en charge

use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use thiserror::Error;

use crate::models::{
    Decision, InvalidTransition, Request, RequestID, RequestStatus, TimeSlot, Urgency, User,
    UserID,
};

/// Champ obligatoire manquant lors de l'envoi d'une demande
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Décrivez votre besoin d'accompagnement")]
    MissingDescription,
    #[error("Sélectionnez un psychologue")]
    MissingPsychologist,
}

/// Le formulaire rempli par un patient
#[derive(Debug, Clone, Default)]
pub struct RequestForm {
    pub preferred_psychologist: Option<UserID>,
    pub description: String,
    pub urgency: Urgency,
    pub preferred_dates: Vec<NaiveDate>,
    pub preferred_times: Vec<TimeSlot>,
}

impl RequestForm {
    /// Valide le formulaire et construit une demande `Pending` au nom du patient.
    ///
    /// Rien n'est créé si un champ obligatoire manque.
    pub fn submit(self, patient: &User, now: DateTime<Utc>) -> Result<Request, ValidationError> {
        let description = self.description.trim();
        if description.is_empty() {
            return Err(ValidationError::MissingDescription);
        }
        let psychologist = self
            .preferred_psychologist
            .ok_or(ValidationError::MissingPsychologist)?;

        Ok(Request {
            id: RequestID::new(),
            patient_id: patient.id,
            patient_name: patient.name.clone(),
            patient_email: patient.email.clone(),
            patient_phone: patient.phone.clone(),
            preferred_psychologist_id: psychologist,
            description: description.to_owned(),
            urgency: self.urgency,
            preferred_dates: self.preferred_dates,
            preferred_times: self.preferred_times,
            status: RequestStatus::Pending,
            created_at: now,
        })
    }
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl Decision {
    pub fn outcome(&self) -> RequestStatus {
        match self {
            Decision::Accept { .. } => RequestStatus::Accepted,
            Decision::Reject => RequestStatus::Rejected,
        }
    }
}

impl Request {
    /// Applique la décision du psychologue. Seule une demande en attente
    /// peut être décidée, une seule fois.
    pub fn decide(&mut self, decision: &Decision) -> Result<RequestStatus, InvalidTransition> {
        let outcome = decision.outcome();
        if self.status.is_terminal() {
            return Err(InvalidTransition::new(self.status, outcome));
        }

        info!("Demande {} passée à {}", self.id, outcome);
        self.status = outcome;
        Ok(outcome)
    }
}

/// Les demandes séparées en attente / historique, dans l'ordre d'origine
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub pending: Vec<&'a Request>,
    pub history: Vec<&'a Request>,
}

pub fn partition(requests: &[Request]) -> Partition<'_> {
    let (pending, history) = requests
        .iter()
        .partition(|request| request.status == RequestStatus::Pending);

    Partition { pending, history }
}
