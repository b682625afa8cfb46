//! Cycle de vie des séances et prédicats temporels.
//!
//! Les prédicats reçoivent toujours l'instant de référence `now`;
//! le jour calendaire est celui du fuseau de `now`.

use chrono::{DateTime, TimeZone, Utc};
use log::info;

use crate::models::{Appointment, AppointmentID, AppointmentStatus, InvalidTransition, Request};

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AppointmentStatus::Scheduled)
    }
}

impl Appointment {
    /// La séance issue d'une demande acceptée
    pub fn from_request(request: &Request, date: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Appointment {
            id: AppointmentID::new(),
            patient_id: request.patient_id,
            psychologist_id: request.preferred_psychologist_id,
            date,
            status: AppointmentStatus::Scheduled,
            created_at: now,
        }
    }

    fn transition(&mut self, to: AppointmentStatus) -> Result<(), InvalidTransition> {
        if self.status.is_terminal() {
            return Err(InvalidTransition::new(self.status, to));
        }

        info!("Séance {} passée à {}", self.id, to);
        self.status = to;
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<(), InvalidTransition> {
        self.transition(AppointmentStatus::Completed)
    }

    pub fn mark_canceled(&mut self) -> Result<(), InvalidTransition> {
        self.transition(AppointmentStatus::Canceled)
    }

    pub fn is_today<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        self.status == AppointmentStatus::Scheduled
            && self.date.with_timezone(&now.timezone()).date_naive() == now.date_naive()
    }

    pub fn is_upcoming<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        self.status == AppointmentStatus::Scheduled && self.date >= now.with_timezone(&Utc)
    }

    /// Vrai pour toute séance antérieure à `now`, quel que soit son statut
    pub fn is_past<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        self.date < now.with_timezone(&Utc)
    }
}
