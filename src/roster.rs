//! Résolution des références patient / psychologue pour l'affichage.
//!
//! Une référence absente n'est pas une erreur: les données peuvent
//! arriver dans le désordre, elle est alors affichée comme inconnue.

use std::fmt;

use crate::models::{Appointment, PsychologistProfile, User, UserID};

/// Le patient d'une séance, s'il figure dans la liste fournie
#[derive(Debug, Clone, Copy)]
pub enum PatientRef<'a> {
    Resolved(&'a User),
    Unresolved(UserID),
}

impl<'a> PatientRef<'a> {
    pub fn user(&self) -> Option<&'a User> {
        match self {
            PatientRef::Resolved(user) => Some(user),
            PatientRef::Unresolved(_) => None,
        }
    }
}

impl fmt::Display for PatientRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatientRef::Resolved(user) => write!(f, "{}", user.name),
            PatientRef::Unresolved(_) => f.write_str("Patient inconnu"),
        }
    }
}

pub fn resolve_patient<'a>(appointment: &Appointment, patients: &'a [User]) -> PatientRef<'a> {
    patients
        .iter()
        .find(|patient| patient.id == appointment.patient_id)
        .map_or(PatientRef::Unresolved(appointment.patient_id), PatientRef::Resolved)
}

/// Le profil du psychologue d'une séance
#[derive(Debug, Clone, Copy)]
pub enum PsychologistRef<'a> {
    Resolved(&'a PsychologistProfile),
    Unresolved(UserID),
}

impl fmt::Display for PsychologistRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PsychologistRef::Resolved(profile) => {
                write!(f, "CRP {} ({})", profile.license_id, profile.speciality)
            }
            PsychologistRef::Unresolved(_) => f.write_str("Psychologue inconnu"),
        }
    }
}

pub fn resolve_psychologist<'a>(
    appointment: &Appointment,
    profiles: &'a [PsychologistProfile],
) -> PsychologistRef<'a> {
    profiles
        .iter()
        .find(|profile| profile.user_id == appointment.psychologist_id)
        .map_or(
            PsychologistRef::Unresolved(appointment.psychologist_id),
            PsychologistRef::Resolved,
        )
}
