//! Indicateurs du tableau de bord et séries des rapports.
//!
//! Fonctions pures sur un [`Snapshot`] déjà restreint au psychologue;
//! l'instant de référence est toujours passé explicitement.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::models::{Appointment, AppointmentStatus, User, UserID};
use crate::snapshot::Snapshot;

const RECENT_PATIENTS: usize = 5;

fn owned_by(psychologist: UserID) -> impl Fn(&&Appointment) -> bool {
    move |appointment| appointment.psychologist_id == psychologist
}

fn count_status(appointments: &[Appointment], psychologist: UserID, status: AppointmentStatus) -> usize {
    appointments
        .iter()
        .filter(owned_by(psychologist))
        .filter(|appointment| appointment.status == status)
        .count()
}

pub fn today_count<Tz: TimeZone>(
    appointments: &[Appointment],
    psychologist: UserID,
    now: &DateTime<Tz>,
) -> usize {
    appointments
        .iter()
        .filter(owned_by(psychologist))
        .filter(|appointment| appointment.is_today(now))
        .count()
}

pub fn completed_count(appointments: &[Appointment], psychologist: UserID) -> usize {
    count_status(appointments, psychologist, AppointmentStatus::Completed)
}

pub fn canceled_count(appointments: &[Appointment], psychologist: UserID) -> usize {
    count_status(appointments, psychologist, AppointmentStatus::Canceled)
}

/// Séances à venir, tous psychologues confondus.
///
/// Contrairement aux autres compteurs, ce total n'est pas filtré par
/// psychologue; le snapshot est supposé déjà restreint.
pub fn pending_count<Tz: TimeZone>(appointments: &[Appointment], now: &DateTime<Tz>) -> usize {
    appointments
        .iter()
        .filter(|appointment| appointment.is_upcoming(now))
        .count()
}

/// La séance terminée la plus récente; à date égale, le plus grand identifiant
pub fn last_session(appointments: &[Appointment], psychologist: UserID) -> Option<&Appointment> {
    appointments
        .iter()
        .filter(owned_by(psychologist))
        .filter(|appointment| appointment.status == AppointmentStatus::Completed)
        .max_by_key(|appointment| (appointment.date, appointment.id))
}

/// Les séances à venir du psychologue, par date croissante
pub fn upcoming<'a, Tz: TimeZone>(
    appointments: &'a [Appointment],
    psychologist: UserID,
    now: &DateTime<Tz>,
) -> Vec<&'a Appointment> {
    let mut upcoming: Vec<&Appointment> = appointments
        .iter()
        .filter(owned_by(psychologist))
        .filter(|appointment| appointment.is_upcoming(now))
        .collect();
    upcoming.sort_by_key(|appointment| (appointment.date, appointment.id));
    upcoming
}

/// Les derniers inscrits de la liste (ordonnée par inscription), le plus récent d'abord
pub fn recent_patients(patients: &[User]) -> Vec<&User> {
    patients.iter().rev().take(RECENT_PATIENTS).collect()
}

/// Taux de présence en pourcentage arrondi, 0 sans séance terminée ni annulée
pub fn attendance_rate(completed: usize, canceled: usize) -> u8 {
    let total = completed + canceled;
    if total == 0 {
        return 0;
    }
    ((completed * 200 + total) / (total * 2)) as u8
}

/// Les indicateurs du tableau de bord d'un psychologue
#[derive(Debug)]
pub struct Dashboard<'a> {
    pub active_patients: usize,
    pub today: usize,
    pub completed: usize,
    pub pending: usize,
    pub canceled: usize,
    pub last_session: Option<&'a Appointment>,
    pub upcoming: Vec<&'a Appointment>,
    pub recent_patients: Vec<&'a User>,
}

impl<'a> Dashboard<'a> {
    pub fn compute<Tz: TimeZone>(snapshot: &'a Snapshot, now: &DateTime<Tz>) -> Self {
        let psychologist = snapshot.owner;
        let appointments = &snapshot.appointments;

        Dashboard {
            active_patients: snapshot.patients.len(),
            today: today_count(appointments, psychologist, now),
            completed: completed_count(appointments, psychologist),
            pending: pending_count(appointments, now),
            canceled: canceled_count(appointments, psychologist),
            last_session: last_session(appointments, psychologist),
            upcoming: upcoming(appointments, psychologist, now),
            recent_patients: recent_patients(&snapshot.patients),
        }
    }
}

/// Profondeur maximale d'un rapport (cent ans)
pub const MAX_REPORT_MONTHS: u32 = 1200;

/// Un mois calendaire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    fn next(self) -> Self {
        if self.month == 12 {
            YearMonth { year: self.year + 1, month: 1 }
        } else {
            YearMonth { month: self.month + 1, ..self }
        }
    }

    fn back(self, months: u32) -> Self {
        let index = i64::from(self.year) * 12 + i64::from(self.month) - 1 - i64::from(months);
        YearMonth {
            year: i32::try_from(index.div_euclid(12)).unwrap_or(i32::MIN),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Une période de mois consécutifs, bornes incluses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub first: YearMonth,
    pub last: YearMonth,
}

impl ReportWindow {
    /// Les `months` derniers mois, mois de `now` compris, ramenés
    /// entre 1 et `MAX_REPORT_MONTHS`
    pub fn last_months<Tz: TimeZone>(now: &DateTime<Tz>, months: u32) -> Self {
        let last = YearMonth::of(now.date_naive());
        ReportWindow {
            first: last.back(months.clamp(1, MAX_REPORT_MONTHS) - 1),
            last,
        }
    }

    pub fn months(&self) -> impl Iterator<Item = YearMonth> {
        let last = self.last;
        let first = Some(self.first).filter(|first| *first <= last);
        std::iter::successors(first, move |month| {
            Some(month.next()).filter(|next| *next <= last)
        })
    }

    pub fn contains(&self, month: YearMonth) -> bool {
        self.first <= month && month <= self.last
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStats {
    pub active_patients: usize,
    pub total_sessions: usize,
    pub attendance_rate: u8,
    pub risk_alerts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequencyPoint {
    pub month: String,
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusPoint {
    #[serde(rename = "statusLabel")]
    pub status: AppointmentStatus,
    pub count: usize,
}

/// Le rapport d'un psychologue sur une période. Jamais stocké,
/// toujours recalculé à partir du snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub stats: ReportStats,
    pub frequency_data: Vec<FrequencyPoint>,
    pub status_data: Vec<StatusPoint>,
}

impl Report {
    /// Calcule le rapport sur la fenêtre donnée. Les mois sont ceux du
    /// fuseau de `now`; `risk_alerts` est repris tel quel.
    pub fn compute<Tz: TimeZone>(
        snapshot: &Snapshot,
        now: &DateTime<Tz>,
        window: ReportWindow,
        risk_alerts: usize,
    ) -> Self {
        let tz = now.timezone();
        let in_window: Vec<(YearMonth, &Appointment)> = snapshot
            .appointments
            .iter()
            .filter(owned_by(snapshot.owner))
            .map(|appointment| {
                let month = YearMonth::of(appointment.date.with_timezone(&tz).date_naive());
                (month, appointment)
            })
            .filter(|(month, _)| window.contains(*month))
            .collect();

        let frequency_data = window
            .months()
            .map(|month| FrequencyPoint {
                month: month.to_string(),
                sessions: in_window.iter().filter(|(m, _)| *m == month).count(),
            })
            .collect();

        let status_data: Vec<StatusPoint> = AppointmentStatus::iter()
            .map(|status| StatusPoint {
                status,
                count: in_window.iter().filter(|(_, a)| a.status == status).count(),
            })
            .collect();

        let count_of = |status: AppointmentStatus| {
            status_data
                .iter()
                .find(|point| point.status == status)
                .map_or(0, |point| point.count)
        };

        Report {
            stats: ReportStats {
                active_patients: snapshot.patients.len(),
                total_sessions: in_window.len(),
                attendance_rate: attendance_rate(
                    count_of(AppointmentStatus::Completed),
                    count_of(AppointmentStatus::Canceled),
                ),
                risk_alerts,
            },
            frequency_data,
            status_data,
        }
    }
}
