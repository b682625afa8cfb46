//! API d'accès aux demandes et séances, et point d'entrée unique pour le contrôle d'accès.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, TimeZone, Utc};
use futures::executor::block_on;
use log::{info, warn};
use thiserror::Error;

use crate::authorization::{AccessDenied, Enforcer};
use crate::db::{DBError, Database};
use crate::metrics::{Report, ReportWindow};
use crate::models::{
    Appointment, AppointmentID, Decision, PsychologistProfile, Request, RequestID, RequestStatus,
    Role, Urgency, User, UserID,
};
use crate::requests::{RequestForm, ValidationError};
use crate::snapshot::{JoinFailure, Snapshot};
use crate::utils::input_validation::{password_validation, CrpNumber, Email, PasswordRejection};
use crate::utils::password_utils::{hash, verify, HashError};

pub struct Service {
    user: Option<UserID>,
    db: RwLock<Database>,
    enforcer: Enforcer,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),

    #[error(transparent)]
    DBError(#[from] DBError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Unavailable(#[from] JoinFailure),

    #[error("Sauvegarde impossible: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cet utilisateur n'est pas psychologue")]
    NotAPsychologist,

    #[error("Erreur interne de verrouillage")]
    LockPoisoned,
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Mauvais mot de passe ou utilisateur inconnu")]
    InvalidCredentials,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Le nom est obligatoire")]
    MissingName,
    #[error("Adresse email invalide")]
    InvalidEmail,
    #[error(transparent)]
    Password(#[from] PasswordRejection),
    #[error("Numéro CRP invalide (format attendu: 06/123456)")]
    InvalidLicense,
    #[error("La spécialité est obligatoire pour un psychologue")]
    MissingSpeciality,
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Le formulaire d'inscription
#[derive(Debug, Clone)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirmation: String,
    pub role: Role,
    pub license_id: Option<String>,
    pub speciality: Option<String>,
}

impl RegistrationForm {
    fn into_account(
        self,
        now: DateTime<Utc>,
    ) -> Result<(User, Option<PsychologistProfile>), RegistrationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(RegistrationError::MissingName);
        }
        let email = Email::try_from(self.email).map_err(|_| RegistrationError::InvalidEmail)?;
        password_validation(&self.password, &self.confirmation, email.as_ref())?;

        let user = User {
            id: UserID::new(),
            name: name.to_owned(),
            email,
            phone: self.phone.trim().to_owned(),
            role: self.role,
            password: hash(&self.password)?,
            created_at: now,
        };

        let profile = match self.role {
            Role::Patient => None,
            Role::Psychologist => {
                let license_id = self
                    .license_id
                    .and_then(|crp| CrpNumber::try_from(crp).ok())
                    .ok_or(RegistrationError::InvalidLicense)?;
                let speciality = self
                    .speciality
                    .map(|s| s.trim().to_owned())
                    .filter(|s| !s.is_empty())
                    .ok_or(RegistrationError::MissingSpeciality)?;
                Some(PsychologistProfile {
                    user_id: user.id,
                    license_id,
                    speciality,
                })
            }
        };

        Ok((user, profile))
    }
}

/// Nombre de demandes urgentes encore en attente pour le psychologue
pub fn risk_alerts(snapshot: &Snapshot) -> usize {
    snapshot
        .requests
        .iter()
        .filter(|request| request.preferred_psychologist_id == snapshot.owner)
        .filter(|request| request.status == RequestStatus::Pending)
        .filter(|request| request.urgency == Urgency::High)
        .count()
}

impl Service {
    pub fn new(db: Database, enforcer: Enforcer) -> Self {
        Self {
            db: RwLock::new(db),
            user: None,
            enforcer,
        }
    }

    pub fn save(&self) -> Result<(), ServiceError> {
        Ok(self.read_db()?.save()?)
    }

    fn read_db(&self) -> Result<RwLockReadGuard<'_, Database>, ServiceError> {
        self.db.read().map_err(|_| ServiceError::LockPoisoned)
    }

    fn write_db(&self) -> Result<RwLockWriteGuard<'_, Database>, ServiceError> {
        self.db.write().map_err(|_| ServiceError::LockPoisoned)
    }

    /// L'utilisateur connecté, tel qu'enregistré dans la base
    fn subject<'db>(&self, db: &'db Database) -> Result<&'db User, ServiceError> {
        let user = self.user.ok_or(AccessDenied)?;
        db.get_user(user).map_err(|_| ServiceError::AccessDenied(AccessDenied))
    }

    /// Inscrit un nouveau patient ou psychologue
    pub fn register(
        &self,
        form: RegistrationForm,
        now: DateTime<Utc>,
    ) -> Result<UserID, ServiceError> {
        let (user, profile) = form.into_account(now)?;
        let id = user.id;
        let role = user.role;

        self.write_db()?.store_user(user, profile)?;

        info!("Compte {role} créé avec succès: {id}");
        Ok(id)
    }

    /// Vérifie si le mot de passe est correct, et si oui, enregistre
    /// l'utilisateur comme utilisateur courant.
    pub fn login(&mut self, email: &Email, password: &str) -> Result<UserID, LoginError> {
        let db = self.db.read().map_err(|_| LoginError::InvalidCredentials)?;
        let user = db.lookup_email(email);

        if !verify(password, user.map(|u| &u.password)) {
            warn!("Échec de connexion pour {email}");
            return Err(LoginError::InvalidCredentials);
        }
        let id = user.map(|u| u.id).ok_or(LoginError::InvalidCredentials)?;
        drop(db);

        self.user = Some(id);
        Ok(id)
    }

    /// Ferme la session
    pub fn logout(&mut self) {
        self.user = None
    }

    pub fn current_user(&self) -> Result<User, ServiceError> {
        let db = self.read_db()?;
        Ok(self.subject(&db)?.clone())
    }

    /// Les psychologues proposés aux patients
    pub fn psychologists(&self) -> Result<Vec<(User, PsychologistProfile)>, ServiceError> {
        let db = self.read_db()?;
        self.subject(&db)?;
        Ok(db
            .list_psychologists()
            .into_iter()
            .map(|(user, profile)| (user.clone(), profile.clone()))
            .collect())
    }

    /// Envoie une demande de suivi au nom du patient connecté
    pub fn submit_request(
        &self,
        form: RequestForm,
        now: DateTime<Utc>,
    ) -> Result<RequestID, ServiceError> {
        let mut db = self.write_db()?;
        let patient = self.subject(&db)?;
        let request = form.submit(patient, now)?;

        let psychologist = db.get_user(request.preferred_psychologist_id)?;
        if psychologist.role != Role::Psychologist || db.get_profile(psychologist.id).is_none() {
            return Err(ServiceError::NotAPsychologist);
        }

        self.enforcer.with_subject(patient).submit_request(&request)?;

        info!(
            "Demande {} envoyée par {} à {}",
            request.id, request.patient_id, request.preferred_psychologist_id
        );
        Ok(db.store_request(request))
    }

    /// Les demandes visibles par l'utilisateur connecté, par ordre de création
    pub fn requests(&self) -> Result<Vec<Request>, ServiceError> {
        let db = self.read_db()?;
        let subject = self.subject(&db)?;
        let ctx = self.enforcer.with_subject(subject);

        Ok(db
            .requests_of(subject.id)
            .into_iter()
            .filter(|request| ctx.read_request(request).is_ok())
            .collect())
    }

    /// Accepte ou refuse une demande. L'accès à la base est exclusif
    /// pendant toute l'opération.
    pub fn decide_request(
        &self,
        request_id: RequestID,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<Option<AppointmentID>, ServiceError> {
        let mut db = self.write_db()?;
        let subject = self.subject(&db)?;
        let request = db.get_request(request_id)?;

        self.enforcer.with_subject(subject).decide_request(request)?;

        Ok(db.decide_request(request_id, &decision, now)?)
    }

    /// Les séances de l'utilisateur connecté, par date
    pub fn appointments(&self) -> Result<Vec<Appointment>, ServiceError> {
        let db = self.read_db()?;
        let subject = self.subject(&db)?;
        let ctx = self.enforcer.with_subject(subject);

        Ok(db
            .appointments_of(subject.id, subject.role)
            .into_iter()
            .filter(|appointment| ctx.read_appointment(appointment).is_ok())
            .collect())
    }

    fn transition_appointment<F>(&self, id: AppointmentID, apply: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut Database, AppointmentID) -> Result<(), DBError>,
    {
        let mut db = self.write_db()?;
        let subject = self.subject(&db)?;
        let appointment = db.get_appointment(id)?;

        self.enforcer.with_subject(subject).update_appointment(appointment)?;

        Ok(apply(&mut *db, id)?)
    }

    pub fn mark_completed(&self, id: AppointmentID) -> Result<(), ServiceError> {
        self.transition_appointment(id, Database::mark_completed)
    }

    pub fn mark_canceled(&self, id: AppointmentID) -> Result<(), ServiceError> {
        self.transition_appointment(id, Database::mark_canceled)
    }

    /// Charge les séances, patients et demandes du psychologue connecté
    pub fn snapshot(&self) -> Result<Snapshot, ServiceError> {
        let db = self.read_db()?;
        let subject = self.subject(&db)?;
        if subject.role != Role::Psychologist {
            return Err(ServiceError::NotAPsychologist);
        }

        self.enforcer.with_subject(subject).view_metrics(subject)?;

        Ok(block_on(Snapshot::load(&*db, subject.id))?)
    }

    /// Le rapport des `months` derniers mois du psychologue connecté
    pub fn report<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        months: u32,
    ) -> Result<Report, ServiceError> {
        let snapshot = self.snapshot()?;
        let window = ReportWindow::last_months(now, months);
        Ok(Report::compute(&snapshot, now, window, risk_alerts(&snapshot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Dashboard;
    use crate::models::AppointmentStatus;
    use chrono::Duration;

    const PASSWORD: &str = "Lagoa-Pipoca#Quasar-2026";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn create_test_service() -> Service {
        Service::new(Database::default(), Enforcer::load().expect("Error in loading Enforcer"))
    }

    fn create_test_form(name: &str, role: Role) -> RegistrationForm {
        RegistrationForm {
            name: name.to_string(),
            email: format!("{}@psilua.com", name.to_lowercase()),
            phone: "+55 11 90000-0000".to_string(),
            password: PASSWORD.to_string(),
            confirmation: PASSWORD.to_string(),
            role,
            license_id: Some("06/123456".to_string()),
            speciality: Some("Terapia cognitivo-comportamental".to_string()),
        }
    }

    fn login_as(service: &mut Service, name: &str) -> UserID {
        service.logout();
        let email = Email::try_from(format!("{}@psilua.com", name.to_lowercase())).unwrap();
        service.login(&email, PASSWORD).unwrap()
    }

    /// A service with a psychologist "Clara", a patient "Ana", and a pending request from Ana
    fn create_test_world() -> (Service, UserID, UserID, RequestID) {
        let mut service = create_test_service();
        let clara = service.register(create_test_form("Clara", Role::Psychologist), now()).unwrap();
        let ana = service.register(create_test_form("Ana", Role::Patient), now()).unwrap();

        login_as(&mut service, "Ana");
        let form = RequestForm {
            preferred_psychologist: Some(clara),
            description: "Crises de pânico".to_string(),
            urgency: Urgency::High,
            ..Default::default()
        };
        let request = service.submit_request(form, now()).unwrap();

        (service, clara, ana, request)
    }

    #[test]
    fn test_register_validations() {
        let service = create_test_service();

        let mut form = create_test_form("Ana", Role::Patient);
        form.confirmation = "something else".to_string();
        assert!(matches!(
            service.register(form, now()),
            Err(ServiceError::Registration(RegistrationError::Password(PasswordRejection::Mismatch)))
        ));

        let mut form = create_test_form("Ana", Role::Patient);
        form.email = "ana-at-psilua".to_string();
        assert!(matches!(
            service.register(form, now()),
            Err(ServiceError::Registration(RegistrationError::InvalidEmail))
        ));

        let mut form = create_test_form("Clara", Role::Psychologist);
        form.license_id = Some("123".to_string());
        assert!(matches!(
            service.register(form, now()),
            Err(ServiceError::Registration(RegistrationError::InvalidLicense))
        ));

        let mut form = create_test_form("Clara", Role::Psychologist);
        form.speciality = Some("  ".to_string());
        assert!(matches!(
            service.register(form, now()),
            Err(ServiceError::Registration(RegistrationError::MissingSpeciality))
        ));

        // a patient needs no license
        let mut form = create_test_form("Ana", Role::Patient);
        form.license_id = None;
        form.speciality = None;
        assert!(service.register(form, now()).is_ok());

        assert!(matches!(
            service.register(create_test_form("Ana", Role::Patient), now()),
            Err(ServiceError::DBError(DBError::UserAlreadyExists { .. }))
        ));
    }

    #[test]
    fn test_login() {
        let mut service = create_test_service();
        let id = service.register(create_test_form("Ana", Role::Patient), now()).unwrap();
        let email = Email::try_from("ana@psilua.com").unwrap();

        assert!(service.login(&email, "wrong password").is_err());
        assert!(service.current_user().is_err());

        assert_eq!(service.login(&email, PASSWORD).unwrap(), id);
        assert_eq!(service.current_user().unwrap().id, id);

        service.logout();
        assert!(matches!(service.current_user(), Err(ServiceError::AccessDenied(_))));

        let stranger = Email::try_from("nobody@psilua.com").unwrap();
        assert!(service.login(&stranger, PASSWORD).is_err());
    }

    #[test]
    fn test_submit_request_checks() {
        let (mut service, clara, ana, _) = create_test_world();

        let empty = RequestForm {
            preferred_psychologist: Some(clara),
            ..Default::default()
        };
        assert!(matches!(
            service.submit_request(empty, now()),
            Err(ServiceError::Validation(ValidationError::MissingDescription))
        ));

        let to_patient = RequestForm {
            preferred_psychologist: Some(ana),
            description: "Ansiedade".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            service.submit_request(to_patient, now()),
            Err(ServiceError::NotAPsychologist)
        ));

        service.logout();
        let anonymous = RequestForm {
            preferred_psychologist: Some(clara),
            description: "Ansiedade".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            service.submit_request(anonymous, now()),
            Err(ServiceError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_request_lifecycle() {
        let (mut service, clara, ana, request) = create_test_world();

        // the patient cannot decide their own request
        let date = now() + Duration::days(2);
        assert!(matches!(
            service.decide_request(request, Decision::Accept { date }, now()),
            Err(ServiceError::AccessDenied(_))
        ));

        login_as(&mut service, "Clara");
        let appointment = service
            .decide_request(request, Decision::Accept { date }, now())
            .unwrap()
            .expect("accepting must schedule a session");

        assert!(matches!(
            service.decide_request(request, Decision::Reject, now()),
            Err(ServiceError::DBError(DBError::InvalidTransition(_)))
        ));
        assert!(matches!(
            service.decide_request(RequestID::new(), Decision::Reject, now()),
            Err(ServiceError::DBError(DBError::NoSuchRequest(_)))
        ));

        let appointments = service.appointments().unwrap();
        assert_eq!(appointments.len(), 1);
        assert_eq!(appointments[0].id, appointment);
        assert_eq!(appointments[0].psychologist_id, clara);

        login_as(&mut service, "Ana");
        let mine = service.appointments().unwrap();
        assert_eq!(mine[0].patient_id, ana);
        assert_eq!(service.requests().unwrap()[0].status, RequestStatus::Accepted);
        assert!(matches!(service.mark_completed(appointment), Err(ServiceError::AccessDenied(_))));
    }

    #[test]
    fn test_colleague_cannot_decide() {
        let (mut service, _, _, request) = create_test_world();
        service.register(create_test_form("Daniel", Role::Psychologist), now()).unwrap();

        login_as(&mut service, "Daniel");
        assert!(matches!(
            service.decide_request(request, Decision::Reject, now()),
            Err(ServiceError::AccessDenied(_))
        ));
        assert!(service.requests().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_completion_and_cancellation() {
        let (mut service, _, _, request) = create_test_world();
        login_as(&mut service, "Clara");
        let date = now() + Duration::days(1);
        let appointment = service
            .decide_request(request, Decision::Accept { date }, now())
            .unwrap()
            .unwrap();

        let (completed, canceled) = std::thread::scope(|s| {
            let complete = s.spawn(|| service.mark_completed(appointment));
            let cancel = s.spawn(|| service.mark_canceled(appointment));
            (complete.join().unwrap(), cancel.join().unwrap())
        });

        assert!(completed.is_ok() != canceled.is_ok(), "exactly one transition must win");
        let loser = if completed.is_ok() { canceled } else { completed };
        assert!(matches!(loser, Err(ServiceError::DBError(DBError::InvalidTransition(_)))));
    }

    #[test]
    fn test_concurrent_decisions_single_winner() {
        let (mut service, _, _, request) = create_test_world();
        login_as(&mut service, "Clara");
        let date = now() + Duration::days(3);

        let (accepted, rejected) = std::thread::scope(|s| {
            let accept = s.spawn(|| service.decide_request(request, Decision::Accept { date }, now()));
            let reject = s.spawn(|| service.decide_request(request, Decision::Reject, now()));
            (accept.join().unwrap(), reject.join().unwrap())
        });

        assert!(accepted.is_ok() != rejected.is_ok(), "exactly one decision must win");
        let expected_sessions = if accepted.is_ok() { 1 } else { 0 };
        let loser = if accepted.is_ok() { rejected.map(|_| ()) } else { accepted.map(|_| ()) };
        assert!(matches!(loser, Err(ServiceError::DBError(DBError::InvalidTransition(_)))));
        assert_eq!(service.appointments().unwrap().len(), expected_sessions);
    }

    #[test]
    fn test_psychologist_needs_profile() {
        let (mut service, _, _, _) = create_test_world();

        // an account stored with the psychologist role but no profile
        let orphan = User {
            id: UserID::new(),
            name: "Eva".to_string(),
            email: Email::try_from("eva@psilua.com").unwrap(),
            phone: String::new(),
            role: Role::Psychologist,
            password: hash(PASSWORD).unwrap(),
            created_at: now(),
        };
        let orphan_id = orphan.id;
        service.db.write().unwrap().store_user(orphan, None).unwrap();

        login_as(&mut service, "Ana");
        let form = RequestForm {
            preferred_psychologist: Some(orphan_id),
            description: "Insônia".to_string(),
            ..Default::default()
        };
        assert!(matches!(service.submit_request(form, now()), Err(ServiceError::NotAPsychologist)));
    }

    #[test]
    fn test_dashboard_and_report() {
        let (mut service, clara, _, request) = create_test_world();

        // patients have no dashboard
        assert!(matches!(service.snapshot(), Err(ServiceError::NotAPsychologist)));

        login_as(&mut service, "Clara");
        let snapshot = service.snapshot().unwrap();
        assert_eq!(risk_alerts(&snapshot), 1);
        assert!(snapshot.patients.is_empty());

        let date = now() - Duration::days(1);
        let appointment = service
            .decide_request(request, Decision::Accept { date }, now())
            .unwrap()
            .unwrap();
        service.mark_completed(appointment).unwrap();

        let snapshot = service.snapshot().unwrap();
        let dashboard = Dashboard::compute(&snapshot, &now());
        assert_eq!(snapshot.owner, clara);
        assert_eq!(dashboard.active_patients, 1);
        assert_eq!(dashboard.completed, 1);
        assert_eq!(dashboard.last_session.map(|a| a.status), Some(AppointmentStatus::Completed));
        assert_eq!(dashboard.recent_patients[0].name, "Ana");

        let report = service.report(&now(), 6).unwrap();
        assert_eq!(report.frequency_data.len(), 6);
        assert_eq!(report.stats.total_sessions, 1);
        assert_eq!(report.stats.attendance_rate, 100);
        assert_eq!(report.stats.risk_alerts, 0);
    }

    #[test]
    fn test_psychologists_listing() {
        let (service, clara, _, _) = create_test_world();
        let listed = service.psychologists().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0.id, clara);
        assert_eq!(listed[0].1.license_id.to_string(), "06/123456");
    }
}
