//! Stockage des données en mémoire, avec sauvegarde en JSON

use crate::{
    models::{
        Appointment, AppointmentID, Decision, InvalidTransition, PsychologistProfile, Request,
        RequestID, RequestStatus, Role, User, UserID,
    },
    snapshot::DataSource,
    utils::input_validation::Email,
};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    fs::File,
    io::{self, ErrorKind::NotFound},
    path::PathBuf,
};
use thiserror::Error;

#[derive(Serialize, Deserialize, Default)]
pub struct Database {
    #[serde(skip)]
    path: Option<PathBuf>,
    users: HashMap<UserID, User>,
    profiles: HashMap<UserID, PsychologistProfile>,
    requests: HashMap<RequestID, Request>,
    appointments: HashMap<AppointmentID, Appointment>,
}

#[derive(Debug, Error)]
pub enum DBError {
    #[error("Utilisateur inconnu: {0}")]
    InvalidUserID(UserID),
    #[error("Un compte existe déjà pour {email}")]
    UserAlreadyExists { email: Email },
    #[error("Demande introuvable: {0}")]
    NoSuchRequest(RequestID),
    #[error("Séance introuvable: {0}")]
    NoSuchAppointment(AppointmentID),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self, io::Error> {
        match File::open(&path) {
            Ok(f) => {
                let mut db: Self = serde_json::from_reader(f)?;
                db.path = Some(path);
                Ok(db)
            }

            // Fichier non existant, on le crée
            Err(not_found) if not_found.kind() == NotFound => {
                info!("DB file not found, creating new empty DB");
                let mut new_db = Database::default();
                new_db.path = Some(path);

                // Sauvegarde immédiate pour détecter tout de suite un chemin inutilisable
                new_db.save()?;
                Ok(new_db)
            }

            Err(other) => Err(other),
        }
    }

    pub fn save(&self) -> Result<(), io::Error> {
        if let Some(path) = &self.path {
            let file = File::create(path)?;
            serde_json::to_writer_pretty(file, self)?;
        }
        Ok(())
    }

    pub fn get_user(&self, user: UserID) -> Result<&User, DBError> {
        self.users.get(&user).ok_or(DBError::InvalidUserID(user))
    }

    pub fn lookup_email(&self, email: &Email) -> Option<&User> {
        self.users.values().find(|user| &user.email == email)
    }

    /// Enregistre un nouvel utilisateur, et son profil s'il est psychologue
    pub fn store_user(
        &mut self,
        user: User,
        profile: Option<PsychologistProfile>,
    ) -> Result<(), DBError> {
        if self.lookup_email(&user.email).is_some() {
            return Err(DBError::UserAlreadyExists { email: user.email });
        }
        if let Some(profile) = profile {
            self.profiles.insert(profile.user_id, profile);
        }
        self.users.insert(user.id, user);
        Ok(())
    }

    pub fn get_profile(&self, psychologist: UserID) -> Option<&PsychologistProfile> {
        self.profiles.get(&psychologist)
    }

    /// Les psychologues inscrits avec leur profil, par nom
    pub fn list_psychologists(&self) -> Vec<(&User, &PsychologistProfile)> {
        let mut psychologists: Vec<_> = self
            .users
            .values()
            .filter(|user| user.role == Role::Psychologist)
            .filter_map(|user| Some((user, self.profiles.get(&user.id)?)))
            .collect();
        psychologists.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        psychologists
    }

    pub fn get_request(&self, request: RequestID) -> Result<&Request, DBError> {
        self.requests
            .get(&request)
            .ok_or(DBError::NoSuchRequest(request))
    }

    pub fn store_request(&mut self, request: Request) -> RequestID {
        let id = request.id;
        self.requests.insert(id, request);
        id
    }

    /// Décide d'une demande en attente. Une acceptation crée la séance
    /// correspondante dans la même opération.
    pub fn decide_request(
        &mut self,
        request_id: RequestID,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<Option<AppointmentID>, DBError> {
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or(DBError::NoSuchRequest(request_id))?;

        request.decide(decision)?;

        let Decision::Accept { date } = *decision else {
            return Ok(None);
        };

        let appointment = Appointment::from_request(request, date, now);
        let id = appointment.id;
        info!("Séance {id} créée pour la demande {request_id}");
        self.appointments.insert(id, appointment);
        Ok(Some(id))
    }

    pub fn get_appointment(&self, appointment: AppointmentID) -> Result<&Appointment, DBError> {
        self.appointments
            .get(&appointment)
            .ok_or(DBError::NoSuchAppointment(appointment))
    }

    fn get_appointment_mut(&mut self, appointment: AppointmentID) -> Result<&mut Appointment, DBError> {
        self.appointments
            .get_mut(&appointment)
            .ok_or(DBError::NoSuchAppointment(appointment))
    }

    pub fn mark_completed(&mut self, appointment: AppointmentID) -> Result<(), DBError> {
        Ok(self.get_appointment_mut(appointment)?.mark_completed()?)
    }

    pub fn mark_canceled(&mut self, appointment: AppointmentID) -> Result<(), DBError> {
        Ok(self.get_appointment_mut(appointment)?.mark_canceled()?)
    }

    pub fn appointments_of(&self, owner: UserID, role: Role) -> Vec<Appointment> {
        let mut appointments: Vec<Appointment> = self
            .appointments
            .values()
            .filter(|appointment| match role {
                Role::Patient => appointment.patient_id == owner,
                Role::Psychologist => appointment.psychologist_id == owner,
            })
            .cloned()
            .collect();
        appointments.sort_by_key(|appointment| (appointment.date, appointment.id));
        appointments
    }

    /// Les patients dont une demande a été acceptée par le psychologue,
    /// par ordre d'inscription
    pub fn patients_of(&self, psychologist: UserID) -> Vec<User> {
        let accepted: BTreeSet<UserID> = self
            .requests
            .values()
            .filter(|request| request.preferred_psychologist_id == psychologist)
            .filter(|request| request.status == RequestStatus::Accepted)
            .map(|request| request.patient_id)
            .collect();

        let mut patients: Vec<User> = accepted
            .into_iter()
            .filter_map(|id| self.users.get(&id).cloned())
            .collect();
        patients.sort_by_key(|patient| (patient.created_at, patient.id));
        patients
    }

    pub fn requests_of(&self, owner: UserID) -> Vec<Request> {
        let mut requests: Vec<Request> = self
            .requests
            .values()
            .filter(|request| {
                request.patient_id == owner || request.preferred_psychologist_id == owner
            })
            .cloned()
            .collect();
        requests.sort_by_key(|request| (request.created_at, request.id));
        requests
    }
}

impl DataSource for Database {
    type Error = DBError;

    async fn list_appointments(&self, owner: UserID, role: Role)
        -> Result<Vec<Appointment>, DBError> {
        self.get_user(owner)?;
        Ok(self.appointments_of(owner, role))
    }

    async fn list_patients(&self, psychologist: UserID) -> Result<Vec<User>, DBError> {
        self.get_user(psychologist)?;
        Ok(self.patients_of(psychologist))
    }

    async fn list_requests(&self, owner: UserID) -> Result<Vec<Request>, DBError> {
        self.get_user(owner)?;
        Ok(self.requests_of(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, Urgency};
    use crate::requests::RequestForm;
    use crate::snapshot::Snapshot;
    use crate::utils::input_validation::CrpNumber;
    use crate::utils::password_utils::hash;
    use chrono::{Duration, TimeZone};
    use futures::executor::block_on;
    use std::sync::RwLock;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    /// Creates a test user with the given role and email
    fn create_test_user(role: Role, name: &str, joined: DateTime<Utc>) -> User {
        User {
            id: UserID::new(),
            name: name.to_string(),
            email: Email::try_from(format!("{}@psilua.com", name.to_lowercase())).unwrap(),
            phone: "+55 21 99876-5432".to_string(),
            role,
            password: hash("password123").unwrap(),
            created_at: joined,
        }
    }

    fn create_test_profile(user: &User) -> PsychologistProfile {
        PsychologistProfile {
            user_id: user.id,
            license_id: CrpNumber::try_from("05/54321").unwrap(),
            speciality: "Psicanálise".to_string(),
        }
    }

    /// A database with one psychologist and one pending request from `patient`
    fn create_test_db() -> (Database, User, User, RequestID) {
        let mut db = Database::default();
        let psychologist = create_test_user(Role::Psychologist, "Clara", now() - Duration::days(90));
        let patient = create_test_user(Role::Patient, "Ana", now() - Duration::days(30));

        db.store_user(psychologist.clone(), Some(create_test_profile(&psychologist))).unwrap();
        db.store_user(patient.clone(), None).unwrap();

        let request = RequestForm {
            preferred_psychologist: Some(psychologist.id),
            description: "Insônia".to_string(),
            urgency: Urgency::High,
            ..Default::default()
        }
        .submit(&patient, now())
        .unwrap();
        let request_id = db.store_request(request);

        (db, psychologist, patient, request_id)
    }

    #[test]
    fn test_email_is_unique() {
        let (mut db, _, patient, _) = create_test_db();
        let mut twin = create_test_user(Role::Patient, "Ana", now());
        twin.email = patient.email.clone();

        assert!(matches!(
            db.store_user(twin, None),
            Err(DBError::UserAlreadyExists { .. })
        ));
    }

    #[test]
    fn test_accept_creates_one_appointment() {
        let (mut db, psychologist, patient, request_id) = create_test_db();
        let date = now() + Duration::days(3);

        let appointment_id = db
            .decide_request(request_id, &Decision::Accept { date }, now())
            .unwrap()
            .expect("accepting must schedule a session");

        let appointment = db.get_appointment(appointment_id).unwrap();
        assert_eq!(appointment.patient_id, patient.id);
        assert_eq!(appointment.psychologist_id, psychologist.id);
        assert_eq!(appointment.date, date);
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        assert_eq!(db.get_request(request_id).unwrap().status, RequestStatus::Accepted);

        let second = db.decide_request(request_id, &Decision::Reject, now());
        assert!(matches!(second, Err(DBError::InvalidTransition(_))));
        assert_eq!(db.appointments_of(psychologist.id, Role::Psychologist).len(), 1);
    }

    #[test]
    fn test_reject_creates_nothing() {
        let (mut db, psychologist, _, request_id) = create_test_db();

        assert_eq!(db.decide_request(request_id, &Decision::Reject, now()).unwrap(), None);
        assert!(db.appointments_of(psychologist.id, Role::Psychologist).is_empty());
        assert!(db.patients_of(psychologist.id).is_empty());
    }

    #[test]
    fn test_unknown_ids() {
        let (mut db, _, _, _) = create_test_db();

        assert!(matches!(
            db.decide_request(RequestID::new(), &Decision::Reject, now()),
            Err(DBError::NoSuchRequest(_))
        ));
        assert!(matches!(
            db.mark_completed(AppointmentID::new()),
            Err(DBError::NoSuchAppointment(_))
        ));
        assert!(matches!(
            db.mark_canceled(AppointmentID::new()),
            Err(DBError::NoSuchAppointment(_))
        ));
    }

    #[test]
    fn test_appointment_transitions_are_final() {
        let (mut db, _, _, request_id) = create_test_db();
        let date = now() + Duration::days(1);
        let id = db
            .decide_request(request_id, &Decision::Accept { date }, now())
            .unwrap()
            .unwrap();

        db.mark_canceled(id).unwrap();
        assert!(matches!(db.mark_completed(id), Err(DBError::InvalidTransition(_))));
        assert!(matches!(db.mark_canceled(id), Err(DBError::InvalidTransition(_))));
        assert_eq!(db.get_appointment(id).unwrap().status, AppointmentStatus::Canceled);
    }

    #[test]
    fn test_concurrent_transitions_single_winner() {
        let (mut db, _, _, request_id) = create_test_db();
        let date = now() + Duration::days(1);
        let id = db
            .decide_request(request_id, &Decision::Accept { date }, now())
            .unwrap()
            .unwrap();
        let db = RwLock::new(db);

        let (completed, canceled) = std::thread::scope(|s| {
            let complete = s.spawn(|| db.write().unwrap().mark_completed(id));
            let cancel = s.spawn(|| db.write().unwrap().mark_canceled(id));
            (complete.join().unwrap(), cancel.join().unwrap())
        });

        assert!(completed.is_ok() != canceled.is_ok(), "exactly one transition must win");
        let loser = if completed.is_ok() { canceled } else { completed };
        assert!(matches!(loser, Err(DBError::InvalidTransition(_))));
    }

    #[test]
    fn test_roster_in_registration_order() {
        let (mut db, psychologist, first, request_id) = create_test_db();
        let date = now() + Duration::days(1);
        db.decide_request(request_id, &Decision::Accept { date }, now()).unwrap();

        let second = create_test_user(Role::Patient, "Bruno", now() - Duration::days(5));
        db.store_user(second.clone(), None).unwrap();
        let request = RequestForm {
            preferred_psychologist: Some(psychologist.id),
            description: "Luto".to_string(),
            ..Default::default()
        }
        .submit(&second, now())
        .unwrap();
        let request_id = db.store_request(request);
        db.decide_request(request_id, &Decision::Accept { date }, now()).unwrap();

        let roster: Vec<UserID> = db.patients_of(psychologist.id).iter().map(|p| p.id).collect();
        assert_eq!(roster, vec![first.id, second.id]);
    }

    #[test]
    fn test_requests_visible_to_both_parties() {
        let (db, psychologist, patient, request_id) = create_test_db();
        let stranger = create_test_user(Role::Patient, "Carla", now());

        assert_eq!(db.requests_of(patient.id)[0].id, request_id);
        assert_eq!(db.requests_of(psychologist.id)[0].id, request_id);
        assert!(db.requests_of(stranger.id).is_empty());
    }

    #[test]
    fn test_snapshot_from_database() {
        let (mut db, psychologist, patient, request_id) = create_test_db();
        let date = now() + Duration::days(1);
        db.decide_request(request_id, &Decision::Accept { date }, now()).unwrap();

        let snapshot = block_on(Snapshot::load(&db, psychologist.id)).unwrap();
        assert_eq!(snapshot.appointments.len(), 1);
        assert_eq!(snapshot.patients[0].id, patient.id);
        assert_eq!(snapshot.requests.len(), 1);

        assert!(block_on(Snapshot::load(&db, UserID::new())).is_err());
    }

    #[test]
    fn test_list_psychologists() {
        let (db, psychologist, _, _) = create_test_db();
        let listed = db.list_psychologists();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0.id, psychologist.id);
        assert_eq!(listed[0].1.speciality, "Psicanálise");
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");

        let (mut db, psychologist, _, request_id) = create_test_db();
        db.path = Some(path.clone());
        db.save().unwrap();

        let reopened = Database::open(path).unwrap();
        assert_eq!(reopened.get_request(request_id).unwrap().status, RequestStatus::Pending);
        assert!(reopened.get_profile(psychologist.id).is_some());
    }

    #[test]
    fn test_open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.json");

        let db = Database::open(path.clone()).unwrap();
        assert!(path.exists());
        assert!(db.list_psychologists().is_empty());
    }
}
