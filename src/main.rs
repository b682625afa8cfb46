use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use derive_more::Display;
use dotenv::dotenv;
use inquire::{Confirm, DateSelect, Editor, Password, Select, Text};
use log::info;
use psilua::authorization::Enforcer;
use psilua::config::Config;
use psilua::db::Database;
use psilua::metrics::Dashboard;
use psilua::models::*;
use psilua::requests::{partition, RequestForm};
use psilua::roster::{resolve_patient, resolve_psychologist};
use psilua::services::{RegistrationForm, Service};
use psilua::utils::input_validation::{email_input_validation, password_input_validation};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

type MenuExit = Option<()>;
const MENU_EXIT: MenuExit = None;
const MENU_LOOP: MenuExit = Some(());

/// Représente un menu texte
trait Menu {
    /// Implémente le contenu du menu. La valeur de retour
    /// doit être None si le menu souhaite terminer,
    /// ou Some(()) s'il faut le relancer.
    fn enter(&mut self) -> Result<Option<()>>;

    /// Lance le menu en boucle, en interceptant les erreurs,
    /// sauf si le menu souhaite quitter.
    fn enter_loop(&mut self) {
        while let Some(result) = self.enter().transpose() {
            if let Err(error) = result {
                eprintln!("Erreur: {error}");
            }
        }
    }
}

pub struct App {
    service: Service,
    report_months: u32,
}

impl App {
    pub fn new(service: Service, report_months: u32) -> Self {
        App {
            service,
            report_months,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        println!("Bienvenue sur PsiLua, la mise en relation patients et psychologues.");
        self.enter_loop();
        self.service.save()?;
        Ok(())
    }

    fn register(&mut self) -> Result<()> {
        let name = Text::new("Nom complet:").prompt()?;
        let email = email_input_validation("Email:")?;
        let phone = Text::new("Téléphone:").prompt()?;
        let role = Select::new("Vous êtes:", Role::iter().collect()).prompt()?;

        let (license_id, speciality) = match role {
            Role::Patient => (None, None),
            Role::Psychologist => (
                Some(Text::new("Numéro CRP (ex. 06/123456):").prompt()?),
                Some(Text::new("Spécialité:").prompt()?),
            ),
        };

        let password = password_input_validation(email.as_ref())?;

        self.service.register(
            RegistrationForm {
                name,
                email: email.to_string(),
                phone,
                confirmation: password.clone(),
                password,
                role,
                license_id,
                speciality,
            },
            Utc::now(),
        )?;
        println!("[*] Compte créé, vous pouvez vous connecter.");
        Ok(())
    }
}

impl Menu for App {
    fn enter(&mut self) -> Result<MenuExit> {
        #[derive(EnumIter, Display)]
        enum Choice {
            #[display("Créer un compte")]
            Register,
            #[display("Se connecter")]
            Login,
            #[display("Quitter")]
            Exit,
        }

        let choice = Select::new("Que voulez-vous faire ?", Choice::iter().collect()).prompt()?;

        match choice {
            Choice::Register => {
                self.register()?;
                Ok(MENU_LOOP)
            }
            Choice::Login => {
                let email = email_input_validation("Email: ")?;
                let password = Password::new("Entrez votre mot de passe : ")
                    .without_confirmation()
                    .with_display_mode(inquire::PasswordDisplayMode::Masked)
                    .prompt()?;

                self.service.login(&email, &password)?;
                let user = self.service.current_user()?;

                eprintln!("[*] Bienvenue, {user}.");
                match user.role {
                    Role::Patient => PatientMenu {
                        service: &mut self.service,
                    }
                    .enter_loop(),
                    Role::Psychologist => PsychologistMenu {
                        service: &mut self.service,
                        report_months: self.report_months,
                    }
                    .enter_loop(),
                }
                self.service.logout();
                Ok(MENU_LOOP)
            }
            Choice::Exit => Ok(MENU_EXIT),
        }
    }
}

/// Un psychologue tel que proposé dans la liste de choix
#[derive(Display)]
#[display("{} - CRP {} ({})", _0.name, _1.license_id, _1.speciality)]
struct Listed(User, PsychologistProfile);

/// Une séance avec le nom de l'autre participant
#[derive(Display)]
#[display("{when} - {with} [{status}]")]
struct Line {
    id: AppointmentID,
    when: String,
    with: String,
    status: AppointmentStatus,
}

fn local(date: &DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string()
}

fn when_label(appointment: &Appointment, now: &DateTime<Local>) -> &'static str {
    if appointment.is_today(now) {
        "aujourd'hui"
    } else if appointment.is_upcoming(now) {
        "à venir"
    } else if appointment.is_past(now) {
        "passée"
    } else {
        "terminée"
    }
}

fn parse_slot(input: &str) -> Result<TimeSlot> {
    let (start, end) = input
        .split_once('-')
        .ok_or(anyhow!("Format attendu: HH:MM-HH:MM"))?;
    Ok(TimeSlot {
        start: NaiveTime::parse_from_str(start.trim(), "%H:%M")?,
        end: NaiveTime::parse_from_str(end.trim(), "%H:%M")?,
    })
}

struct PatientMenu<'srv> {
    service: &'srv mut Service,
}

impl PatientMenu<'_> {
    fn request_psychologist(&mut self) -> Result<()> {
        let psychologists: Vec<Listed> = self
            .service
            .psychologists()?
            .into_iter()
            .map(|(user, profile)| Listed(user, profile))
            .collect();

        if psychologists.is_empty() {
            println!("[*] Aucun psychologue n'est inscrit pour le moment");
            return Ok(());
        }

        let Listed(psychologist, _) =
            Select::new("Choisissez un psychologue:", psychologists).prompt()?;
        let description = Editor::new("Décrivez votre situation:").prompt()?;
        let urgency = Select::new("Urgence:", Urgency::iter().collect()).prompt()?;

        let mut preferred_dates: Vec<NaiveDate> = Vec::new();
        while Confirm::new("Ajouter une date souhaitée ?")
            .with_default(false)
            .prompt()?
        {
            preferred_dates.push(DateSelect::new("Date:").prompt()?);
        }

        let mut preferred_times = Vec::new();
        while Confirm::new("Ajouter une plage horaire souhaitée ?")
            .with_default(false)
            .prompt()?
        {
            preferred_times.push(parse_slot(&Text::new("Plage (HH:MM-HH:MM):").prompt()?)?);
        }

        let form = RequestForm {
            preferred_psychologist: Some(psychologist.id),
            description,
            urgency,
            preferred_dates,
            preferred_times,
        };
        self.service.submit_request(form, Utc::now())?;
        println!("[*] Votre demande a été envoyée à {psychologist}");
        Ok(())
    }

    fn show_requests(&self) -> Result<()> {
        let requests = self.service.requests()?;
        if requests.is_empty() {
            println!("[*] Vous n'avez envoyé aucune demande");
        }
        for request in requests {
            println!(
                "{} - {} [{}]\n  {}",
                local(&request.created_at),
                request.urgency,
                request.status,
                request.description
            );
        }
        Ok(())
    }

    fn show_appointments(&self) -> Result<()> {
        let appointments = self.service.appointments()?;
        let profiles: Vec<PsychologistProfile> = self
            .service
            .psychologists()?
            .into_iter()
            .map(|(_, profile)| profile)
            .collect();
        let now = Local::now();

        if appointments.is_empty() {
            println!("[*] Aucune séance prévue");
        }
        for appointment in &appointments {
            println!(
                "{} - {} [{}, {}]",
                local(&appointment.date),
                resolve_psychologist(appointment, &profiles),
                appointment.status,
                when_label(appointment, &now)
            );
        }
        Ok(())
    }
}

impl Menu for PatientMenu<'_> {
    fn enter(&mut self) -> Result<Option<()>> {
        #[derive(EnumIter, Display)]
        enum Choice {
            #[display("Demander un suivi")]
            RequestPsychologist,
            #[display("Mes demandes")]
            MyRequests,
            #[display("Mes séances")]
            MyAppointments,
            #[display("Se déconnecter")]
            Logout,
        }

        let choice = Select::new("Que voulez-vous faire ?", Choice::iter().collect()).prompt()?;
        match choice {
            Choice::RequestPsychologist => self.request_psychologist()?,
            Choice::MyRequests => self.show_requests()?,
            Choice::MyAppointments => self.show_appointments()?,
            Choice::Logout => return Ok(MENU_EXIT),
        };
        Ok(MENU_LOOP)
    }
}

struct PsychologistMenu<'srv> {
    service: &'srv mut Service,
    report_months: u32,
}

impl PsychologistMenu<'_> {
    fn show_dashboard(&self) -> Result<()> {
        let snapshot = self.service.snapshot()?;
        let now = Local::now();
        let dashboard = Dashboard::compute(&snapshot, &now);

        println!(
            "Patients actifs: {}\nSéances aujourd'hui: {}\nRéalisées: {}\nÀ venir: {}\nAnnulées: {}",
            dashboard.active_patients,
            dashboard.today,
            dashboard.completed,
            dashboard.pending,
            dashboard.canceled
        );

        match dashboard.last_session {
            Some(last) => {
                let patient = resolve_patient(last, &snapshot.patients);
                println!("Dernière séance: {} avec {patient}", local(&last.date));
                if let Some(user) = patient.user() {
                    println!("  Contact: {} {}", user.email, user.phone);
                }
            }
            None => println!("Dernière séance: aucune"),
        }

        println!("\nProchaines séances:");
        for appointment in &dashboard.upcoming {
            println!(
                "  {} - {}",
                local(&appointment.date),
                resolve_patient(appointment, &snapshot.patients)
            );
        }

        println!("\nPatients récents:");
        for patient in &dashboard.recent_patients {
            println!("  {} <{}> {}", patient.name, patient.email, patient.phone);
        }
        Ok(())
    }

    fn decide_pending(&mut self) -> Result<()> {
        let requests = self.service.requests()?;
        let pending = partition(&requests).pending;

        if pending.is_empty() {
            println!("[*] Aucune demande en attente");
            return Ok(());
        }

        let Some(request) = Select::new("Choisissez une demande:", pending).prompt_skippable()?
        else {
            return Ok(());
        };

        println!(
            "\n{} - {}\nUrgence: {}\nTéléphone: {}\n\n{}",
            request.patient_name,
            request.patient_email,
            request.urgency,
            request.patient_phone,
            request.description
        );
        for date in &request.preferred_dates {
            println!("Date souhaitée: {}", date.format("%d/%m/%Y"));
        }
        for slot in &request.preferred_times {
            println!("Horaire souhaité: {slot}");
        }

        #[derive(EnumIter, Display)]
        enum Choice {
            #[display("Accepter et planifier la première séance")]
            Accept,
            #[display("Refuser")]
            Reject,
            #[display("Plus tard")]
            Later,
        }

        let decision = match Select::new("Décision:", Choice::iter().collect()).prompt()? {
            Choice::Accept => {
                let day = DateSelect::new("Date de la séance:").prompt()?;
                let time = NaiveTime::parse_from_str(
                    Text::new("Heure (HH:MM):").prompt()?.trim(),
                    "%H:%M",
                )?;
                let date = Local
                    .from_local_datetime(&day.and_time(time))
                    .single()
                    .ok_or(anyhow!("Heure locale ambiguë ou inexistante"))?
                    .with_timezone(&Utc);
                Decision::Accept { date }
            }
            Choice::Reject => Decision::Reject,
            Choice::Later => return Ok(()),
        };

        let id = request.id;
        if let Some(appointment) = self.service.decide_request(id, decision, Utc::now())? {
            info!("Séance {appointment} planifiée depuis l'interface");
            println!("[*] Séance planifiée");
        } else {
            println!("[*] Demande refusée");
        }
        Ok(())
    }

    fn show_history(&self) -> Result<()> {
        let requests = self.service.requests()?;
        for request in partition(&requests).history {
            println!(
                "{} - {} [{}]",
                local(&request.created_at),
                request,
                request.status
            );
        }
        Ok(())
    }

    fn update_appointment(&mut self) -> Result<()> {
        let snapshot = self.service.snapshot()?;
        let lines: Vec<Line> = snapshot
            .appointments
            .iter()
            .filter(|appointment| !appointment.status.is_terminal())
            .map(|appointment| Line {
                id: appointment.id,
                when: local(&appointment.date),
                with: resolve_patient(appointment, &snapshot.patients).to_string(),
                status: appointment.status,
            })
            .collect();

        if lines.is_empty() {
            println!("[*] Aucune séance à mettre à jour");
            return Ok(());
        }

        let Some(line) = Select::new("Choisissez une séance:", lines).prompt_skippable()? else {
            return Ok(());
        };

        let status = Select::new(
            "Nouveau statut:",
            vec![AppointmentStatus::Completed, AppointmentStatus::Canceled],
        )
        .prompt()?;

        match status {
            AppointmentStatus::Completed => self.service.mark_completed(line.id)?,
            _ => self.service.mark_canceled(line.id)?,
        }
        println!("[*] Séance {status}");
        Ok(())
    }

    fn show_report(&self) -> Result<()> {
        let report = self.service.report(&Local::now(), self.report_months)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

impl Menu for PsychologistMenu<'_> {
    fn enter(&mut self) -> Result<Option<()>> {
        #[derive(EnumIter, Display)]
        enum Choice {
            #[display("Tableau de bord")]
            Dashboard,
            #[display("Demandes en attente")]
            Pending,
            #[display("Historique des demandes")]
            History,
            #[display("Mettre à jour une séance")]
            UpdateAppointment,
            #[display("Rapport")]
            Report,
            #[display("Se déconnecter")]
            Logout,
        }

        let choice = Select::new("Que voulez-vous faire ?", Choice::iter().collect()).prompt()?;
        match choice {
            Choice::Dashboard => self.show_dashboard()?,
            Choice::Pending => self.decide_pending()?,
            Choice::History => self.show_history()?,
            Choice::UpdateAppointment => self.update_appointment()?,
            Choice::Report => self.show_report()?,
            Choice::Logout => return Ok(MENU_EXIT),
        };
        Ok(MENU_LOOP)
    }
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Config::from_env()?;

    simple_logging::log_to_file(&config.log_file, config.log_level)?;

    let db = Database::open(config.db_file.clone())?;
    let enforcer = Enforcer::from_files(&config.access_model, &config.access_policy)?;
    App::new(Service::new(db, enforcer), config.report_months).start()
}
