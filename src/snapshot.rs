//! Point de jonction des trois chargements d'un tableau de bord.
//!
//! Les séances, patients et demandes sont demandés en parallèle;
//! le snapshot n'existe que si les trois ont abouti.

use std::error::Error as StdError;

use log::{error, info};
use thiserror::Error;

use crate::models::{Appointment, Request, Role, User, UserID};

/// Accès aux données consommé par le noyau
#[allow(async_fn_in_trait)]
pub trait DataSource {
    type Error: StdError + Send + Sync + 'static;

    /// Les séances dont `owner` est le patient ou le psychologue, selon `role`
    async fn list_appointments(&self, owner: UserID, role: Role)
        -> Result<Vec<Appointment>, Self::Error>;

    /// Les patients suivis par le psychologue, par ordre d'inscription
    async fn list_patients(&self, psychologist: UserID) -> Result<Vec<User>, Self::Error>;

    /// Les demandes émises ou reçues par `owner`, par ordre de création
    async fn list_requests(&self, owner: UserID) -> Result<Vec<Request>, Self::Error>;
}

/// Un des chargements a échoué, aucun indicateur n'est publié
#[derive(Debug, Error)]
#[error("Données indisponibles, veuillez réessayer")]
pub struct JoinFailure(#[source] Box<dyn StdError + Send + Sync>);

/// Copie figée des données d'un psychologue
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub owner: UserID,
    pub appointments: Vec<Appointment>,
    pub patients: Vec<User>,
    pub requests: Vec<Request>,
}

impl Snapshot {
    pub async fn load<S: DataSource>(source: &S, psychologist: UserID) -> Result<Self, JoinFailure> {
        let joined = futures::try_join!(
            source.list_appointments(psychologist, Role::Psychologist),
            source.list_patients(psychologist),
            source.list_requests(psychologist),
        );

        match joined {
            Ok((appointments, patients, requests)) => {
                info!(
                    "Snapshot chargé pour {psychologist}: {} séances, {} patients, {} demandes",
                    appointments.len(),
                    patients.len(),
                    requests.len()
                );
                Ok(Snapshot {
                    owner: psychologist,
                    appointments,
                    patients,
                    requests,
                })
            }
            Err(e) => {
                error!("Chargement du snapshot de {psychologist} impossible: {e}");
                Err(JoinFailure(Box::new(e)))
            }
        }
    }
}
