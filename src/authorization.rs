//! Wrapper d'appel à Casbin pour la vérification des droits
//! des patients et psychologues sur les demandes et séances

use std::path::Path;

use casbin::{CoreApi, DefaultModel, FileAdapter};
use log::{error, info};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::models::{Appointment, Request, User};

pub const CONFIG: &str = "access_control/model.conf";
pub const POLICY: &str = "access_control/policy.csv";

/// Un enforcer Casbin
pub struct Enforcer(casbin::Enforcer);

type CasbinResult = Result<(), AccessDenied>;

/// Une erreur sans détails en cas d'accès refusé
#[derive(Debug, Error)]
#[error("Accès refusé.")]
pub struct AccessDenied;

/// Un contexte contenant une référence à un enforcer et à un sujet.
pub struct Context<'ctx> {
    enforcer: &'ctx Enforcer,
    subject: &'ctx User,
}

impl Enforcer {
    pub fn load() -> Result<Self, casbin::Error> {
        Self::from_files(Path::new(CONFIG), Path::new(POLICY))
    }

    pub fn from_files(model: &Path, policy: &Path) -> Result<Self, casbin::Error> {
        let model = futures::executor::block_on(DefaultModel::from_file(model))?;
        let adapter = FileAdapter::new(policy.to_path_buf());

        let mut enforcer = futures::executor::block_on(casbin::Enforcer::new(model, adapter))?;
        futures::executor::block_on(enforcer.load_policy())?;
        Ok(Enforcer(enforcer))
    }

    pub fn with_subject<'ctx>(&'ctx self, subject: &'ctx User) -> Context<'ctx> {
        Context {
            enforcer: self,
            subject,
        }
    }
}

impl Context<'_> {
    fn enforce<O>(&self, object: O, action: &str) -> CasbinResult
    where
        O: Serialize + std::fmt::Debug + std::hash::Hash,
    {
        let subject = self.subject;

        info!("Enforcing {action} for {} ({})", subject.id, subject.role);

        match self.enforcer.0.enforce((subject, &object, action)) {
            Err(e) => {
                error!("Casbin error: {e:?}");
                Err(AccessDenied)
            }
            Ok(granted) => {
                info!("Granted: {granted}");
                if granted {
                    Ok(())
                } else {
                    Err(AccessDenied)
                }
            }
        }
    }

    pub fn submit_request(&self, request: &Request) -> CasbinResult {
        self.enforce(request, "submit-request")
    }

    pub fn read_request(&self, request: &Request) -> CasbinResult {
        self.enforce(request, "read-request")
    }

    pub fn decide_request(&self, request: &Request) -> CasbinResult {
        self.enforce(request, "decide-request")
    }

    pub fn read_appointment(&self, appointment: &Appointment) -> CasbinResult {
        self.enforce(appointment, "read-appointment")
    }

    pub fn update_appointment(&self, appointment: &Appointment) -> CasbinResult {
        self.enforce(appointment, "update-appointment")
    }

    /// Tableau de bord et rapports d'un psychologue
    pub fn view_metrics(&self, psychologist: &User) -> CasbinResult {
        self.enforce(json!({ "psychologist": psychologist }), "view-metrics")
    }
}
