use derive_more::derive::Display;
use inquire::Text;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zxcvbn::{zxcvbn, Score};

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("Failed to compile email regex")
});

// CRP license: two-digit regional council, then the registration number
static CRP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}/[0-9]{4,6}$").expect("Failed to compile CRP regex")
});

static MIN_SCORE: Score = Score::Three;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 64;

#[derive(Debug, Clone, Copy, Display, Error, PartialEq, Eq)]
pub struct InvalidInput;

/// Reasons a password is refused at registration
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PasswordRejection {
    #[error("Les mots de passe ne correspondent pas")]
    Mismatch,
    #[error("Le mot de passe doit contenir entre 8 et 64 caractères")]
    Length,
    #[error("Le mot de passe doit être différent de l'email")]
    SameAsEmail,
    #[error("Le mot de passe est trop facile à deviner")]
    TooWeak,
}

/// Checks a password and its confirmation against the registration rules.
pub fn password_validation(
    password: &str,
    confirmation: &str,
    email: &str,
) -> Result<(), PasswordRejection> {
    if password != confirmation {
        return Err(PasswordRejection::Mismatch);
    }

    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(PasswordRejection::Length);
    }

    if password.eq_ignore_ascii_case(email) {
        return Err(PasswordRejection::SameAsEmail);
    }

    let local_part = email.split('@').next().unwrap_or(email);
    if zxcvbn(password, &[email, local_part]).score() < MIN_SCORE {
        return Err(PasswordRejection::TooWeak);
    }

    Ok(())
}

/// Interactively prompts for a password until it satisfies the registration rules
pub fn password_input_validation(email: &str) -> Result<String, inquire::InquireError> {
    loop {
        let password = inquire::Password::new("Mot de passe :")
            .without_confirmation()
            .prompt()?;
        let confirmation = inquire::Password::new("Confirmez le mot de passe :")
            .without_confirmation()
            .prompt()?;

        match password_validation(&password, &confirmation, email) {
            Ok(()) => return Ok(password),
            Err(rejection) => println!("{rejection}"),
        }

        if let Some(feedback) = zxcvbn(&password, &[email]).feedback() {
            if let Some(warning) = feedback.warning() {
                println!("\nAttention: {}", warning);
            }
            for suggestion in feedback.suggestions() {
                println!("- {}", suggestion);
            }
        }
    }
}

/// Wrapper type for an email address that has been validated
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display,
)]
pub struct Email(String);

impl TryFrom<String> for Email {
    type Error = InvalidInput;

    fn try_from(email: String) -> Result<Self, Self::Error> {
        let email = email.trim().to_lowercase();
        if EMAIL_REGEX.is_match(&email) {
            Ok(Self(email))
        } else {
            Err(InvalidInput)
        }
    }
}

impl TryFrom<&str> for Email {
    type Error = InvalidInput;

    fn try_from(email: &str) -> Result<Self, Self::Error> {
        Self::try_from(email.to_owned())
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn email_input_validation(message: &str) -> anyhow::Result<Email> {
    let email = Text::new(message).prompt()?;
    Ok(Email::try_from(email)?)
}

/// Wrapper type for a CRP license number that has been validated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
pub struct CrpNumber(String);

impl TryFrom<String> for CrpNumber {
    type Error = InvalidInput;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim().to_owned();
        if CRP_REGEX.is_match(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidInput)
        }
    }
}

impl TryFrom<&str> for CrpNumber {
    type Error = InvalidInput;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}
