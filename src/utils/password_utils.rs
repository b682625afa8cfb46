//! Hachage et vérification des mots de passe

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHashString, PasswordVerifier, SaltString},
    Argon2, PasswordHasher,
};
use derive_more::derive::Display;
use serde::{Deserialize, Serialize};
use std::{str::FromStr, sync::LazyLock};
use thiserror::Error;

static HASHER: LazyLock<Argon2<'static>> = LazyLock::new(Argon2::default);

/// Haché de référence pour les emails inconnus, de sorte que la
/// vérification prenne le même temps que pour un compte existant
static DECOY_HASH: LazyLock<Option<PWHash>> = LazyLock::new(|| hash("").ok());

#[derive(Debug, Error)]
#[error("Impossible de hacher le mot de passe: {0}")]
pub struct HashError(argon2::password_hash::Error);

/// Un mot de passe haché (chaîne PHC Argon2id)
#[derive(Clone, Debug, Display)]
pub struct PWHash(PasswordHashString);

impl std::hash::Hash for PWHash {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.as_str().hash(state)
    }
}

impl Serialize for PWHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PWHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let phc = String::deserialize(deserializer)?;
        PasswordHashString::from_str(&phc)
            .map(PWHash)
            .map_err(|_| serde::de::Error::custom("Invalid PHC string"))
    }
}

/// Hache un mot de passe en clair avec un sel aléatoire
pub fn hash(password: &str) -> Result<PWHash, HashError> {
    let salt = SaltString::generate(&mut OsRng);

    HASHER
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| PWHash(hash.serialize()))
        .map_err(HashError)
}

/// Vérifie un mot de passe contre le haché stocké.
///
/// Sans haché (compte inconnu), le mot de passe est tout de même
/// comparé au haché de référence, et la vérification échoue.
pub fn verify(password: &str, stored: Option<&PWHash>) -> bool {
    let (candidate, known) = match stored {
        Some(hash) => (Some(hash), true),
        None => (DECOY_HASH.as_ref(), false),
    };

    let Some(candidate) = candidate else {
        return false;
    };

    let matches = HASHER
        .verify_password(password.as_bytes(), &candidate.0.password_hash())
        .is_ok();

    matches && known
}
