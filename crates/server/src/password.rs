//! Password hashing.
//!
//! Passwords are stored as Argon2 PHC strings, which embed the salt and
//! hashing parameters alongside the hash itself. Hashing is CPU-bound, so it
//! runs on the blocking thread pool.

use argon2::{
    password_hash::{self, rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use derive_more::{Display, Error, From};
use tokio::task::{self, JoinError};

/// Errors that may occur while hashing or verifying a password.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Argon2 error, including malformed stored hashes.
    Hash(password_hash::Error),

    /// Blocking hashing task didn't complete.
    Task(JoinError),
}

/// Hash a password with a freshly generated salt.
pub async fn hash(password: String) -> Result<String, Error> {
    Ok(task::spawn_blocking(move || hash_blocking(&password)).await??)
}

/// Check the password against a stored PHC string.
pub async fn verify(password: String, hash: String) -> Result<bool, Error> {
    Ok(task::spawn_blocking(move || verify_blocking(&password, &hash)).await??)
}

fn hash_blocking(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

fn verify_blocking(password: &str, hash: &str) -> Result<bool, password_hash::Error> {
    let hash = PasswordHash::new(hash)?;

    match Argon2::default().verify_password(password.as_bytes(), &hash) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(err) => Err(err),
    }
}
