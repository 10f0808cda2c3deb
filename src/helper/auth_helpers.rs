use crate::models::{Role, User};
use chrono::Utc;
use hmac::{Hmac, Mac};
use lettre::message::Mailbox;
use rand::distributions::{Distribution, Uniform};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const PASSWORD_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Error, Debug, PartialEq)]
pub enum AuthError {
    #[error("Invalid email address: '{0}'")]
    InvalidEmail(String),
    #[error("A user needs at least one role")]
    NoRoles,
    #[error("First and last name are required")]
    MissingName,
    #[error("Password must not be empty")]
    EmptyPassword,
    #[error("Wrong password")]
    WrongPassword,
    #[error("New password and its confirmation do not match")]
    PasswordMismatch,
    #[error("Invalid secret key")]
    InvalidKey,
}

/// HMAC-SHA256 of `msg` under `key`.
pub fn make_mac(msg: &[u8], key: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| AuthError::InvalidKey)?;
    mac.update(msg);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Recomputes the MAC and compares in constant time.
pub fn check_mac(msg: &[u8], expected: &[u8], key: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(msg);
    mac.verify_slice(expected).is_ok()
}

/// The stored form of a password: hex-encoded HMAC under the server secret.
pub fn hash_password(password: &str, secret: &[u8]) -> Result<String, AuthError> {
    if password.is_empty() {
        return Err(AuthError::EmptyPassword);
    }
    Ok(hex::encode(make_mac(password.as_bytes(), secret)?))
}

pub fn verify_password(password: &str, password_hash: &str, secret: &[u8]) -> bool {
    match hex::decode(password_hash) {
        Ok(expected) => check_mac(password.as_bytes(), &expected, secret),
        Err(_) => false,
    }
}

/// Accepts `user@host` or `Name <user@host>` and keeps only the address.
pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    email
        .trim()
        .parse::<Mailbox>()
        .map(|mailbox| mailbox.email.to_string())
        .map_err(|_| AuthError::InvalidEmail(email.to_string()))
}

pub fn new_user(
    password: &str,
    email: &str,
    first_name: &str,
    last_name: &str,
    roles: &[Role],
    secret: &[u8],
) -> Result<User, AuthError> {
    let email = normalize_email(email)?;
    if roles.is_empty() {
        return Err(AuthError::NoRoles);
    }
    let password_hash = hash_password(password, secret)?;

    let mut unique_roles: Vec<Role> = Vec::with_capacity(roles.len());
    for role in roles {
        if !unique_roles.contains(role) {
            unique_roles.push(*role);
        }
    }

    Ok(User {
        id: Uuid::new_v4(),
        first_name: first_name.trim().to_string(),
        last_name: last_name.trim().to_string(),
        email,
        password_hash,
        roles: unique_roles,
        active: true,
        created: Utc::now(),
    })
}

/// Names are optional for accounts created by admins but required at signup.
pub fn require_names(first_name: &str, last_name: &str) -> Result<(), AuthError> {
    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(AuthError::MissingName);
    }
    Ok(())
}

pub fn confirm_password(password: &str, confirmation: &str) -> Result<(), AuthError> {
    if password != confirmation {
        return Err(AuthError::PasswordMismatch);
    }
    Ok(())
}

/// Checks the old password before anything else and returns the new hash.
pub fn change_password(
    user: &User,
    old_password: &str,
    new_password: &str,
    confirmation: &str,
    secret: &[u8],
) -> Result<String, AuthError> {
    if !verify_password(old_password, &user.password_hash, secret) {
        return Err(AuthError::WrongPassword);
    }
    confirm_password(new_password, confirmation)?;
    hash_password(new_password, secret)
}

/// A password of `len` ASCII letters, used for access restore.
pub fn random_password(len: usize) -> String {
    let range = Uniform::from(0..PASSWORD_LETTERS.len());
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| PASSWORD_LETTERS[range.sample(&mut rng)] as char)
        .collect()
}

pub fn is_admin(user: &User, admin_roles: &[Role]) -> bool {
    user.active && user.has_any_role(admin_roles)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"server-secret";

    #[test]
    fn verify_accepts_only_the_matching_mac() {
        let hash = hash_password("hunter2", SECRET).unwrap();
        assert_eq!(hash, hex::encode(make_mac(b"hunter2", SECRET).unwrap()));
        assert!(verify_password("hunter2", &hash, SECRET));
        assert!(!verify_password("hunter3", &hash, SECRET));
        assert!(!verify_password("hunter2", &hash, b"other-secret"));
        assert!(!verify_password("hunter2", "not hex", SECRET));
    }

    #[test]
    fn create_user_validates_email_and_roles() {
        let user = new_user("pw", "Ann <ann@example.org>", "Ann", "Lee", &[Role::Author, Role::Author], SECRET).unwrap();
        assert_eq!(user.email, "ann@example.org");
        assert_eq!(user.roles, vec![Role::Author]);
        assert!(user.active);

        assert_eq!(
            new_user("pw", "not an address", "A", "B", &[Role::Visitor], SECRET),
            Err(AuthError::InvalidEmail("not an address".into()))
        );
        assert_eq!(new_user("pw", "a@b.org", "A", "B", &[], SECRET), Err(AuthError::NoRoles));
    }

    #[test]
    fn password_change_checks_old_password_first() {
        let user = new_user("old", "a@b.org", "A", "B", &[Role::Visitor], SECRET).unwrap();
        assert_eq!(change_password(&user, "wrong", "new", "other", SECRET), Err(AuthError::WrongPassword));
        assert_eq!(change_password(&user, "old", "new", "other", SECRET), Err(AuthError::PasswordMismatch));
        let hash = change_password(&user, "old", "new", "new", SECRET).unwrap();
        assert!(verify_password("new", &hash, SECRET));
    }

    #[test]
    fn random_passwords_are_letters() {
        let password = random_password(9);
        assert_eq!(password.len(), 9);
        assert!(password.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn admin_check_is_role_intersection() {
        let mut user = new_user("pw", "a@b.org", "A", "B", &[Role::Visitor, Role::Author], SECRET).unwrap();
        assert!(is_admin(&user, &[Role::Administrator, Role::Author]));
        assert!(!is_admin(&user, &[Role::Administrator]));
        user.active = false;
        assert!(!is_admin(&user, &[Role::Administrator, Role::Author]));
    }
}
