use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::DirectoryError;

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9.-]+$").unwrap();
}

/// Check an address against the accepted email shape
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// A registered application user
///
/// Credentials live with the upstream authenticator; this record only
/// carries the profile and the numeric id that owns applet records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable numeric identifier
    pub id: i64,

    /// Unique login name
    pub username: String,

    /// Unique email address
    pub email: String,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    /// Inactive users are treated as anonymous
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Display name built from first and last name, falling back to the username
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.username.clone(),
        }
    }
}

/// Profile data for a user being added to the directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Profile fields to change; `None` leaves a field as it is
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Identity of whoever submitted a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub is_authenticated: bool,
}

impl CurrentUser {
    /// Identity of a known, active user
    pub fn authenticated(id: i64, username: impl Into<String>) -> Self {
        CurrentUser {
            id,
            username: username.into(),
            is_authenticated: true,
        }
    }

    /// Identity for requests nobody vouched for; such turns are ignored
    pub fn anonymous() -> Self {
        CurrentUser {
            id: 0,
            username: String::new(),
            is_authenticated: false,
        }
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        CurrentUser {
            id: user.id,
            username: user.username.clone(),
            is_authenticated: user.is_active,
        }
    }
}

/// Registered users, optionally mirrored to a JSON file
#[derive(Debug)]
pub struct UserDirectory {
    path: Option<PathBuf>,
    users: RwLock<Vec<User>>,
}

impl UserDirectory {
    /// Directory with no backing file, used by tests and embedders
    pub fn in_memory() -> Self {
        UserDirectory {
            path: None,
            users: RwLock::new(Vec::new()),
        }
    }

    /// Load users from `path`
    ///
    /// A missing or empty file means no users yet. Later changes are written
    /// back to the same path.
    ///
    /// # Arguments
    /// * `path` - Location of `users.json`
    ///
    /// # Errors
    /// * `InvalidData` if the file holds something other than a user list
    /// * Any other IO error from reading the file
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let users = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };

        debug!("loaded {} users from {}", users.len(), path.display());

        Ok(UserDirectory {
            path: Some(path),
            users: RwLock::new(users),
        })
    }

    /// Add a user, assigning the next free id
    ///
    /// # Arguments
    /// * `new_user` - Profile of the user to register
    ///
    /// # Returns
    /// * `Result<User, DirectoryError>` - The stored user, active and never logged in
    ///
    /// # Errors
    /// * [`DirectoryError::MissingField`] if username or email is empty
    /// * [`DirectoryError::InvalidEmail`] if the email is malformed
    /// * [`DirectoryError::UsernameTaken`] / [`DirectoryError::EmailTaken`] on conflicts
    /// * [`DirectoryError::Storage`] if the users file cannot be written
    pub fn add_user(&self, new_user: NewUser) -> Result<User, DirectoryError> {
        if new_user.username.trim().is_empty() || new_user.email.trim().is_empty() {
            return Err(DirectoryError::MissingField);
        }
        if !is_valid_email(&new_user.email) {
            return Err(DirectoryError::InvalidEmail);
        }

        self.modify(|users| {
            if users.iter().any(|u| u.username == new_user.username) {
                return Err(DirectoryError::UsernameTaken);
            }
            if users.iter().any(|u| u.email == new_user.email) {
                return Err(DirectoryError::EmailTaken);
            }

            let now = Utc::now();
            let user = User {
                id: users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
                username: new_user.username,
                email: new_user.email,
                first_name: new_user.first_name,
                last_name: new_user.last_name,
                is_active: true,
                created_at: now,
                updated_at: now,
                last_login: None,
            };
            users.push(user.clone());
            info!("added user {} with id {}", user.username, user.id);
            Ok(user)
        })
    }

    /// Look up a user by exact username
    pub fn find_by_username(&self, username: &str) -> Option<User> {
        let users = self.users.read().ok()?;
        users.iter().find(|u| u.username == username).cloned()
    }

    /// Resolve a username into the identity the interpreter works with
    ///
    /// Unknown and deactivated users come back unauthenticated.
    pub fn current_user(&self, username: &str) -> CurrentUser {
        self.find_by_username(username)
            .map(|user| CurrentUser::from(&user))
            .unwrap_or_else(CurrentUser::anonymous)
    }

    /// Update a user's profile fields
    ///
    /// Only the fields set in `update` change. Keeping the current username
    /// or email is not a conflict.
    ///
    /// # Arguments
    /// * `user_id` - Id of the user to change
    /// * `update` - Fields to replace
    ///
    /// # Returns
    /// * `Result<User, DirectoryError>` - The user after the change
    ///
    /// # Errors
    /// * [`DirectoryError::UserNotFound`] if no user has `user_id`
    /// * [`DirectoryError::MissingField`] if the new username or email is empty
    /// * [`DirectoryError::InvalidEmail`] if the new email is malformed
    /// * [`DirectoryError::UsernameTaken`] / [`DirectoryError::EmailTaken`] if
    ///   another user already has the new value
    pub fn update_profile(
        &self,
        user_id: i64,
        update: ProfileUpdate,
    ) -> Result<User, DirectoryError> {
        let blank = |value: &Option<String>| value.as_deref().is_some_and(|v| v.trim().is_empty());
        if blank(&update.username) || blank(&update.email) {
            return Err(DirectoryError::MissingField);
        }
        if update.email.as_deref().is_some_and(|email| !is_valid_email(email)) {
            return Err(DirectoryError::InvalidEmail);
        }

        self.modify(|users| {
            let index = users
                .iter()
                .position(|u| u.id == user_id)
                .ok_or(DirectoryError::UserNotFound)?;

            if let Some(username) = &update.username {
                if users.iter().any(|u| u.id != user_id && &u.username == username) {
                    return Err(DirectoryError::UsernameTaken);
                }
            }
            if let Some(email) = &update.email {
                if users.iter().any(|u| u.id != user_id && &u.email == email) {
                    return Err(DirectoryError::EmailTaken);
                }
            }

            let user = &mut users[index];
            if let Some(username) = update.username {
                user.username = username;
            }
            if let Some(email) = update.email {
                user.email = email;
            }
            if let Some(first_name) = update.first_name {
                user.first_name = Some(first_name);
            }
            if let Some(last_name) = update.last_name {
                user.last_name = Some(last_name);
            }
            user.updated_at = Utc::now();

            info!("updated profile of user {}", user.id);
            Ok(user.clone())
        })
    }

    /// Activate or deactivate a user; inactive users resolve as anonymous
    pub fn set_active(&self, user_id: i64, active: bool) -> Result<User, DirectoryError> {
        self.modify(|users| {
            let user = users
                .iter_mut()
                .find(|u| u.id == user_id)
                .ok_or(DirectoryError::UserNotFound)?;
            user.is_active = active;
            user.updated_at = Utc::now();
            Ok(user.clone())
        })
    }

    /// Stamp `last_login` with the current time
    pub fn record_login(&self, user_id: i64) -> Result<User, DirectoryError> {
        self.modify(|users| {
            let user = users
                .iter_mut()
                .find(|u| u.id == user_id)
                .ok_or(DirectoryError::UserNotFound)?;
            user.last_login = Some(Utc::now());
            Ok(user.clone())
        })
    }

    fn modify<T>(
        &self,
        change: impl FnOnce(&mut Vec<User>) -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        let mut users = self
            .users
            .write()
            .map_err(|_| DirectoryError::Storage("users lock poisoned".to_string()))?;

        let mut next = users.clone();
        let result = change(&mut next)?;
        self.save(&next)?;
        *users = next;

        Ok(result)
    }

    fn save(&self, users: &[User]) -> Result<(), DirectoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(users)
            .map_err(|_| DirectoryError::Storage("Failed to serialize users data".to_string()))?;

        let tmp_path = path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path)
            .map_err(|_| DirectoryError::Storage("Failed to create users file".to_string()))?;

        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|_| DirectoryError::Storage("Failed to write users data".to_string()))?;

        fs::rename(&tmp_path, path)
            .map_err(|_| DirectoryError::Storage("Failed to replace users file".to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            ..NewUser::default()
        }
    }

    #[test]
    fn test_add_user_assigns_sequential_ids() {
        let directory = UserDirectory::in_memory();
        let alice = directory.add_user(new_user("alice", "a@example.com")).unwrap();
        let bob = directory.add_user(new_user("bob", "b@example.com")).unwrap();
        assert_eq!(alice.id, 1);
        assert_eq!(bob.id, 2);
    }

    #[test]
    fn test_add_user_rejects_conflicts() {
        let directory = UserDirectory::in_memory();
        directory.add_user(new_user("alice", "a@example.com")).unwrap();

        assert_eq!(
            directory.add_user(new_user("alice", "other@example.com")),
            Err(DirectoryError::UsernameTaken)
        );
        assert_eq!(
            directory.add_user(new_user("alicia", "a@example.com")),
            Err(DirectoryError::EmailTaken)
        );
        assert_eq!(
            directory.add_user(new_user("", "x@example.com")),
            Err(DirectoryError::MissingField)
        );
    }

    #[test]
    fn test_add_user_rejects_malformed_email() {
        let directory = UserDirectory::in_memory();

        for email in ["not an email", "alice@", "@example.com", "alice@example"] {
            assert_eq!(
                directory.add_user(new_user("alice", email)),
                Err(DirectoryError::InvalidEmail),
                "{email:?} was accepted"
            );
        }
        assert!(directory.find_by_username("alice").is_none());

        assert!(is_valid_email("alice.l+tag@mail-host.co.uk"));
    }

    #[test]
    fn test_update_profile_changes_only_given_fields() {
        let directory = UserDirectory::in_memory();
        let alice = directory.add_user(new_user("alice", "a@example.com")).unwrap();

        let updated = directory
            .update_profile(
                alice.id,
                ProfileUpdate {
                    first_name: Some("Alice".to_string()),
                    email: Some("alice@example.org".to_string()),
                    ..ProfileUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(updated.username, "alice");
        assert_eq!(updated.email, "alice@example.org");
        assert_eq!(updated.first_name.as_deref(), Some("Alice"));
        assert_eq!(updated.last_name, None);
        assert!(updated.updated_at >= alice.updated_at);
        assert_eq!(directory.find_by_username("alice"), Some(updated));
    }

    #[test]
    fn test_update_profile_rejects_conflicts() {
        let directory = UserDirectory::in_memory();
        let alice = directory.add_user(new_user("alice", "a@example.com")).unwrap();
        directory.add_user(new_user("bob", "b@example.com")).unwrap();

        let rename = |username: &str| ProfileUpdate {
            username: Some(username.to_string()),
            ..ProfileUpdate::default()
        };
        let reemail = |email: &str| ProfileUpdate {
            email: Some(email.to_string()),
            ..ProfileUpdate::default()
        };

        assert_eq!(
            directory.update_profile(alice.id, rename("bob")),
            Err(DirectoryError::UsernameTaken)
        );
        assert_eq!(
            directory.update_profile(alice.id, reemail("b@example.com")),
            Err(DirectoryError::EmailTaken)
        );
        assert_eq!(
            directory.update_profile(alice.id, reemail("nope")),
            Err(DirectoryError::InvalidEmail)
        );
        assert_eq!(
            directory.update_profile(alice.id, rename(" ")),
            Err(DirectoryError::MissingField)
        );
        assert_eq!(
            directory.update_profile(99, rename("carol")),
            Err(DirectoryError::UserNotFound)
        );

        // Re-submitting your own values is fine
        assert!(directory.update_profile(alice.id, rename("alice")).is_ok());
        assert_eq!(directory.find_by_username("alice").unwrap().email, "a@example.com");
    }

    #[test]
    fn test_current_user_for_unknown_and_inactive() {
        let directory = UserDirectory::in_memory();
        let alice = directory.add_user(new_user("alice", "a@example.com")).unwrap();

        assert_eq!(
            directory.current_user("alice"),
            CurrentUser::authenticated(alice.id, "alice")
        );
        assert!(!directory.current_user("mallory").is_authenticated);

        directory.set_active(alice.id, false).unwrap();
        assert!(!directory.current_user("alice").is_authenticated);
    }

    #[test]
    fn test_full_name_fallbacks() {
        let directory = UserDirectory::in_memory();
        let mut user = directory.add_user(new_user("alice", "a@example.com")).unwrap();
        assert_eq!(user.full_name(), "alice");

        user.first_name = Some("Alice".to_string());
        assert_eq!(user.full_name(), "Alice");

        user.last_name = Some("Liddell".to_string());
        assert_eq!(user.full_name(), "Alice Liddell");

        user.first_name = None;
        assert_eq!(user.full_name(), "Liddell");
    }

    #[test]
    fn test_users_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let directory = UserDirectory::open(&path).unwrap();
        let alice = directory.add_user(new_user("alice", "a@example.com")).unwrap();
        directory.record_login(alice.id).unwrap();

        let reopened = UserDirectory::open(&path).unwrap();
        let loaded = reopened.find_by_username("alice").unwrap();
        assert_eq!(loaded.id, alice.id);
        assert!(loaded.last_login.is_some());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_write_keeps_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let directory = UserDirectory::open(&path).unwrap();
        directory.add_user(new_user("alice", "a@example.com")).unwrap();
        let saved = fs::read_to_string(&path).unwrap();

        // A directory squatting on the temp path makes the next write fail
        fs::create_dir(path.with_extension("json.tmp")).unwrap();
        let err = directory.add_user(new_user("bob", "b@example.com")).unwrap_err();
        assert!(matches!(err, DirectoryError::Storage(_)));

        assert!(directory.find_by_username("bob").is_none());
        assert_eq!(fs::read_to_string(&path).unwrap(), saved);
        assert!(UserDirectory::open(&path).is_ok());
    }
}
