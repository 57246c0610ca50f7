//! Identity: sign-up, sign-in, profile, and the store that mirrors the
//! signed-in user.
//!
//! [`IdentityProvider`] is the seam to whatever owns accounts.
//! [`LocalIdentityProvider`] keeps them in the data directory:
//! `accounts.json` holds salted SHA-256 password digests, `session.json` the
//! signed-in uid, and `password_resets.jsonl` every reset request.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ulid::Ulid;
use uuid::Uuid;

use crate::backend::Subscription;
use crate::error::{Error, Result};
use crate::objects::{profile_photo_key, ObjectStore};
use crate::storage::Storage;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignUpForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>, confirm: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        if self.password != self.confirm_password {
            return Err(Error::Validation("Passwords do not match".to_string()));
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::Validation("A valid email address is required".to_string()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Fields to change; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

pub type AuthCallback = Box<dyn FnMut(Option<Identity>) + Send>;

pub trait IdentityProvider: Send + Sync {
    /// Create an account and sign it in.
    fn sign_up(&self, email: &str, password: &str) -> Result<Identity>;
    fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;
    fn sign_out(&self) -> Result<()>;
    fn password_reset(&self, email: &str) -> Result<()>;
    fn update_profile(&self, update: &ProfileUpdate) -> Result<Identity>;
    fn current(&self) -> Result<Option<Identity>>;
    /// Called with the current identity now and after every auth change.
    fn subscribe(&self, callback: AuthCallback) -> Result<Subscription>;
}

// =============================================================================
// Local provider
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    uid: String,
    email: String,
    salt: String,
    password_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    photo_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl Account {
    fn identity(&self) -> Identity {
        Identity {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    uid: String,
    signed_in_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PasswordResetRequest {
    request_id: String,
    email: String,
    requested_at: DateTime<Utc>,
}

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

type Listeners = Arc<Mutex<HashMap<u64, Arc<Mutex<AuthCallback>>>>>;

pub struct LocalIdentityProvider {
    storage: Storage,
    listeners: Listeners,
    next_listener: AtomicU64,
}

impl LocalIdentityProvider {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(0),
        }
    }

    fn load_accounts(&self) -> Result<AccountsFile> {
        self.storage
            .read_json_or_default(&self.storage.accounts_file())
    }

    fn save_accounts(&self, accounts: &AccountsFile) -> Result<()> {
        self.storage
            .write_json(&self.storage.accounts_file(), accounts)
    }

    fn write_session(&self, uid: &str) -> Result<()> {
        let session = SessionFile {
            uid: uid.to_string(),
            signed_in_at: Utc::now(),
        };
        self.storage
            .write_json(&self.storage.session_file(), &session)
    }

    fn session_uid(&self) -> Result<Option<String>> {
        let path = self.storage.session_file();
        if !path.exists() {
            return Ok(None);
        }
        let session: SessionFile = self.storage.read_json(&path)?;
        Ok(Some(session.uid))
    }

    fn notify(&self, identity: Option<Identity>) {
        let listeners: Vec<Arc<Mutex<AuthCallback>>> = match self.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(_) => return,
        };
        for listener in listeners {
            if let Ok(mut callback) = listener.lock() {
                (*callback)(identity.clone());
            }
        }
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        validate_email(email)?;
        validate_password(password)?;
        let email = normalize_email(email);

        let identity = {
            let _lock = self.storage.lock()?;
            let mut accounts = self.load_accounts()?;
            if accounts.accounts.iter().any(|account| account.email == email) {
                return Err(Error::AuthRejected(
                    "an account with this email already exists".to_string(),
                ));
            }
            let salt = Uuid::new_v4().simple().to_string();
            let account = Account {
                uid: Uuid::new_v4().simple().to_string(),
                email,
                password_digest: password_digest(&salt, password),
                salt,
                display_name: None,
                photo_url: None,
                created_at: Utc::now(),
            };
            let identity = account.identity();
            accounts.accounts.push(account);
            self.save_accounts(&accounts)?;
            self.write_session(&identity.uid)?;
            identity
        };
        tracing::info!(uid = %identity.uid, "account created");
        self.notify(Some(identity.clone()));
        Ok(identity)
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let email = normalize_email(email);
        let identity = {
            let _lock = self.storage.lock()?;
            let accounts = self.load_accounts()?;
            let account = accounts
                .accounts
                .iter()
                .find(|account| account.email == email)
                .filter(|account| password_digest(&account.salt, password) == account.password_digest)
                .ok_or_else(|| Error::AuthRejected("invalid email or password".to_string()))?;
            self.write_session(&account.uid)?;
            account.identity()
        };
        tracing::info!(uid = %identity.uid, "signed in");
        self.notify(Some(identity.clone()));
        Ok(identity)
    }

    fn sign_out(&self) -> Result<()> {
        let path = self.storage.session_file();
        if !path.exists() {
            return Ok(());
        }
        {
            let _lock = self.storage.lock()?;
            std::fs::remove_file(&path)?;
        }
        tracing::info!("signed out");
        self.notify(None);
        Ok(())
    }

    fn password_reset(&self, email: &str) -> Result<()> {
        validate_email(email)?;
        let email = normalize_email(email);
        let _lock = self.storage.lock()?;
        let accounts = self.load_accounts()?;
        if !accounts.accounts.iter().any(|account| account.email == email) {
            return Err(Error::AuthRejected("no account exists for this email".to_string()));
        }
        let request = PasswordResetRequest {
            request_id: Ulid::new().to_string(),
            email,
            requested_at: Utc::now(),
        };
        self.storage
            .append_jsonl(&self.storage.password_resets_file(), &request)?;
        tracing::info!(request_id = %request.request_id, "password reset requested");
        Ok(())
    }

    fn update_profile(&self, update: &ProfileUpdate) -> Result<Identity> {
        let identity = {
            let _lock = self.storage.lock()?;
            let uid = self.session_uid()?.ok_or(Error::NotSignedIn)?;
            let mut accounts = self.load_accounts()?;
            let account = accounts
                .accounts
                .iter_mut()
                .find(|account| account.uid == uid)
                .ok_or(Error::NotSignedIn)?;
            if let Some(name) = update.display_name.as_deref() {
                let name = name.trim();
                account.display_name = (!name.is_empty()).then(|| name.to_string());
            }
            if let Some(url) = update.photo_url.as_ref() {
                account.photo_url = Some(url.clone());
            }
            let identity = account.identity();
            self.save_accounts(&accounts)?;
            identity
        };
        self.notify(Some(identity.clone()));
        Ok(identity)
    }

    fn current(&self) -> Result<Option<Identity>> {
        let Some(uid) = self.session_uid()? else {
            return Ok(None);
        };
        let accounts = self.load_accounts()?;
        Ok(accounts
            .accounts
            .iter()
            .find(|account| account.uid == uid)
            .map(Account::identity))
    }

    fn subscribe(&self, callback: AuthCallback) -> Result<Subscription> {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        let listener = Arc::new(Mutex::new(callback));
        let current = self.current()?;
        if let Ok(mut callback) = listener.lock() {
            (*callback)(current);
        }
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(id, listener);
        }
        let listeners = Arc::downgrade(&self.listeners);
        Ok(Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                if let Ok(mut listeners) = listeners.lock() {
                    listeners.remove(&id);
                }
            }
        }))
    }
}

// =============================================================================
// Auth store
// =============================================================================

/// Mirror of the signed-in identity plus the last auth error message.
pub struct AuthStore {
    provider: Arc<dyn IdentityProvider>,
    objects: Option<Arc<dyn ObjectStore>>,
    identity: Option<Identity>,
    last_error: Option<String>,
}

impl AuthStore {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Result<Self> {
        let identity = provider.current()?;
        Ok(Self {
            provider,
            objects: None,
            identity,
            last_error: None,
        })
    }

    pub fn with_objects(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Replace the mirrored identity, e.g. from a provider subscription.
    pub fn set_identity(&mut self, identity: Option<Identity>) {
        self.identity = identity;
    }

    pub fn sign_up(&mut self, form: &SignUpForm) -> Result<Identity> {
        let result = form
            .validate()
            .and_then(|()| self.provider.sign_up(&form.email, &form.password));
        self.settle(result)
    }

    pub fn sign_in(&mut self, email: &str, password: &str) -> Result<Identity> {
        let result = self.provider.sign_in(email, password);
        self.settle(result)
    }

    pub fn sign_out(&mut self) -> Result<()> {
        let result = self.provider.sign_out();
        if result.is_ok() {
            self.identity = None;
        }
        self.record(result)
    }

    pub fn reset_password(&mut self, email: &str) -> Result<()> {
        let result = self.provider.password_reset(email);
        self.record(result)
    }

    /// Change the display name and/or upload a new profile photo.
    pub fn update_profile(&mut self, display_name: Option<&str>, photo: Option<&Path>) -> Result<Identity> {
        let result = self.upload_photo(photo).and_then(|photo_url| {
            self.provider.update_profile(&ProfileUpdate {
                display_name: display_name.map(str::to_string),
                photo_url,
            })
        });
        self.settle(result)
    }

    fn upload_photo(&self, photo: Option<&Path>) -> Result<Option<String>> {
        let Some(path) = photo else {
            return Ok(None);
        };
        let identity = self.identity.as_ref().ok_or(Error::NotSignedIn)?;
        let objects = self
            .objects
            .as_ref()
            .ok_or_else(|| Error::OperationFailed("no object store configured".to_string()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::InvalidArgument(format!("invalid photo path {}", path.display())))?;
        let bytes = std::fs::read(path)?;
        objects
            .upload(&profile_photo_key(&identity.uid, file_name), &bytes)
            .map(Some)
    }

    fn settle(&mut self, result: Result<Identity>) -> Result<Identity> {
        if let Ok(identity) = &result {
            self.identity = Some(identity.clone());
        }
        self.record(result)
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(err) => {
                tracing::debug!(error = %err, "auth operation failed");
                self.last_error = Some(err.to_string());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use tempfile::TempDir;

    use crate::objects::LocalObjectStore;

    fn provider(temp: &TempDir) -> Arc<LocalIdentityProvider> {
        Arc::new(LocalIdentityProvider::new(Storage::new(temp.path())))
    }

    #[test]
    fn form_validation() {
        assert!(SignUpForm::new("a@b.c", "secret", "secret").validate().is_ok());
        for form in [
            SignUpForm::new("", "secret", "secret"),
            SignUpForm::new("nope", "secret", "secret"),
            SignUpForm::new("a@b.c", "short", "short"),
            SignUpForm::new("a@b.c", "secret", "secreT"),
        ] {
            assert!(matches!(form.validate(), Err(Error::Validation(_))), "{form:?}");
        }
    }

    #[test]
    fn sign_up_sign_out_sign_in() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);

        let created = provider.sign_up("Ada@Example.com", "hunter22").unwrap();
        assert_eq!(created.email, "ada@example.com");
        assert_eq!(provider.current().unwrap(), Some(created.clone()));

        provider.sign_out().unwrap();
        assert_eq!(provider.current().unwrap(), None);
        provider.sign_out().unwrap();

        assert!(matches!(
            provider.sign_in("ada@example.com", "wrong-pass"),
            Err(Error::AuthRejected(_))
        ));
        let signed_in = provider.sign_in("ada@example.com", "hunter22").unwrap();
        assert_eq!(signed_in.uid, created.uid);

        assert!(matches!(
            provider.sign_up("ada@example.com", "another1"),
            Err(Error::AuthRejected(_))
        ));
    }

    #[test]
    fn passwords_are_not_stored_in_clear() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        provider.sign_up("ada@example.com", "hunter22").unwrap();
        let raw = std::fs::read_to_string(temp.path().join("accounts.json")).unwrap();
        assert!(!raw.contains("hunter22"));
    }

    #[test]
    fn password_reset_requires_known_account() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        assert!(provider.password_reset("ghost@example.com").is_err());

        provider.sign_up("ada@example.com", "hunter22").unwrap();
        provider.password_reset("ADA@example.com").unwrap();
        let requests: Vec<serde_json::Value> = Storage::new(temp.path())
            .read_jsonl(&temp.path().join("password_resets.jsonl"))
            .unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["email"], "ada@example.com");
    }

    #[test]
    fn subscribers_follow_auth_state() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        let (tx, rx) = mpsc::channel();
        let subscription = provider
            .subscribe(Box::new(move |identity| {
                let _ = tx.send(identity.map(|identity| identity.email));
            }))
            .unwrap();

        provider.sign_up("ada@example.com", "hunter22").unwrap();
        provider.sign_out().unwrap();
        drop(subscription);
        provider.sign_in("ada@example.com", "hunter22").unwrap();

        let seen: Vec<Option<String>> = rx.try_iter().collect();
        assert_eq!(seen, vec![None, Some("ada@example.com".to_string()), None]);
    }

    #[test]
    fn store_records_errors_and_identity() {
        let temp = TempDir::new().unwrap();
        let mut store = AuthStore::new(provider(&temp)).unwrap();
        assert!(store.identity().is_none());

        assert!(store
            .sign_up(&SignUpForm::new("ada@example.com", "hunter22", "hunter23"))
            .is_err());
        assert_eq!(store.last_error(), Some("Passwords do not match"));

        store
            .sign_up(&SignUpForm::new("ada@example.com", "hunter22", "hunter22"))
            .unwrap();
        assert!(store.last_error().is_none());
        assert_eq!(store.identity().unwrap().email, "ada@example.com");

        store.sign_out().unwrap();
        assert!(store.identity().is_none());
        assert!(store.sign_in("ada@example.com", "nope").is_err());
        assert!(store.last_error().unwrap().contains("invalid email or password"));
    }

    #[test]
    fn profile_update_uploads_photo() {
        let temp = TempDir::new().unwrap();
        let objects = Arc::new(LocalObjectStore::new(temp.path().join("objects")));
        let mut store = AuthStore::new(provider(&temp)).unwrap().with_objects(objects);

        assert!(matches!(
            store.update_profile(Some("Ada"), None),
            Err(Error::NotSignedIn)
        ));

        let created = store
            .sign_up(&SignUpForm::new("ada@example.com", "hunter22", "hunter22"))
            .unwrap();
        let photo = temp.path().join("me.png");
        std::fs::write(&photo, b"png").unwrap();

        let updated = store.update_profile(Some("Ada"), Some(&photo)).unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Ada"));
        let url = updated.photo_url.unwrap();
        assert!(url.ends_with(&format!("profile_photos/{}/me.png", created.uid)));
    }
}
