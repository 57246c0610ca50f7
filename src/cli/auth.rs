//! tm auth command implementations.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::auth::{AuthStore, Identity, LocalIdentityProvider, SignUpForm};
use crate::error::{Error, Result};
use crate::objects::LocalObjectStore;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::storage::Storage;

pub struct AuthOptions {
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

impl AuthOptions {
    fn output(&self) -> OutputOptions {
        OutputOptions {
            json: self.json,
            quiet: self.quiet,
        }
    }
}

#[derive(Serialize)]
struct IdentityOutput {
    signed_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<Identity>,
}

#[derive(Serialize)]
struct ResetOutput {
    email: String,
    requested: bool,
}

fn open_store(dir: Option<&std::path::Path>) -> Result<AuthStore> {
    let storage = Storage::resolve(dir)?;
    storage.init()?;
    let objects = Arc::new(LocalObjectStore::new(storage.objects_dir()));
    let provider = Arc::new(LocalIdentityProvider::new(storage));
    Ok(AuthStore::new(provider)?.with_objects(objects))
}

pub fn run_sign_up(
    options: AuthOptions,
    email: String,
    password: String,
    confirm: Option<String>,
) -> Result<()> {
    let mut store = open_store(options.dir.as_deref())?;
    let confirm = confirm.unwrap_or_else(|| password.clone());
    let identity = store.sign_up(&SignUpForm::new(email, password, confirm))?;

    let mut human = HumanOutput::new("Account created");
    push_identity(&mut human, &identity);
    human.push_next_step("tm add \"<title>\"");
    emit_identity(options, "auth sign-up", Some(identity), &human)
}

pub fn run_sign_in(options: AuthOptions, email: String, password: String) -> Result<()> {
    let mut store = open_store(options.dir.as_deref())?;
    let identity = store.sign_in(&email, &password)?;

    let mut human = HumanOutput::new("Signed in");
    push_identity(&mut human, &identity);
    emit_identity(options, "auth sign-in", Some(identity), &human)
}

pub fn run_sign_out(options: AuthOptions) -> Result<()> {
    let mut store = open_store(options.dir.as_deref())?;
    let previous = store.identity().cloned();
    store.sign_out()?;

    let mut human = HumanOutput::new(if previous.is_some() {
        "Signed out"
    } else {
        "Not signed in"
    });
    if let Some(identity) = &previous {
        human.push_summary("Email", identity.email.clone());
    }
    emit_identity(options, "auth sign-out", None, &human)
}

pub fn run_reset_password(options: AuthOptions, email: String) -> Result<()> {
    let mut store = open_store(options.dir.as_deref())?;
    store.reset_password(&email)?;

    let mut human = HumanOutput::new("Password reset requested");
    human.push_summary("Email", email.trim().to_string());
    let output = ResetOutput {
        email: email.trim().to_string(),
        requested: true,
    };
    emit_success(options.output(), "auth reset-password", &output, Some(&human))
}

pub fn run_profile(options: AuthOptions, name: Option<String>, photo: Option<PathBuf>) -> Result<()> {
    if name.is_none() && photo.is_none() {
        return Err(Error::InvalidArgument(
            "nothing to update (pass --name and/or --photo)".to_string(),
        ));
    }
    let mut store = open_store(options.dir.as_deref())?;
    if store.identity().is_none() {
        return Err(Error::NotSignedIn);
    }
    let identity = store.update_profile(name.as_deref(), photo.as_deref())?;

    let mut human = HumanOutput::new("Profile updated");
    push_identity(&mut human, &identity);
    emit_identity(options, "auth profile", Some(identity), &human)
}

pub fn run_whoami(options: AuthOptions) -> Result<()> {
    let store = open_store(options.dir.as_deref())?;
    let identity = store.identity().cloned();

    let mut human = HumanOutput::new(if identity.is_some() {
        "Signed in"
    } else {
        "Not signed in"
    });
    match &identity {
        Some(identity) => push_identity(&mut human, identity),
        None => human.push_next_step("tm auth sign-in <email>"),
    }
    emit_identity(options, "auth whoami", identity, &human)
}

fn push_identity(human: &mut HumanOutput, identity: &Identity) {
    human.push_summary("Email", identity.email.clone());
    human.push_summary("UID", identity.uid.clone());
    if let Some(name) = &identity.display_name {
        human.push_summary("Name", name.clone());
    }
    if let Some(photo) = &identity.photo_url {
        human.push_summary("Photo", photo.clone());
    }
}

fn emit_identity(
    options: AuthOptions,
    command: &str,
    identity: Option<Identity>,
    human: &HumanOutput,
) -> Result<()> {
    let output = IdentityOutput {
        signed_in: identity.is_some(),
        identity,
    };
    emit_success(options.output(), command, &output, Some(human))
}
