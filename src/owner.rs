//! Owner identity for task commands.
//!
//! Resolution order:
//! 1) CLI --owner (explicit)
//! 2) TASKMASTER_OWNER environment variable
//! 3) The signed-in identity's uid
//! 4) Config default (owner.default)

use crate::auth::IdentityProvider;
use crate::config::Config;
use crate::error::Result;

pub const OWNER_ENV: &str = "TASKMASTER_OWNER";

/// Where the resolved owner came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerSource {
    Flag,
    Env,
    SignedIn,
    ConfigDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub id: String,
    pub source: OwnerSource,
}

pub fn resolve_owner(
    cli_owner: Option<&str>,
    identity: &dyn IdentityProvider,
    config: &Config,
) -> Result<Owner> {
    let env_owner = std::env::var(OWNER_ENV).ok();
    resolve_with_env(cli_owner, env_owner.as_deref(), identity, config)
}

fn resolve_with_env(
    cli_owner: Option<&str>,
    env_owner: Option<&str>,
    identity: &dyn IdentityProvider,
    config: &Config,
) -> Result<Owner> {
    if let Some(id) = non_empty(cli_owner) {
        return Ok(Owner::new(id, OwnerSource::Flag));
    }
    if let Some(id) = non_empty(env_owner) {
        return Ok(Owner::new(id, OwnerSource::Env));
    }
    if let Some(identity) = identity.current()? {
        return Ok(Owner::new(&identity.uid, OwnerSource::SignedIn));
    }
    Ok(Owner::new(config.owner.default.trim(), OwnerSource::ConfigDefault))
}

impl Owner {
    fn new(id: &str, source: OwnerSource) -> Self {
        Self {
            id: id.to_string(),
            source,
        }
    }
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::auth::LocalIdentityProvider;
    use crate::storage::Storage;

    #[test]
    fn precedence_flag_env_session_default() {
        let temp = TempDir::new().unwrap();
        let provider = LocalIdentityProvider::new(Storage::new(temp.path()));
        let config = Config::default();

        let owner = resolve_with_env(None, None, &provider, &config).unwrap();
        assert_eq!(owner, Owner::new("local", OwnerSource::ConfigDefault));

        let identity = provider.sign_up("ada@example.com", "hunter22").unwrap();
        let owner = resolve_with_env(Some("  "), None, &provider, &config).unwrap();
        assert_eq!(owner, Owner::new(&identity.uid, OwnerSource::SignedIn));

        let owner = resolve_with_env(None, Some("env-user"), &provider, &config).unwrap();
        assert_eq!(owner.source, OwnerSource::Env);

        let owner = resolve_with_env(Some(" flag-user "), Some("env-user"), &provider, &config).unwrap();
        assert_eq!(owner, Owner::new("flag-user", OwnerSource::Flag));
    }
}
