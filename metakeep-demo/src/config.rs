//! Environment-driven demo configuration.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use metakeep_connector::sdk::{Environment, User};

/// Web3 modal project id.
pub const MODAL_PROJECT_ID_VAR: &str = "MODAL_PROJECT_ID";

/// MetaKeep application id.
pub const METAKEEP_APP_ID_VAR: &str = "METAKEEP_APP_ID";

/// Optional email of the wallet's end user.
pub const METAKEEP_USER_EMAIL_VAR: &str = "METAKEEP_USER_EMAIL";

/// Optional phone number of the wallet's end user, used when no email is set.
pub const METAKEEP_USER_PHONE_VAR: &str = "METAKEEP_USER_PHONE";

/// MetaKeep backend environment (`dev` or `production`).
pub const METAKEEP_ENVIRONMENT_VAR: &str = "METAKEEP_ENVIRONMENT";

/// Optional override of the data directory.
pub const DATA_DIR_VAR: &str = "METAKEEP_DEMO_DIR";

/// Settings the demo reads at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Modal project id.
    pub modal_project_id: String,
    /// MetaKeep application id.
    pub app_id: String,
    /// MetaKeep backend environment.
    pub environment: Environment,
    /// End-user email handed to the SDK.
    pub user_email: Option<String>,
    /// End-user phone handed to the SDK.
    pub user_phone: Option<String>,
    /// Where persistent host storage lives.
    pub data_dir: PathBuf,
}

impl DemoConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    ///
    /// Both ids are required; a missing or blank one aborts startup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            let value = lookup(key)
                .with_context(|| format!("{key} is not set"))?
                .trim()
                .to_owned();
            if value.is_empty() {
                bail!("{key} is empty");
            }
            Ok(value)
        };

        let modal_project_id = required(MODAL_PROJECT_ID_VAR)?;
        let app_id = required(METAKEEP_APP_ID_VAR)?;
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let environment = match optional(METAKEEP_ENVIRONMENT_VAR) {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| anyhow!("{METAKEEP_ENVIRONMENT_VAR}: {e}"))?,
            None => Environment::default(),
        };
        let user_email = optional(METAKEEP_USER_EMAIL_VAR);
        let user_phone = optional(METAKEEP_USER_PHONE_VAR);
        let data_dir = lookup(DATA_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        Ok(Self {
            modal_project_id,
            app_id,
            environment,
            user_email,
            user_phone,
            data_dir,
        })
    }

    /// The end user handed to the SDK; email wins over phone.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.user_email
            .as_ref()
            .map(User::email)
            .or_else(|| self.user_phone.as_ref().map(User::phone))
    }

    /// Path of the persistent host storage file.
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join("storage.json")
    }
}

fn default_data_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".metakeep-demo")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_requires_both_ids() {
        let err = DemoConfig::from_lookup(lookup(&[(METAKEEP_APP_ID_VAR, "app")])).unwrap_err();
        assert!(err.to_string().contains(MODAL_PROJECT_ID_VAR));

        let err =
            DemoConfig::from_lookup(lookup(&[(MODAL_PROJECT_ID_VAR, "project")])).unwrap_err();
        assert!(err.to_string().contains(METAKEEP_APP_ID_VAR));

        let err = DemoConfig::from_lookup(lookup(&[
            (MODAL_PROJECT_ID_VAR, "project"),
            (METAKEEP_APP_ID_VAR, "   "),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_loads_optional_values() {
        let config = DemoConfig::from_lookup(lookup(&[
            (MODAL_PROJECT_ID_VAR, "project"),
            (METAKEEP_APP_ID_VAR, " app "),
            (METAKEEP_USER_EMAIL_VAR, "user@example.com"),
            (DATA_DIR_VAR, "/tmp/metakeep"),
        ]))
        .unwrap();

        assert_eq!(config.modal_project_id, "project");
        assert_eq!(config.app_id, "app");
        assert_eq!(config.user_email.as_deref(), Some("user@example.com"));
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.user(), Some(User::email("user@example.com")));
        assert_eq!(config.storage_path(), PathBuf::from("/tmp/metakeep/storage.json"));
    }

    #[test]
    fn test_environment_and_phone_user() {
        let config = DemoConfig::from_lookup(lookup(&[
            (MODAL_PROJECT_ID_VAR, "project"),
            (METAKEEP_APP_ID_VAR, "app"),
            (METAKEEP_ENVIRONMENT_VAR, "dev"),
            (METAKEEP_USER_EMAIL_VAR, " "),
            (METAKEEP_USER_PHONE_VAR, "+15550100"),
        ]))
        .unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.user_email, None);
        assert_eq!(config.user(), Some(User::phone("+15550100")));
    }

    #[test]
    fn test_rejects_unknown_environment() {
        let err = DemoConfig::from_lookup(lookup(&[
            (MODAL_PROJECT_ID_VAR, "project"),
            (METAKEEP_APP_ID_VAR, "app"),
            (METAKEEP_ENVIRONMENT_VAR, "staging"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(METAKEEP_ENVIRONMENT_VAR));
    }
}
