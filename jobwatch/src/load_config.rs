/// `load_config` module: loads the static YAML settings and injects secrets from the environment.
///
/// This is the only place where the user-supplied YAML is parsed into
/// [`Settings`] and where credentials are read.
///
/// # Responsibilities
/// - Parse the YAML file into typed settings (serde defaults fill the gaps)
/// - Validate settings that parse but cannot run
/// - Read `GEMINI_API_KEY`, `GMAIL_EMAIL` and `GMAIL_APP_PASSWORD`, reporting
///   every missing variable in a single error
///
/// # Errors
/// All errors are `anyhow::Error` with enough context for the CLI to print.
use anyhow::{Context, Result};
use jobwatch_core::config::Settings;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const GMAIL_EMAIL: &str = "GMAIL_EMAIL";
pub const GMAIL_APP_PASSWORD: &str = "GMAIL_APP_PASSWORD";
/// Set by GitHub Actions on every runner.
pub const GITHUB_ACTIONS: &str = "GITHUB_ACTIONS";

/// Credentials injected from the environment.
#[derive(Clone)]
pub struct Secrets {
    pub gemini_api_key: String,
    pub gmail_email: String,
    pub gmail_app_password: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("gemini_api_key", &"<redacted>")
            .field("gmail_email", &self.gmail_email)
            .field("gmail_app_password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub struct RunConfig {
    pub settings: Settings,
    pub secrets: Secrets,
}

/// Loads and validates the YAML settings only. No environment access.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let settings: Settings = match serde_yaml::from_str(&content) {
        Ok(settings) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            settings
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    settings
        .validate()
        .with_context(|| format!("Invalid config {}", path_ref.display()))?;
    settings.trace_loaded();
    Ok(settings)
}

/// Loads the YAML settings and the three required secrets, and records
/// whether the run happens inside GitHub Actions.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
    let mut settings = load_settings(path)?;
    let secrets = secrets_from_env()?;
    settings.github_actions = std::env::var_os(GITHUB_ACTIONS).is_some();
    info!(
        sender = %secrets.gmail_email,
        github_actions = settings.github_actions,
        "Config loaded and merged with environment successfully"
    );
    Ok(RunConfig { settings, secrets })
}

fn secrets_from_env() -> Result<Secrets> {
    let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

    let gemini_api_key = read(GEMINI_API_KEY);
    let gmail_email = read(GMAIL_EMAIL);
    let gmail_app_password = read(GMAIL_APP_PASSWORD);

    match (gemini_api_key, gmail_email, gmail_app_password) {
        (Some(gemini_api_key), Some(gmail_email), Some(gmail_app_password)) => Ok(Secrets {
            gemini_api_key,
            gmail_email,
            gmail_app_password,
        }),
        (key, email, password) => {
            let missing: Vec<&str> = [
                (GEMINI_API_KEY, key.is_none()),
                (GMAIL_EMAIL, email.is_none()),
                (GMAIL_APP_PASSWORD, password.is_none()),
            ]
            .into_iter()
            .filter(|(_, absent)| *absent)
            .map(|(name, _)| name)
            .collect();
            error!(?missing, "Missing environment variables");
            anyhow::bail!("Missing required environment variables: {}", missing.join(", "))
        }
    }
}
