use std::path::{Path, PathBuf};

use serde::Deserialize;

type BoxError = Box<dyn std::error::Error>;

const AUTH_CACHE_FILE: &str = ".ecobee-authcache";
/// Cache file name used by the earlier Go tool.
const LEGACY_AUTH_CACHE_FILE: &str = ".go-ecobee-authcache";

/// Settings read from the config file and `ECOBEE_*` environment variables.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub appid: Option<String>,
    pub thermostat: Option<String>,
    pub authcache: Option<PathBuf>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ecobee-cli").join("config.toml"))
}

/// Load settings; an explicit `path` must exist, the default one need not.
pub fn load(path: Option<&Path>) -> Result<Settings, BoxError> {
    let mut builder = config::Config::builder();
    match path {
        Some(path) => {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        None => {
            if let Some(path) = default_config_path() {
                builder = builder.add_source(
                    config::File::from(path.as_path())
                        .format(config::FileFormat::Toml)
                        .required(false),
                );
            }
        }
    }
    let settings = builder
        .add_source(config::Environment::with_prefix("ECOBEE"))
        .build()?
        .try_deserialize()?;
    Ok(settings)
}

impl Settings {
    /// Flags take precedence over anything loaded.
    pub fn merge(
        self,
        appid: Option<String>,
        thermostat: Option<String>,
        authcache: Option<PathBuf>,
    ) -> Self {
        Self {
            appid: appid.or(self.appid),
            thermostat: thermostat.or(self.thermostat),
            authcache: authcache.or(self.authcache),
        }
    }

    pub fn appid(&self) -> Result<&str, BoxError> {
        self.appid
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "required flag --appid missing".into())
    }

    pub fn thermostat(&self) -> Result<&str, BoxError> {
        self.thermostat
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "required flag --thermostat missing".into())
    }

    pub fn auth_cache(&self) -> Result<PathBuf, BoxError> {
        if let Some(path) = &self.authcache {
            return Ok(path.clone());
        }
        let home = dirs::home_dir().ok_or("Could not determine home directory")?;
        Ok(default_auth_cache(&home))
    }
}

/// `~/.ecobee-authcache`, unless only the Go tool's cache exists.
fn default_auth_cache(home: &Path) -> PathBuf {
    let path = home.join(AUTH_CACHE_FILE);
    let legacy = home.join(LEGACY_AUTH_CACHE_FILE);
    if !path.exists() && legacy.is_file() {
        tracing::debug!(path = %legacy.display(), "using legacy token cache");
        return legacy;
    }
    path
}
