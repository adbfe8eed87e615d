use std::{
    borrow::Cow,
    collections::HashMap,
    fmt, io,
    path::{Path, PathBuf},
};

use rust_cli_config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;
use crate::shared::ValidationError;

/// Directory containing optional configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Supported extensions for base and environment configuration files.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Trait implemented by configuration structures loaded through [`load_config`].
pub trait Config: DeserializeOwned {
    /// Checks invariants that deserialization alone cannot express.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Identifies which configuration file is currently being loaded.
#[derive(Debug, Clone, Copy)]
enum ConfigFileKind {
    /// Base configuration shared by every environment.
    Base,
    /// Environment-specific overrides (dev/prod).
    Environment(Environment),
}

impl ConfigFileKind {
    fn stem(&self) -> Cow<'static, str> {
        match self {
            ConfigFileKind::Base => Cow::Borrowed("base"),
            ConfigFileKind::Environment(env) => Cow::Borrowed(env.as_str()),
        }
    }
}

impl fmt::Display for ConfigFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileKind::Base => f.write_str("base configuration"),
            ConfigFileKind::Environment(env) => write!(f, "{env} environment configuration"),
        }
    }
}

/// Errors that can occur while loading configuration files and environment variables.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// Failed to determine the current working directory.
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// A configuration file existed but could not be parsed.
    #[error("failed to load {kind_description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        kind_description: String,
        path: PathBuf,
        source: rust_cli_config::ConfigError,
    },

    /// The sources were merged but deserialization failed, e.g. a required variable is missing.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),

    /// Failed to determine the runtime environment (`APP_ENVIRONMENT`).
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    /// Failed to build the merged configuration.
    #[error("failed to initialize configuration builder: {0}")]
    Builder(#[source] rust_cli_config::ConfigError),

    /// The configuration was deserialized but is invalid.
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

/// Loads and validates configuration for the current process.
///
/// A `.env` file in the working directory is applied to the process environment first, if one
/// exists. Then `configuration/base.(yaml|yml|json)` and `configuration/{environment}.(yaml|yml|json)`
/// are layered when present, and finally process environment variables override them. Variable
/// names map to keys case-insensitively, so `AWS_REGION` sets `aws_region`.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config,
{
    // A missing `.env` file is the normal case in deployed environments.
    let _ = dotenv::dotenv();

    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load()?;

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment, None)
}

/// Loads and validates configuration from an explicit directory and variable set.
///
/// When `variables` is [`None`] the process environment is read; otherwise only the supplied
/// variables are used, which keeps tests independent from the host environment.
pub fn load_config_from<T>(
    configuration_directory: &Path,
    environment: Environment,
    variables: Option<HashMap<String, String>>,
) -> Result<T, LoadConfigError>
where
    T: Config,
{
    let mut builder = rust_cli_config::Config::builder();

    if configuration_directory.is_dir() {
        for kind in [
            ConfigFileKind::Base,
            ConfigFileKind::Environment(environment),
        ] {
            let Some(path) = find_configuration_file(configuration_directory, kind) else {
                continue;
            };

            builder = builder.add_source(rust_cli_config::File::from(path.clone()));
            validate_configuration_source(&builder, kind, &path)?;
        }
    }

    let environment_source = rust_cli_config::Environment::default().source(variables);
    let settings = builder
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    let config = settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)?;
    config.validate()?;

    Ok(config)
}

/// Finds the configuration file that matches the requested kind, if any.
fn find_configuration_file(directory: &Path, kind: ConfigFileKind) -> Option<PathBuf> {
    let stem = kind.stem();

    CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .find(|path| path.is_file())
}

fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    kind: ConfigFileKind,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            kind_description: kind.to_string(),
            path: path.to_path_buf(),
            source,
        })
        .map(|_| ())
}
