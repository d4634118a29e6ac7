use crate::config::ProvisionerConfig;
use crate::error::ProvisionResult;
use crate::logging::LogFormat;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "karmabot-provisioner",
    version,
    about = "Declares the karmabot collection indexes on MongoDB",
    long_about = "Creates, if absent, the indexes the karmabot records are queried by:\n  \
    expires (TTL, expireAfterSeconds = 0), subject, type, gifter and date.\n\n\
    Declarations are idempotent: running the provisioner again is a no-op.",
    after_help = "Examples:\n  \
    karmabot-provisioner\n  \
    karmabot-provisioner --mongodb-uri mongodb://mongo:27017\n  \
    karmabot-provisioner --config-file karmabot.yaml --verify-only"
)]
pub struct Cli {
    /// Path to a YAML configuration file
    ///
    /// Values given as flags or environment variables take precedence over the file.
    #[arg(env = "KARMABOT_CONFIG_FILE", long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// The connection string to the MongoDB server.
    #[arg(env = "KARMABOT_MONGODB_URI", long, value_name = "URI")]
    pub mongodb_uri: Option<String>,

    /// The name of the database.
    #[arg(env = "KARMABOT_DATABASE_NAME", long, value_name = "NAME")]
    pub database_name: Option<String>,

    /// The name of the collection the indexes are declared on.
    #[arg(env = "KARMABOT_COLLECTION_NAME", long, value_name = "NAME")]
    pub collection_name: Option<String>,

    /// MongoDB connect timeout in seconds.
    #[arg(env = "KARMABOT_CONNECT_TIMEOUT_SECS", long, value_name = "SECS")]
    pub connect_timeout_secs: Option<u64>,

    /// MongoDB server selection timeout in seconds.
    #[arg(env = "KARMABOT_SERVER_SELECTION_TIMEOUT_SECS", long, value_name = "SECS")]
    pub server_selection_timeout_secs: Option<u64>,

    /// Only compare the existing indexes with the declared ones, create nothing.
    #[arg(long)]
    pub verify_only: bool,

    /// Log output format.
    #[arg(env = "LOG_FORMAT", long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Builds the effective config: flags and env, then the config file, then defaults.
    pub fn to_config(&self) -> ProvisionResult<ProvisionerConfig> {
        let mut config = match &self.config_file {
            Some(path) => ProvisionerConfig::from_yaml_file(path)?,
            None => ProvisionerConfig::default(),
        };

        if let Some(uri) = &self.mongodb_uri {
            config.mongodb_uri = uri.clone();
        }
        if let Some(database_name) = &self.database_name {
            config.database_name = database_name.clone();
        }
        if let Some(collection_name) = &self.collection_name {
            config.collection_name = collection_name.clone();
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.server_selection_timeout_secs {
            config.server_selection_timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProvisionError;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_no_arguments_targets_defaults() {
        let cli = Cli::try_parse_from(["karmabot-provisioner"]).unwrap();
        assert!(!cli.verify_only);

        let config = cli.to_config().unwrap();
        assert_eq!(config.database_name, "karmabot");
        assert_eq!(config.collection_name, "karmabot");
        assert!(!config.mongodb_uri.is_empty());
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mongodb_uri: mongodb://from-file:27017").unwrap();
        writeln!(file, "database_name: from_file").unwrap();

        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from([
            "karmabot-provisioner",
            "--config-file",
            path,
            "--database-name",
            "from_flag",
            "--server-selection-timeout-secs",
            "2",
        ])
        .unwrap();

        let config = cli.to_config().unwrap();
        assert_eq!(config.mongodb_uri, "mongodb://from-file:27017");
        assert_eq!(config.database_name, "from_flag");
        assert_eq!(config.collection_name, "karmabot");
        assert_eq!(config.server_selection_timeout_secs, 2);
    }

    #[rstest]
    #[case("pretty", LogFormat::Pretty)]
    #[case("json", LogFormat::Json)]
    fn test_log_format(#[case] value: &str, #[case] expected: LogFormat) {
        let cli = Cli::try_parse_from(["karmabot-provisioner", "--log-format", value]).unwrap();
        assert_eq!(cli.log_format, expected);
    }

    #[test]
    fn test_invalid_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["karmabot-provisioner", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let cli = Cli::try_parse_from(["karmabot-provisioner", "--connect-timeout-secs", "0"]).unwrap();
        assert_matches!(cli.to_config(), Err(ProvisionError::InvalidConfig(_)));
    }
}
