use std::{
    collections::BTreeSet,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::cli::ServeArgs;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DURATION_SECS: u64 = 150;
pub const DEFAULT_ADMIN: &str = "admin";

/// Settings fixed for the lifetime of one server run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub voting_duration: Duration,
    pub admin_users: BTreeSet<String>,
    pub initial_options: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            voting_duration: Duration::from_secs(DEFAULT_DURATION_SECS),
            admin_users: BTreeSet::from([DEFAULT_ADMIN.to_string()]),
            initial_options: Vec::new(),
        }
    }
}

/// On-disk form. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub voting_duration_seconds: Option<u64>,
    pub admin_users: Option<Vec<String>>,
    pub initial_options: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl ServerConfig {
    /// Builds the configuration from `serve` flags, reading the JSON file they
    /// point at, if any.
    pub fn from_args(args: &ServeArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, args)
    }

    /// Layers defaults, then file values, then flags.
    pub fn resolve(file: FileConfig, args: &ServeArgs) -> Result<Self> {
        let defaults = Self::default();

        let ip = args.bind.unwrap_or(defaults.listen.ip());
        let port = args.port.or(file.port).unwrap_or(DEFAULT_PORT);
        let duration_secs = args
            .duration_secs
            .or(file.voting_duration_seconds)
            .unwrap_or(DEFAULT_DURATION_SECS);
        ensure!(duration_secs > 0, "voting duration must be at least one second");

        let admin_users = if !args.admins.is_empty() {
            args.admins.iter().cloned().collect()
        } else if let Some(admins) = file.admin_users {
            admins.into_iter().collect()
        } else {
            defaults.admin_users
        };

        let initial_options = if !args.options.is_empty() {
            args.options.clone()
        } else {
            file.initial_options.unwrap_or_default()
        };
        ensure!(
            initial_options.iter().all(|option| is_valid_option(option)),
            "option names must be non-empty and contain no whitespace"
        );

        Ok(Self {
            listen: SocketAddr::new(ip, port),
            voting_duration: Duration::from_secs(duration_secs),
            admin_users,
            initial_options,
        })
    }
}

/// Options travel as a single command token, so they cannot hold whitespace.
fn is_valid_option(option: &str) -> bool {
    !option.is_empty() && !option.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_without_file_or_flags() {
        let config = ServerConfig::resolve(FileConfig::default(), &ServeArgs::default())
            .expect("defaults are valid");
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.listen.port(), 5000);
        assert_eq!(config.voting_duration, Duration::from_secs(150));
        assert!(config.admin_users.contains("admin"));
    }

    #[test]
    fn flags_override_file_values() {
        let file = FileConfig::parse(
            r#"{
                "port": 6000,
                "votingDurationSeconds": 30,
                "adminUsers": ["root"],
                "initialOptions": ["red", "blue"]
            }"#,
        )
        .expect("valid json");
        let args = ServeArgs {
            port: Some(7000),
            options: vec!["pizza".into()],
            ..ServeArgs::default()
        };

        let config = ServerConfig::resolve(file, &args).expect("valid config");
        assert_eq!(config.listen.port(), 7000);
        assert_eq!(config.voting_duration, Duration::from_secs(30));
        assert_eq!(config.admin_users, BTreeSet::from(["root".to_string()]));
        assert_eq!(config.initial_options, vec!["pizza"]);
    }

    #[test]
    fn rejects_unknown_keys_and_zero_duration() {
        assert!(FileConfig::parse(r#"{"prot": 1}"#).is_err());

        let args = ServeArgs {
            duration_secs: Some(0),
            ..ServeArgs::default()
        };
        assert!(ServerConfig::resolve(FileConfig::default(), &args).is_err());
    }

    #[test]
    fn rejects_options_with_whitespace() {
        let args = ServeArgs {
            options: vec!["ice cream".into()],
            ..ServeArgs::default()
        };
        assert!(ServerConfig::resolve(FileConfig::default(), &args).is_err());
    }

    #[test]
    fn loads_file_named_by_flag() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"adminUsers": ["alice", "bob"]}}"#).expect("write config");

        let args = ServeArgs {
            config: Some(file.path().to_path_buf()),
            ..ServeArgs::default()
        };
        let config = ServerConfig::from_args(&args).expect("valid config");
        assert_eq!(config.admin_users.len(), 2);
        assert!(config.admin_users.contains("bob"));
    }

    #[test]
    fn missing_file_reports_path() {
        let args = ServeArgs {
            config: Some("/nonexistent/voting.json".into()),
            ..ServeArgs::default()
        };
        let err = ServerConfig::from_args(&args).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/voting.json"));
    }
}
