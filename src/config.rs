use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3306;

/// Command line flags. Every connection setting can also come from the
/// environment or from the TOML config file; flags and env win over the file.
#[derive(Debug, Default, Parser)]
#[command(name = "mcp-server-mysql-schema", version, about = "MySQL schema MCP server")]
pub struct Args {
    /// Env file loaded before anything else; defaults to `.env` in the working directory
    #[arg(long)]
    pub envpath: Option<PathBuf>,

    /// TOML file with connection settings
    #[arg(long, env = "MCP_MYSQL_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "DB_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "DB_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "DB_USER")]
    pub user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, env = "DB_NAME")]
    pub database: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to load env file {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },

    #[error("Missing required setting '{field}'. Pass --{field}, set {env}, or add it to the config file.")]
    Missing {
        field: &'static str,
        env: &'static str,
    },
}

/// Settings as they appear in the config file. All optional so the file can
/// be partial and topped up from flags or the environment.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    #[serde(alias = "username")]
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
}

/// Where to reach the database. Built once at startup and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: password.into(),
            database: database.into(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".into());
    PathBuf::from(home)
        .join(".config")
        .join("mcp-server-mysql")
        .join("config.toml")
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Pull `--envpath` out of raw command line arguments. The env file has to
/// be loaded before clap parses, so `DB_*` values from it are visible.
pub fn envpath_arg<I, S>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        if let Some(path) = arg.strip_prefix("--envpath=") {
            return Some(PathBuf::from(path));
        }
        if arg == "--envpath" {
            return args.next().map(|path| PathBuf::from(path.as_ref()));
        }
    }
    None
}

/// Load variables from an env file into the process environment. Variables
/// already set are left alone.
///
/// An explicit path must exist; `.env` in the working directory is only read
/// when present. Returns the file that was loaded, if any.
pub fn load_env_file(envpath: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    match envpath {
        Some(path) => dotenvy::from_path(path)
            .map(|()| Some(path.to_path_buf()))
            .map_err(|source| ConfigError::EnvFile {
                path: path.to_path_buf(),
                source,
            }),
        None => match dotenvy::dotenv() {
            Ok(path) => Ok(Some(path)),
            Err(e) if e.not_found() => Ok(None),
            Err(source) => Err(ConfigError::EnvFile {
                path: PathBuf::from(".env"),
                source,
            }),
        },
    }
}

/// Resolve the connection settings.
///
/// An explicit `--config` file must exist; the default file under
/// `~/.config/mcp-server-mysql/` is only read when present.
pub fn load(args: &Args) -> Result<ConnectionConfig, ConfigError> {
    let file = match &args.config {
        Some(path) => read_file(path)?,
        None => {
            let path = config_path();
            if path.is_file() {
                read_file(&path)?
            } else {
                FileConfig::default()
            }
        }
    };
    merge(args, file)
}

fn merge(args: &Args, file: FileConfig) -> Result<ConnectionConfig, ConfigError> {
    let user = args.user.clone().or(file.user).ok_or(ConfigError::Missing {
        field: "user",
        env: "DB_USER",
    })?;
    let database = args
        .database
        .clone()
        .or(file.database)
        .ok_or(ConfigError::Missing {
            field: "database",
            env: "DB_NAME",
        })?;

    Ok(ConnectionConfig {
        host: args
            .host
            .clone()
            .or(file.host)
            .unwrap_or_else(|| DEFAULT_HOST.into()),
        port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
        user,
        password: args.password.clone().or(file.password).unwrap_or_default(),
        database,
    })
}
