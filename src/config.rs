use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::{env, path::PathBuf, str::FromStr};

/// Command-line interface: the server plus a small client for it.
#[derive(Parser, Debug)]
#[command(author, version, about = "File upload gateway in front of object-storage buckets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Upload files; directories are uploaded one file at a time
    Upload {
        #[command(flatten)]
        client: ClientArgs,
        /// Files or directories to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Explicit key for a single file upload
        #[arg(long)]
        name: Option<String>,
    },
    /// List one page of a folder
    Ls {
        #[command(flatten)]
        client: ClientArgs,
        /// Folder prefix, e.g. `photos/2025/`
        #[arg(default_value = "")]
        prefix: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        cursor: Option<String>,
        /// Also list every folder below the prefix
        #[arg(long, short)]
        recursive: bool,
    },
    /// Download an object
    Get {
        #[command(flatten)]
        client: ClientArgs,
        key: String,
        /// Destination file (defaults to the key's base name)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete an object
    Rm {
        #[command(flatten)]
        client: ClientArgs,
        key: String,
    },
    /// List buckets
    Buckets {
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Payloads on local disk, metadata in SQLite
    Fs,
    /// Process memory; everything is lost on exit
    Memory,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fs" => Ok(Self::Fs),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown backend `{other}` (expected `fs` or `memory`)"),
        }
    }
}

/// Server flags; each overrides the matching environment variable.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Host to bind to (overrides GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bearer token clients must present (overrides API_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Comma-separated CORS allow-list (overrides ALLOWED_ORIGINS)
    #[arg(long)]
    pub allowed_origins: Option<String>,

    /// Bucket to serve; repeat for several (overrides GATEWAY_BUCKETS)
    #[arg(long = "bucket")]
    pub buckets: Vec<String>,

    /// Bucket used when a request names none (overrides GATEWAY_DEFAULT_BUCKET)
    #[arg(long)]
    pub default_bucket: Option<String>,

    /// Storage backend (overrides GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Directory where payloads are stored (overrides GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata database URL (overrides GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Largest accepted upload in MiB (overrides GATEWAY_MAX_UPLOAD_MB)
    #[arg(long)]
    pub max_upload_mb: Option<u64>,
}

/// Connection flags shared by the client subcommands.
#[derive(Args, Debug, Default, Clone)]
pub struct ClientArgs {
    /// Gateway base URL (overrides GATEWAY_URL)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Bearer token (overrides API_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Bucket to operate on; the server default when omitted
    #[arg(long)]
    pub bucket: Option<String>,
}

/// Centralized server configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub api_token: Option<String>,
    pub allowed_origins: String,
    pub buckets: Vec<String>,
    pub default_bucket: Option<String>,
    pub backend: BackendKind,
    pub storage_dir: String,
    pub database_url: String,
    pub max_upload_bytes: u64,
}

impl AppConfig {
    /// Merge CLI args over environment variables over defaults.
    pub fn from_env_and_args(args: ServeArgs) -> Result<Self> {
        let env_host = env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("GATEWAY_PORT", 8787u16)?;
        let env_backend = parse_env("GATEWAY_BACKEND", BackendKind::Fs)?;
        let env_max_mb = parse_env("GATEWAY_MAX_UPLOAD_MB", 100u64)?;
        let env_origins = env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "*".into());
        let env_storage =
            env::var("GATEWAY_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("GATEWAY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/gateway.db".into());

        let buckets = if args.buckets.is_empty() {
            env::var("GATEWAY_BUCKETS")
                .map(|list| split_list(&list))
                .unwrap_or_default()
        } else {
            args.buckets
        };
        let buckets = if buckets.is_empty() {
            vec!["files".to_string()]
        } else {
            buckets
        };

        let max_upload_mb = args.max_upload_mb.unwrap_or(env_max_mb);

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            api_token: args
                .token
                .or_else(|| env::var("API_TOKEN").ok())
                .filter(|t| !t.is_empty()),
            allowed_origins: args.allowed_origins.unwrap_or(env_origins),
            buckets,
            default_bucket: args
                .default_bucket
                .or_else(|| env::var("GATEWAY_DEFAULT_BUCKET").ok())
                .filter(|b| !b.is_empty()),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            max_upload_bytes: max_upload_mb
                .checked_mul(1024 * 1024)
                .context("GATEWAY_MAX_UPLOAD_MB is too large")?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where a client subcommand talks to.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub token: Option<String>,
    pub bucket: Option<String>,
}

impl ClientConfig {
    pub fn from_env_and_args(args: ClientArgs) -> Self {
        Self {
            endpoint: args
                .endpoint
                .or_else(|| env::var("GATEWAY_URL").ok())
                .unwrap_or_else(|| "http://127.0.0.1:8787".into()),
            token: args
                .token
                .or_else(|| env::var("API_TOKEN").ok())
                .filter(|t| !t.is_empty()),
            bucket: args.bucket.filter(|b| !b.is_empty()),
        }
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("parsing {name} value `{value}`")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {name}")),
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_win_over_defaults() {
        let cfg = AppConfig::from_env_and_args(ServeArgs {
            host: Some("127.0.0.1".into()),
            port: Some(9000),
            buckets: vec!["photos".into(), "docs".into()],
            backend: Some(BackendKind::Memory),
            max_upload_mb: Some(5),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.buckets, vec!["photos", "docs"]);
        assert_eq!(cfg.backend, BackendKind::Memory);
        assert_eq!(cfg.max_upload_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn parses_backend_names() {
        assert_eq!("FS".parse::<BackendKind>().unwrap(), BackendKind::Fs);
        assert!("s3".parse::<BackendKind>().is_err());
    }

    #[test]
    fn splits_comma_lists() {
        assert_eq!(split_list(" a, ,b ,"), vec!["a", "b"]);
    }

    #[test]
    fn parses_recursive_listing() {
        let cli = Cli::try_parse_from(["upload-gateway", "ls", "-r", "photos/"]).unwrap();
        match cli.command {
            Command::Ls {
                prefix, recursive, ..
            } => {
                assert_eq!(prefix, "photos/");
                assert!(recursive);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_client_subcommands() {
        let cli = Cli::try_parse_from([
            "upload-gateway",
            "upload",
            "--endpoint",
            "http://localhost:1",
            "--bucket",
            "docs",
            "a.txt",
            "photos",
        ])
        .unwrap();
        match cli.command {
            Command::Upload { client, paths, .. } => {
                assert_eq!(client.bucket.as_deref(), Some("docs"));
                assert_eq!(paths.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
