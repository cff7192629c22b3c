//! Config module for keyfetch

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};

use crate::{catalog::SortKey, client::SearchSort};

#[derive(Parser, Debug, Clone)]
pub struct ServerConfig {
    #[clap(long, env = "KWD_HOST", default_value = "0.0.0.0:3000")]
    pub host: String,

    /// JSON object mapping each keyword to the URLs it resolves to
    #[clap(long, env = "KWD_KEYWORDS_FILE", default_value = "data.json")]
    pub keywords_file: PathBuf,

    /// Directory served for any path outside of `/api`
    #[clap(long, env = "KWD_STATIC_DIR", default_value = "client")]
    pub static_dir: PathBuf,

    /// Hard deadline for a single upstream fetch, in seconds
    #[clap(long, env = "KWD_UPSTREAM_TIMEOUT", default_value_t = 30)]
    pub upstream_timeout: u64,
}

impl ServerConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ClientConfig {
    #[clap(long, env = "KWD_SERVER_URL", default_value = "http://localhost:3000")]
    pub server_url: url::Url,

    /// Where both storage tiers keep their data
    #[clap(long, env = "KWD_DATA_DIR", default_value_t = get_default_data_dir())]
    pub data_dir: String,

    /// Total capacity of the small tier, counted in characters of keys and values
    #[clap(long, env = "KWD_SMALL_STORE_CAPACITY", default_value_t = 5 * 1024 * 1024)]
    pub small_store_capacity: usize,

    /// Endpoint of the large tier, defaults to a SurrealKV database inside the data dir
    #[clap(long, env = "KWD_DATABASE_URL")]
    pub database_url: Option<String>,

    #[clap(long, env = "KWD_SURREAL_NAMESPACE", default_value = "keyfetch")]
    pub db_namespace: String,

    #[clap(long, env = "KWD_SURREAL_DATABASE", default_value = "keyfetch")]
    pub db_database: String,
}

/// Safely determine the default data directory
fn get_default_data_dir() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("keyfetch"))
        .and_then(|path| path.to_str().map(String::from))
        .unwrap_or_else(|| "./keyfetch-data".to_string())
}

impl ClientConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().into()
    }

    pub fn small_store_path(&self) -> PathBuf {
        self.data_dir().join("small.json")
    }

    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!("surrealkv://{}", self.data_dir().join("blobs").display())
        })
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the keyword lookup service and download proxy
    Serve(ServerConfig),
    /// List every keyword the server knows about
    Keywords,
    /// Resolve a keyword into its URLs
    Search {
        keyword: String,
        #[clap(long, value_enum, default_value = "name-asc")]
        sort: SearchSort,
    },
    /// Download URLs through the proxy and save them locally
    Download {
        urls: Vec<String>,
        /// Download every URL the keyword resolves to
        #[clap(long, short)]
        keyword: Option<String>,
    },
    /// Show saved files from both storage tiers
    List {
        #[clap(long, value_enum, default_value = "name-asc")]
        sort: SortKey,
    },
    /// Write a saved file out and report how it should be presented
    View {
        url: String,
        #[clap(long, short)]
        out: Option<PathBuf>,
    },
    /// Remove a saved file
    Delete {
        url: String,
        /// Skip the confirmation prompt
        #[clap(long, short)]
        yes: bool,
    },
}

#[derive(Parser, Debug, Clone)]
#[clap(name = "keyfetch", version, about)]
pub struct Config {
    #[clap(flatten)]
    pub client: ClientConfig,

    #[clap(subcommand)]
    pub command: Command,
}

pub fn config() -> Config {
    Config::parse()
}
