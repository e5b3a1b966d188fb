//! Server configuration from flags and `SFMOCK_*` environment variables.

use crate::facade::OrgSettings;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "sfmock")]
#[command(about = "In-memory Salesforce API emulator for integration tests")]
pub struct MockConfig {
    /// Interface to bind.
    #[arg(long, env = "SFMOCK_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "SFMOCK_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory of `*.json` object schemas.
    #[arg(long, env = "SCHEMA_DIR", default_value = "/app/schemas")]
    pub schema_dir: PathBuf,

    #[arg(long, env = "SFMOCK_API_VERSION", default_value = "59.0")]
    pub api_version: String,

    /// How long an idle CometD connect waits for events, in milliseconds.
    #[arg(long, env = "SFMOCK_LONG_POLL_MS", default_value_t = 0)]
    pub long_poll_ms: u64,

    /// Base URL returned as `instance_url`. Defaults to the bound address.
    #[arg(long, env = "SFMOCK_INSTANCE_URL")]
    pub instance_url: Option<String>,
}

impl MockConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn org_settings(&self) -> OrgSettings {
        let instance_url = self.instance_url.clone().unwrap_or_else(|| {
            let host = if self.host == "0.0.0.0" { "localhost" } else { self.host.as_str() };
            format!("http://{}:{}", host, self.port)
        });
        OrgSettings {
            api_version: self.api_version.trim_start_matches('v').to_string(),
            long_poll: Duration::from_millis(self.long_poll_ms),
            instance_url,
        }
    }
}
