use crate::configuration::Configuration;
use clap::Parser;

/// Collaborative availability grid with a live group heat-map.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct ConfigurationHandler {
    /// Address the HTTP server binds to
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    bind_address: String,

    /// Port the HTTP server listens on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: String,

    /// PostgreSQL connection URL. Availability is kept in memory when omitted
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        Self::parse()
    }
}

impl Configuration for ConfigurationHandler {
    fn bind_address(&self) -> String {
        self.bind_address.clone()
    }

    fn port(&self) -> String {
        self.port.clone()
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }
}
