use group_availability::{
    configuration::Configuration, configuration_handler::ConfigurationHandler, http::create_app,
    local_availability::LocalAvailability,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "postgres")]
async fn connect(database_url: &str) -> group_availability::database_interface::DatabaseInterface {
    use group_availability::database_interface::DatabaseInterface;
    use std::time::Duration;
    use tokio::time::sleep;
    use tracing::error;

    loop {
        match DatabaseInterface::new(database_url) {
            Ok(backend) => {
                info!("Successfully connected to database");
                break backend;
            }
            Err(err) => {
                error!(?err, "Failed to establish database connection: {database_url}. Retry in 1 sec. Start without a database URL to keep events in memory.");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let configuration = ConfigurationHandler::parse_arguments();

    let address = format!("{}:{}", configuration.bind_address(), configuration.port());
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Group availability accessible at {address}");

    let app = match configuration.database_url() {
        #[cfg(feature = "postgres")]
        Some(database_url) => create_app(connect(&database_url).await),
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            warn!("Built without the postgres feature, ignoring the database URL and keeping events in memory");
            create_app(LocalAvailability::default())
        }
        None => {
            warn!("No database URL given, events are kept in memory only");
            create_app(LocalAvailability::default())
        }
    };

    axum::serve(listener, app).await?;
    Ok(())
}
