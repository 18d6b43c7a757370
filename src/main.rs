use std::sync::Arc;

use mbta_relay::config::Config;
use mbta_relay::logging;
use mbta_relay::server::{self, Server};
use mbta_relay::service::RelayService;
use mbta_relay::upstream::Upstream;
use tracing::{Instrument as _, error, info, info_span};

#[tokio::main]
async fn main() {
    // Initialize logging system
    if let Err(e) = logging::init_logging_from_env() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let server = match startup().instrument(info_span!("mbta_relay_startup")).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start: {:#}", e);
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = server.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        }
    }
}

async fn startup() -> anyhow::Result<Server> {
    info!("Starting MBTA relay");

    let config = Config::load()?;
    info!("Loaded configuration: {:?}", config);

    let upstream = Upstream::new(&config)?;
    info!("Relaying to {}", upstream.base());

    let tls_acceptor = config.tls.as_ref().map(server::tls_acceptor).transpose()?;
    let service = RelayService::new(Arc::new(upstream));

    let server = Server::new(config.listen, service, tls_acceptor).await?;
    info!("Server started successfully on {}", config.listen);
    Ok(server)
}
