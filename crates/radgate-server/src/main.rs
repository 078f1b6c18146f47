use clap::Parser;
use radgate_server::{
    Config, NasRegistration, NodeId, RadiusServer, RequestLogger, ServerConfig,
    SimpleAuthHandler, StaticNasRegistry,
};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Distributed RADIUS server (RFC 2865/2866/3576)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "radgate")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start server)
    #[arg(short, long)]
    validate: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if cli.validate {
                eprintln!("Configuration validation failed: {}", e);
                process::exit(1);
            }

            warn!("Could not load config file from: {}", cli.config_path);
            info!("Creating example configuration at: {}", cli.config_path);

            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }

            info!("Please edit {} and restart the server", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        println!("Configuration validated successfully");
        println!();
        println!("Configuration summary:");
        println!("  Listen: {}:{}", config.listen_address, config.listen_port);
        println!("  NASes: {}", config.nases.len());
        println!("  Users: {}", config.users.len());
        println!("  Reply retention: {} ms", config.resend_timeout_ms);
        println!(
            "  Log level: {}",
            config.log_level.as_deref().unwrap_or("info")
        );
        if let Some(ref path) = config.request_log_path {
            println!("  Request log: {}", path);
        }
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("radgate v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    let mut handler = SimpleAuthHandler::new();
    for user in &config.users {
        handler.add_user(&user.username, &user.password);
    }
    let handler = Arc::new(handler);

    if config.nases.is_empty() {
        warn!("No NASes configured; every datagram will be discarded as unknown");
    }

    let mut registry = StaticNasRegistry::new();
    for nas in &config.nases {
        let network = match nas.parse_network() {
            Ok(network) => network,
            Err(e) => {
                error!("Invalid NAS address {}: {}", nas.address, e);
                process::exit(1);
            }
        };

        let mut registration = NasRegistration::new(
            network,
            nas.secret.as_bytes(),
            nas.handler.clone(),
            Arc::clone(&handler) as Arc<dyn radgate_server::RadiusHandler>,
        )
        .with_trace(nas.trace);
        if let Some(ref name) = nas.name {
            registration = registration.with_name(name.clone());
        }
        if let Some(ref nodes) = nas.nodes {
            registration = registration.with_nodes(nodes.iter().map(|n| NodeId::from(n.as_str())));
        }
        registry.register(registration);

        info!(
            "Registered NAS {} ({})",
            nas.address,
            nas.name.as_deref().unwrap_or("unnamed")
        );
    }

    let request_log = match RequestLogger::new(config.request_log_path.clone()) {
        Ok(logger) => {
            if let Some(path) = logger.file_path() {
                info!("Request logging enabled: {}", path);
            }
            Arc::new(logger)
        }
        Err(e) => {
            error!("Failed to open request log: {}", e);
            process::exit(1);
        }
    };

    let bind_addr = match config.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid listen address: {}", e);
            process::exit(1);
        }
    };

    let server_config = ServerConfig::new(bind_addr, Arc::new(registry))
        .with_admission(config.admission.clone())
        .with_resend_timeout(config.resend_timeout())
        .with_request_log(request_log);

    let server = match RadiusServer::new(server_config).await {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("Failed to create server: {}", e);
            process::exit(1);
        }
    };

    info!("Server started; press Ctrl+C to stop");

    let runner = Arc::clone(&server);
    let run = tokio::spawn(async move { runner.run().await });

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
        server.shutdown();
    }

    match run.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Server error: {}", e);
            process::exit(1);
        }
        Err(e) => {
            error!("Server task failed: {}", e);
            process::exit(1);
        }
    }
}
