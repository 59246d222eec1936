use clap::Parser;
use radius_gate::{BackgroundQueue, Config, Context, ProxyServer};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Authorizing RADIUS proxy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "radius_gate")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start the proxy)
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

            warn!("Could not load config file from: {} ({})", cli.config_path, e);
            info!("Creating example configuration at: {}", cli.config_path);

            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }

            info!("Please edit {} and restart the proxy", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        println!("Configuration validated successfully");
        println!("  Mode: {}", if config.accounting { "accounting" } else { "authentication" });
        println!("  Listen: {}:{}", config.listen_address, config.bind_port());
        match config.upstream_port() {
            Some(port) => println!("  Upstream: {}:{}", config.upstream_host, port),
            None => println!("  Upstream: {} (no port)", config.upstream_host),
        }
        println!("  Session timeout: {}s", config.session_timeout);
        println!("  Data dir: {}", config.dir.display());
        println!("  Plugins: {}", config.plugins.join(", "));
        println!("  Reject: {}", if config.no_reject { "never" } else { "on failure" });
        process::exit(0);
    }

    let log_level = if let Some(ref level) = config.log_level {
        level.as_str()
    } else if config.debug {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("radius-gate v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    let background = BackgroundQueue::spawn();
    let ctx = match Context::from_config(&config, background.clone()) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!("Unable to build context: {}", e);
            process::exit(1);
        }
    };
    ctx.debug_dump();

    let server = match ProxyServer::from_config(&config, Arc::clone(&ctx)).await {
        Ok(srv) => srv,
        Err(e) => {
            error!("Failed to create proxy: {}", e);
            process::exit(1);
        }
    };

    #[cfg(unix)]
    {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut hangup = match signal(SignalKind::hangup()) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Unable to listen for SIGHUP: {}", e);
                    return;
                }
            };
            while hangup.recv().await.is_some() {
                info!("SIGHUP received, reloading plugins");
                let ctx = Arc::clone(&ctx);
                if let Err(e) = tokio::task::spawn_blocking(move || ctx.reload_modules()).await {
                    error!("Plugin reload failed: {}", e);
                }
            }
        });
    }

    info!("Proxy started, press Ctrl+C to stop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Proxy error: {}", e);
                process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    background.flush().await;
}
