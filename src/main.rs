use echowire::config::Config;
use echowire::signaling::SignalingServer;
use echowire::static_server::StaticServer;
use echowire::tls;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    // missing credentials or page are fatal: refuse to serve anything
    let acceptor = tls::load_acceptor(&config.cert_path, &config.key_path)?;
    let static_server = StaticServer::new(&config.page_path)?;
    let signaling = SignalingServer::new();

    println!("   echowire signaling relay");
    println!("   Relay on wss://{}", config.signaling_addr);
    println!("   Page  on https://{}", config.static_addr);
    println!("   Press Ctrl+C to stop\n");

    tokio::select! {
        res = signaling.run(&config.signaling_addr, acceptor.clone()) => res?,
        res = static_server.run(&config.static_addr, acceptor) => res?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    Ok(())
}
