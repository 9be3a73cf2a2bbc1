/**
 * Background sync worker
 *
 * Runs the offline queue in a separate process sharing the queue file with
 * the foreground app. The host OS wakes it through SIGUSR1; it keeps
 * running until Ctrl-C.
 */

#[cfg(feature = "worker")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use booking_sync::client::config::Config;
    use booking_sync::client::sync::ConnectivityMonitor;
    use booking_sync::client::{register_global, sync_manager, SyncManager};

    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        remote = config.remote_url(),
        db = %config.db_path().display(),
        "starting sync worker"
    );

    let manager = SyncManager::from_config(&config, ConnectivityMonitor::new()).await?;
    if register_global(manager.clone()).is_err() {
        tracing::warn!("a sync manager was already registered");
    }

    // Drain whatever the previous run left behind
    manager.request_sync();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut wakeups = signal(SignalKind::user_defined1())?;
        tokio::spawn(async move {
            while wakeups.recv().await.is_some() {
                tracing::debug!("SIGUSR1 received");
                if let Some(manager) = sync_manager() {
                    manager.background_signal();
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    manager.shutdown().await;

    let status = manager.status();
    tracing::info!(
        pending = status.pending_count,
        terminal = status.terminal_count,
        "sync worker stopped"
    );
    Ok(())
}

#[cfg(not(feature = "worker"))]
fn main() {
    eprintln!("The sync worker requires the 'worker' feature to be enabled.");
    eprintln!("Run with: cargo run --bin sync-worker --features worker");
    std::process::exit(1);
}
