use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use voting_server::{
    cli::{Cli, Command},
    client,
    config::ServerConfig,
    server::VotingServer,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let config = ServerConfig::from_args(&args)?;
            let server = VotingServer::bind(&config).await?;
            let addr = server.local_addr()?;
            info!("voting server listening on {}", addr);
            info!(
                duration_secs = config.voting_duration.as_secs(),
                admins = ?config.admin_users,
                options = ?config.initial_options,
                "starting voting session"
            );
            if let Err(err) = server.run_until_ctrl_c().await {
                warn!("voting server exited with error: {err:?}");
                return Err(err);
            }
            info!("voting server stopped");
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}
