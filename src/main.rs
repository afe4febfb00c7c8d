/// Converso backend server
use anyhow::Context;
use converso::{config::ServerConfig, jobs::JobScheduler, server, AppContext};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "converso=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    let config = ServerConfig::from_env().context("failed to load configuration")?;

    let ctx = AppContext::new(config)
        .await
        .context("failed to initialize application context")?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    server::serve((*ctx).clone()).await.context("server error")?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ______
  / ____/___  ____ _   _____  _________  ____
 / /   / __ \/ __ \ | / / _ \/ ___/ ___/ / __ \
/ /___/ /_/ / / / / |/ /  __/ /  (__  ) / /_/ /
\____/\____/_/ /_/|___/\___/_/  /____/  \____/

        Converso backend v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
