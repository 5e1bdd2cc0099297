use clap::Parser;
use todo_web::config::Config;
use todo_web::db::Db;
use todo_web::routes::create_router;
use todo_web::server;
use todo_web::state::AppState;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::parse();
    config.validate()?;

    let db = Db::connect(&config.database_url()?).await?;
    let state = AppState::new(db, &config.secret)?;

    server::run(&config.bind, create_router(state)).await
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("todo_web=debug,tower_http=debug,info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}
