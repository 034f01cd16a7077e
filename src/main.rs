use std::fs;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

mod auth;
mod models;
mod repositories;
pub mod services;
pub mod settings;
pub mod utils;

use repositories::Repositories;
use settings::{Backend, Settings};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Overrides `http.listen` from the config file.
    #[arg(short, long)]
    listen: Option<String>,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let settings = Settings::load(&args.config)?;

    init_logging(&args.log4rs)?;
    log::info!("Starting hailer.");

    let repositories = match settings.storage.backend {
        Backend::Postgres => {
            let conn = PgPoolOptions::new()
                .max_connections(settings.postgres.max_connections)
                .connect(&settings.postgres.url)
                .await?;
            sqlx::migrate!().run(&conn).await?;
            log::info!("Connected to postgres, migrations applied.");
            Repositories::postgres(conn)
        }
        Backend::Memory => {
            log::warn!("Using the in-memory store, nothing will be persisted.");
            Repositories::memory()
        }
    };

    services::users::seed_super_admin(repositories.users.as_ref(), &settings.super_admin).await?;

    let channels = services::start_services(repositories);
    let listen = args.listen.unwrap_or(settings.http.listen);
    services::http::start_http_server(channels, &listen).await?;

    Ok(())
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
