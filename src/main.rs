use axum::serve;
use termdb_rust::config::AppConfig;
use termdb_rust::create_app;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("termdb: terminology resource server");

    // Load configuration
    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}",
        config.server.host, config.server.port
    );
    println!(
        "Repositories: resources, {}",
        config.repository.tooling_ids.join(", ")
    );

    run_server(create_app(&config), &config).await?;

    Ok(())
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("termdb server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
