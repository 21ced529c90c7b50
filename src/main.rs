mod bot;
mod config;
mod gogdb;
mod server;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bot::{Author, Dispatcher, Footer, Printer};
use config::BotConfig;
use gogdb::GogdbApi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = BotConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("gogdb_bot={},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("GOGDB host: {}", config.api.root());
    info!(
        "Retries: {}, concurrency: {}, timeout: {:?}",
        config.api.retries(),
        config.api.concurrency(),
        config.api.request_timeout()
    );

    let mut printer = Printer::new(Footer::new(config.footer.clone()));
    if let Some(name) = &config.author {
        printer = printer.with_author(Author {
            name: name.clone(),
            url: None,
            icon_url: None,
        });
    }

    let api = GogdbApi::new(config.api.clone());
    let dispatcher = Arc::new(Dispatcher::new(api, printer, config.prefix.clone()));

    server::serve(&config.listen, dispatcher).await
}
