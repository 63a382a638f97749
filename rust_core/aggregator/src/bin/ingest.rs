use aggregator::{health, Aggregator, IngestConfig, JsonLinesWriter};
use connector_bitfinex::BitfinexSource;
use connector_kucoin::KucoinSource;
use connectors_common::{DataSource, Producer};
use log::{error, info};
use reqwest::Client;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn print_usage() {
    eprintln!("Usage: ingest [--config <config.json>]");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<&str> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_path = Some(args[i + 1].as_str());
                i += 2;
            }
            _ => {
                print_usage();
                return Ok(());
            }
        }
    }

    let config = match config_path {
        Some(path) => IngestConfig::load(Path::new(path))?,
        None => IngestConfig::default(),
    };

    let listener = TcpListener::bind(("0.0.0.0", config.health_port)).await?;
    let (health_stop, health_stopped) = oneshot::channel::<()>();
    let health_task = tokio::spawn(health::serve(listener, async {
        health_stopped.await.ok();
    }));

    let aggregator = Arc::new(Aggregator::new(config.buffer));
    let writer = JsonLinesWriter::new(aggregator.subscribe(), tokio::io::stdout());
    let writer_task = tokio::spawn(writer.run());

    let producer: Arc<dyn Producer> = aggregator.clone();
    let mut sources: Vec<Box<dyn DataSource>> = Vec::new();
    if config.enable_kucoin {
        sources.push(Box::new(KucoinSource::new(config.kucoin.clone(), Client::new(), producer.clone())));
    }
    if config.enable_bitfinex {
        sources.push(Box::new(BitfinexSource::new(config.bitfinex.clone(), Client::new(), producer.clone())));
    }
    if sources.is_empty() {
        error!("no data source enabled");
        return Ok(());
    }
    for source in &sources {
        source.start()?;
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    health_stop.send(()).ok();
    if let Err(e) = health_task.await? {
        error!("health check failed: {}", e);
    }
    for source in &sources {
        source.stop().await;
        info!("{} stopped", source.name());
    }

    drop(sources);
    drop(producer);
    drop(aggregator);
    match writer_task.await? {
        Ok(lines) => info!("wrote {} records", lines),
        Err(e) => error!("output failed: {}", e),
    }
    Ok(())
}
