//! Engine probe
//!
//! Connects to a search engine, reports its version and capabilities, and
//! optionally checks an index and an ingest pipeline the way the crawler
//! would before a run.

mod config;

use clap::Parser;
use crawler_engine_client::{EngineClient, IndexCreation};
use tracing::info;

use crate::config::ProbeConfig;

/// Initializes the tracing subscriber. `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "engine_probe={level},crawler_engine_client={level}",
            level = level
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

async fn probe_index(client: &EngineClient, config: &ProbeConfig, index: &str) -> anyhow::Result<()> {
    let indices = client.indices();

    let exists = indices.is_existing_index(index).await?;
    println!("index {}: {}", index, if exists { "exists" } else { "missing" });

    if config.create {
        match indices.create_index(index, true, None).await? {
            IndexCreation::Created => println!("index {}: created", index),
            IndexCreation::AlreadyExisted => println!("index {}: kept existing", index),
        }
    }

    if config.wait {
        let health = indices.wait_for_healthy_index(index, config.health_timeout).await?;
        println!("index {}: health {}", index, health);
    } else if let Some(descriptor) = indices.describe_index(index).await? {
        println!("index {}: health {}", index, descriptor.health);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ProbeConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let client_config = config.client_config();
    info!(node = %client_config.primary_node(), "Probing engine");
    let client = EngineClient::new(client_config)?;

    let version = client.detect_version().await?;
    let capabilities = client.capabilities().await?;
    println!("version: {}", version);
    println!(
        "capabilities: {}",
        serde_json::to_string_pretty(&capabilities)?
    );

    if let Some(index) = &config.index {
        probe_index(&client, &config, index).await?;
    }

    if let Some(pipeline) = &config.pipeline {
        let exists = client.pipelines().is_existing_pipeline(pipeline).await?;
        println!(
            "pipeline {}: {}",
            pipeline,
            if exists { "exists" } else { "missing" }
        );
    }

    Ok(())
}
