pub mod config;
pub mod logging;

pub use config::{Config, ConfigError, LogLevel};

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use crate::buffer::{BufferWriter, PayloadReader};
use crate::sender::BulkClient;
use crate::shipper::{ControlledLevelSwitch, LogShipper};

pub fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Process-level assembly: configuration, logging, the shipper task and the
/// optional stdin ingest loop.
pub struct App {
    config: Config,
    level_switch: Arc<ControlledLevelSwitch>,
}

impl App {
    pub fn from_args<I, T>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args(args)?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let config = match &config.config_file {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => config,
        };
        Ok(Self {
            config,
            level_switch: Arc::new(ControlledLevelSwitch::default()),
        })
    }

    /// Server-driven level restriction, shared with the shipper. Embedders
    /// consult it before buffering events.
    pub fn level_switch(&self) -> Arc<ControlledLevelSwitch> {
        Arc::clone(&self.level_switch)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(self) -> anyhow::Result<()> {
        logging::init(self.config.log_level);

        info!(version = get_version(), "Starting frakt-log-shipper");
        info!(
            endpoint = %self.config.endpoint,
            buffer_dir = %self.config.buffer_dir.display(),
            base = %self.config.buffer_base,
            bucket = ?self.config.bucket,
            "Configuration loaded"
        );

        std::fs::create_dir_all(&self.config.buffer_dir).with_context(|| {
            format!(
                "failed to create buffer directory {}",
                self.config.buffer_dir.display()
            )
        })?;

        let file_set = self.config.file_set()?;
        let reader = PayloadReader::new(file_set.clone(), self.config.reader_config())?;
        let client = BulkClient::new(self.config.client_config())?;
        let shipper = LogShipper::new(
            file_set.clone(),
            reader,
            client,
            Arc::clone(&self.level_switch),
            self.config.shipper_config(),
        );
        let handle = shipper.spawn();

        let ingest = if self.config.ingest_stdin {
            let mut writer = BufferWriter::new(file_set, self.config.file_size_limit_bytes())?;
            Some(tokio::spawn(async move {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            if let Err(e) = writer.append(&line) {
                                error!(error = %e, "Failed to append event to buffer");
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!(error = %e, "Failed to read from stdin");
                            break;
                        }
                    }
                }
                info!("Stdin ingest finished");
            }))
        } else {
            None
        };

        info!("frakt-log-shipper is running. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;

        info!("Shutdown signal received, flushing buffered events");
        if let Some(ingest) = ingest {
            // Release the buffer file lock so the final flush can advance.
            ingest.abort();
            let _ = ingest.await;
        }
        handle.shutdown().await;

        info!("frakt-log-shipper stopped");
        Ok(())
    }
}

pub async fn main() -> anyhow::Result<()> {
    let app = App::from_args(std::env::args_os())?;
    app.run().await
}
