//! Opening the store and saving it back.

use std::{path::PathBuf, sync::Arc};

use dashfields::{Doc, InMemory, Instance, ModelConfig};

use crate::cli::Cli;

/// An instance over the store file named on the command line.
pub struct Session {
    pub instance: Instance,
    pub backend: Arc<InMemory>,
    path: PathBuf,
}

impl Session {
    pub fn open(cli: &Cli) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match &cli.config {
            Some(path) => {
                tracing::info!("Using configuration from {}", path.display());
                ModelConfig::load_from_file(path)?
            }
            None => ModelConfig::default(),
        };

        let backend = Arc::new(InMemory::load_from_file(&cli.store)?);
        tracing::info!(
            documents = backend.len(),
            "Opened store at {}",
            cli.store.display()
        );
        let instance = Instance::builder(backend.clone()).config(config).build();
        Ok(Self {
            instance,
            backend,
            path: cli.store.clone(),
        })
    }

    /// Loads a document, failing if the store does not have it.
    pub async fn doc(&self, id: &str) -> Result<Doc, Box<dyn std::error::Error>> {
        self.instance
            .load(id)
            .await
            .ok_or_else(|| format!("Document not found: {id}").into())
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.backend.save_to_file(&self.path)?;
        tracing::info!("Saved store to {}", self.path.display());
        Ok(())
    }
}
