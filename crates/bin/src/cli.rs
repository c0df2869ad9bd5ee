//! CLI argument definitions for the Dashfields binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and edit a Dashfields document store
#[derive(Parser, Debug)]
#[command(name = "dashfields")]
#[command(about = "Dashfields: inspect and edit documents in a JSON document store")]
#[command(version)]
pub struct Cli {
    /// JSON store file. Created on first write if it does not exist.
    #[arg(short, long, default_value = "dashfields.json", env = "DASHFIELDS_STORE")]
    pub store: PathBuf,

    /// JSON model configuration file
    #[arg(short, long, env = "DASHFIELDS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List stored documents
    List,
    /// Show every field of a document, including inherited ones
    Show(DocArgs),
    /// Read one field of a document
    Get(KeyArgs),
    /// Write one field of a document
    Set(SetArgs),
    /// Remove one field of a document
    Remove(KeyArgs),
    /// Create a delegate that inherits from a document
    Delegate(DelegateArgs),
    /// Create an alias of a document
    Alias(DocArgs),
}

#[derive(clap::Args, Debug)]
pub struct DocArgs {
    /// Document id
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct KeyArgs {
    /// Document id
    pub id: String,
    /// Field key
    pub key: String,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Document id
    pub id: String,
    /// Field key
    pub key: String,
    /// Value: a JSON number, boolean or string. Anything that is not valid JSON is
    /// stored as text.
    pub value: String,
    /// Treat the value as the id of a document to reference
    #[arg(long = "ref")]
    pub reference: bool,
}

#[derive(clap::Args, Debug)]
pub struct DelegateArgs {
    /// Document id of the prototype
    pub id: String,
    /// Title for the new delegate
    #[arg(short, long)]
    pub title: Option<String>,
}
