//! CLI Module
//!
//! Command-line interface for managing custom models.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Decalkit - decal overlays and custom model storage
#[derive(Parser, Debug)]
#[command(name = "decalkit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (defaults to ./decalkit.json when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List base models and saved custom models
    #[command(name = "list")]
    List,

    /// Show the stored metadata of a custom model
    #[command(name = "show")]
    Show {
        /// Custom model name
        name: String,
    },

    /// Create a custom model from a base model and overlay images
    #[command(name = "create")]
    Create {
        /// Custom model name
        name: String,

        /// Base model id
        #[arg(short, long)]
        based_on: String,

        /// Overlay image files, bottom first
        #[arg(short, long = "overlay")]
        overlays: Vec<PathBuf>,

        /// Material preset passed through unchanged
        #[arg(long, default_value = "")]
        material_preset: String,

        /// Overwrite an existing model with the same name
        #[arg(short, long)]
        force: bool,
    },

    /// Render a custom model's composite texture to a PNG
    #[command(name = "render")]
    Render {
        /// Custom model name
        name: String,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,

        /// Edge length in pixels (overrides settings)
        #[arg(short, long)]
        size: Option<u32>,
    },

    /// Export one or all custom models to a JSON file
    #[command(name = "export")]
    Export {
        /// Output JSON path
        #[arg(short, long)]
        output: PathBuf,

        /// Only export this model
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Import custom models from an export file
    #[command(name = "import")]
    Import {
        /// Export JSON path
        path: PathBuf,

        /// Overwrite models that already exist
        #[arg(long)]
        overwrite: bool,
    },

    /// Delete a custom model and its overlay images
    #[command(name = "delete")]
    Delete {
        /// Custom model name
        name: String,
    },

    /// Delete every custom model
    #[command(name = "clear")]
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}
