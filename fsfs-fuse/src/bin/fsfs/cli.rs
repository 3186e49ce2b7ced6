use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Mount an image, creating it first if it does not exist
    Mount {
        /// Image file to load and to save back on unmount
        #[arg(long, short)]
        file: PathBuf,

        mountpoint: PathBuf,
    },

    /// Create a new image holding every regular file of a host directory
    Pack {
        /// Host directory to copy files from
        #[arg(long, short)]
        source: PathBuf,

        /// Output image file
        #[arg(long, short)]
        file: PathBuf,
    },

    /// Print usage of an image
    Info {
        #[arg(long, short)]
        file: PathBuf,
    },
}
