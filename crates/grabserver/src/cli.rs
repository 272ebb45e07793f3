use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "grab-server")]
#[command(author, version, about = "Media download service: format info, mp4/mp3 downloads and live progress", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print media information for a URL
    Info {
        /// Media page URL
        url: String,

        /// Print the parsed info as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download a URL to a local directory
    Download {
        /// Media page URL
        url: String,

        /// Output format: mp4 or mp3
        #[arg(short, long, default_value = "mp4")]
        format: String,

        /// Maximum video height, e.g. 720
        #[arg(short, long)]
        quality: Option<u32>,

        /// Output directory
        #[arg(short, long)]
        output: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
