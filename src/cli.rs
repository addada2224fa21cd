use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "slice-map")]
#[command(about = "Sub-volume slice map generation service", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the slice map HTTP server
    Server {
        /// Configuration file path (TOML format)
        #[arg(short = 'c', long)]
        config: Option<String>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Root directory for generated slice maps
        #[arg(long)]
        cache_dir: Option<String>,

        /// Base URL of the dataset metadata service
        #[arg(long)]
        metadata_url: Option<String>,

        /// Pipeline launcher executable
        #[arg(long)]
        executable: Option<String>,
    },

    /// Print the cache key and location for a sub-volume
    Fingerprint {
        /// Dataset root directory; the slice subdirectory is resolved beneath it
        data_path: String,

        /// Normalized origin as x,y,z
        #[arg(long, value_delimiter = ',', default_values_t = [0.0, 0.0, 0.0])]
        origin: Vec<f64>,

        /// Normalized extent as width,height
        #[arg(long, value_delimiter = ',', default_values_t = [1.0, 1.0])]
        dimensions: Vec<f64>,

        /// Cache root used to resolve the entry location
        #[arg(long, default_value = "./cache")]
        cache_dir: String,
    },

    /// Request a slice map from a running server and download one tile
    Fetch {
        /// Server base URL
        #[arg(short, long, default_value = "http://localhost:5001")]
        server: String,

        /// Access token forwarded to the metadata service
        #[arg(short, long)]
        token: String,

        /// Dataset owner
        #[arg(short, long)]
        user: String,

        /// Dataset name
        #[arg(short, long)]
        dataset: String,

        /// Normalized origin as x,y,z
        #[arg(long, value_delimiter = ',', default_values_t = [0.0, 0.0, 0.0])]
        origin: Vec<f64>,

        /// Normalized extent as width,height
        #[arg(long, value_delimiter = ',', default_values_t = [1.0, 1.0])]
        dimensions: Vec<f64>,

        /// Number of tiles to generate
        #[arg(long, default_value = "1")]
        subsets: u32,

        /// Edge length in pixels of each tile
        #[arg(long, default_value = "256")]
        size: u32,

        /// Index of the tile to download
        #[arg(long, default_value = "0")]
        subset: u32,

        /// Output file
        #[arg(short, long, default_value = "output.jpg")]
        output: String,

        /// Interval between status polls (e.g. "1s", "500ms")
        #[arg(long, default_value = "1s")]
        poll_interval: String,

        /// Give up waiting after this long (e.g. "10m")
        #[arg(long)]
        wait_timeout: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch_arguments() {
        let cli = Cli::try_parse_from([
            "slice-map",
            "fetch",
            "--token",
            "secret",
            "--user",
            "alice",
            "--dataset",
            "scan",
            "--origin",
            "0.1,0.2,0.3",
            "--dimensions",
            "0.5,0.5",
        ])
        .unwrap();

        match cli.command {
            Commands::Fetch {
                origin,
                dimensions,
                subsets,
                size,
                server,
                ..
            } => {
                assert_eq!(origin, vec![0.1, 0.2, 0.3]);
                assert_eq!(dimensions, vec![0.5, 0.5]);
                assert_eq!(subsets, 1);
                assert_eq!(size, 256);
                assert_eq!(server, "http://localhost:5001");
            }
            _ => panic!("expected fetch command"),
        }
    }

    #[test]
    fn test_fingerprint_defaults_to_full_extent() {
        let cli = Cli::try_parse_from(["slice-map", "fingerprint", "/data/scan"]).unwrap();

        match cli.command {
            Commands::Fingerprint {
                origin, dimensions, ..
            } => {
                assert_eq!(origin, vec![0.0, 0.0, 0.0]);
                assert_eq!(dimensions, vec![1.0, 1.0]);
            }
            _ => panic!("expected fingerprint command"),
        }
    }
}
