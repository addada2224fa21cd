use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheStore;
use crate::cli::{Cli, Commands};
use crate::client::MapClient;
use crate::fingerprint::compute_fingerprint;
use crate::metadata::resolve_slice_directory;
use crate::models::{validate_geometry, Dimensions, Origin};
use crate::server::api::CreateMapRequest;

fn parse_origin(values: &[f64]) -> Result<Origin> {
    match values {
        [x, y, z] => Ok(Origin {
            x: *x,
            y: *y,
            z: *z,
        }),
        _ => bail!("Origin needs exactly three values (x,y,z)"),
    }
}

fn parse_dimensions(values: &[f64]) -> Result<Dimensions> {
    match values {
        [width, height] => Ok(Dimensions {
            width: *width,
            height: *height,
        }),
        _ => bail!("Dimensions need exactly two values (width,height)"),
    }
}

fn parse_duration(value: &str, what: &str) -> Result<Duration> {
    humantime::parse_duration(value).with_context(|| format!("Invalid {}: {}", what, value))
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            config,
            host,
            port,
            cache_dir,
            metadata_url,
            executable,
        } => {
            use crate::config::Config;

            // Load configuration from file or use defaults
            let mut app_config = if let Some(config_path) = config {
                Config::from_file(&config_path)
                    .with_context(|| format!("Failed to load config file: {}", config_path))?
            } else {
                Config::default()
            };

            // Override config with command line arguments
            app_config.merge_with_cli(host, port, cache_dir, metadata_url, executable);

            // Validate configuration
            app_config
                .validate()
                .context("Configuration validation failed")?;

            // Use tokio runtime for async server
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(crate::server::run_server(app_config))?;
        }
        Commands::Fingerprint {
            data_path,
            origin,
            dimensions,
            cache_dir,
        } => {
            let origin = parse_origin(&origin)?;
            let dimensions = parse_dimensions(&dimensions)?;
            validate_geometry(&origin, &dimensions)?;

            let slices = resolve_slice_directory(Path::new(&data_path));
            let fingerprint =
                compute_fingerprint(&slices.to_string_lossy(), &origin, &dimensions);
            let cache = CacheStore::new(PathBuf::from(cache_dir));

            println!("Slice directory: {}", slices.display());
            println!("Fingerprint:     {}", fingerprint);
            println!("Cache entry:     {}", cache.path_for(&fingerprint).display());
        }
        Commands::Fetch {
            server,
            token,
            user,
            dataset,
            origin,
            dimensions,
            subsets,
            size,
            subset,
            output,
            poll_interval,
            wait_timeout,
        } => {
            if subset >= subsets {
                bail!(
                    "Tile index {} is out of range for {} subset(s)",
                    subset,
                    subsets
                );
            }

            let request = CreateMapRequest {
                token,
                user,
                dataset,
                origin: parse_origin(&origin)?,
                dimensions: parse_dimensions(&dimensions)?,
                subsets,
                size,
            };
            let poll_interval = parse_duration(&poll_interval, "poll interval")?;
            let wait_timeout = wait_timeout
                .map(|value| parse_duration(&value, "wait timeout"))
                .transpose()?;
            let output = PathBuf::from(output);

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(async {
                let client = MapClient::new(server, poll_interval)?;

                println!("Submitting map request for {}/{}", request.user, request.dataset);
                let status_url = client.submit(&request).await?;

                println!("Waiting for {}", status_url);
                let tiles_url = client.wait(&status_url, wait_timeout).await?;

                let written = client.download(&tiles_url, subset, &output).await?;
                println!("Wrote {} bytes to {}", written, output.display());

                Ok::<(), anyhow::Error>(())
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origin_and_dimensions() {
        let origin = parse_origin(&[0.1, 0.2, 0.3]).unwrap();
        assert_eq!(origin.z, 0.3);
        assert!(parse_origin(&[0.1, 0.2]).is_err());

        let dimensions = parse_dimensions(&[0.5, 0.25]).unwrap();
        assert_eq!(dimensions.height, 0.25);
        assert!(parse_dimensions(&[0.5]).is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(
            parse_duration("500ms", "poll interval").unwrap(),
            Duration::from_millis(500)
        );
        assert!(parse_duration("soon", "poll interval").is_err());
    }
}
