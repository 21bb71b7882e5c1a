//! volumectl
//!
//! Command-line access to configured volumes. Records are printed as JSON.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use driver::config::Config;
use driver::volumes::{VolumeError, Volumes};
use protocol::{Listing, SortKey};
use serde::Serialize;

/// Inspect and manage sandboxed file volumes.
#[derive(Parser, Debug)]
#[command(name = "volumectl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Validate the configuration and show every volume's state
    Check,

    /// Print the root record of every available volume
    Roots,

    /// Print the hash of a filesystem path
    Hash {
        /// Absolute path inside a volume
        path: PathBuf,
    },

    /// Describe a node
    Info {
        /// Node hash
        hash: String,
    },

    /// Describe a directory
    Dir {
        /// Directory hash
        hash: String,
    },

    /// List a directory
    Ls {
        /// Directory hash
        hash: String,

        /// Sort order
        #[arg(long, short, default_value = "name-dirs-first")]
        sort: SortKey,
    },

    /// Show sub-directories down to the volume's tree depth
    Tree {
        /// Directory hash
        hash: String,
    },

    /// Show directories from the root down to a directory
    Parents {
        /// Directory hash
        hash: String,
    },

    /// Write a file's contents to stdout
    Cat {
        /// File hash
        hash: String,
    },

    /// Create a directory
    Mkdir {
        /// Parent directory hash
        parent: String,
        /// New directory name
        name: String,
    },

    /// Create an empty file
    Mkfile {
        /// Parent directory hash
        parent: String,
        /// New file name
        name: String,
    },

    /// Remove a file, link or empty directory
    Rm {
        /// Node hash
        hash: String,
    },

    /// Copy a node into a directory, across volumes if needed
    Cp {
        /// Source hash
        src: String,
        /// Destination directory hash
        dst: String,
    },

    /// Check whether a MIME type may be uploaded to a volume
    UploadCheck {
        /// Storage id
        volume: String,
        /// MIME type
        mime: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env_overrides();

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    config.validate().context("Invalid configuration")?;
    let volumes = Volumes::from_config(&config)?;
    tracing::debug!("Mounted {} volume(s)", volumes.len());

    match run(&cli.command, &volumes) {
        Err(VolumeError::Storage(e)) => {
            print_json(&e.to_message())?;
            std::process::exit(1);
        }
        other => Ok(other?),
    }
}

fn run(command: &Commands, volumes: &Volumes) -> Result<(), VolumeError> {
    match command {
        Commands::Check => {
            for volume in volumes.iter() {
                let state = if volume.available() { "ok" } else { "unavailable" };
                println!(
                    "{}\t{}\t{}\t{}",
                    volume.id(),
                    volume.config().backend,
                    volume.config().path.display(),
                    state
                );
            }
        }
        Commands::Roots => print_json(&volumes.roots())?,
        Commands::Hash { path } => {
            let hash = volumes
                .iter()
                .find_map(|v| v.hash_of(path).ok())
                .ok_or_else(|| VolumeError::UnknownVolume(path.display().to_string()))?;
            println!("{hash}");
        }
        Commands::Info { hash } => print_json(&volumes.driver_for(hash)?.info(hash)?)?,
        Commands::Dir { hash } => print_json(&volumes.driver_for(hash)?.dir(hash)?)?,
        Commands::Ls { hash, sort } => {
            let volume = volumes.driver_for(hash)?;
            let listing = Listing {
                cwd: volume.dir(hash)?,
                files: volume.ls(hash, *sort)?,
            };
            print_json(&listing)?;
        }
        Commands::Tree { hash } => print_json(&volumes.driver_for(hash)?.tree(hash)?)?,
        Commands::Parents { hash } => print_json(&volumes.driver_for(hash)?.parents(hash)?)?,
        Commands::Cat { hash } => {
            let volume = volumes.driver_for(hash)?;
            let mut handle = volume.open(hash)?;
            let copied = io::copy(&mut handle, &mut io::stdout().lock());
            volume.close(handle)?;
            copied.map_err(driver::StorageError::from)?;
        }
        Commands::Mkdir { parent, name } => {
            print_json(&volumes.driver_for(parent)?.mkdir(parent, name)?)?
        }
        Commands::Mkfile { parent, name } => {
            print_json(&volumes.driver_for(parent)?.mkfile(parent, name)?)?
        }
        Commands::Rm { hash } => volumes.driver_for(hash)?.rm(hash)?,
        Commands::Cp { src, dst } => print_json(&volumes.copy(src, dst)?)?,
        Commands::UploadCheck { volume, mime } => {
            let driver = volumes
                .get(volume)
                .ok_or_else(|| VolumeError::UnknownVolume(volume.clone()))?;
            println!("{}", driver.upload_allowed(mime)?);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), VolumeError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| driver::StorageError::Io(io::Error::other(e)))?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}").map_err(driver::StorageError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ls_default_sort() {
        let cli = Cli::try_parse_from(["volumectl", "ls", "l1_"]).unwrap();
        match cli.command {
            Commands::Ls { hash, sort } => {
                assert_eq!(hash, "l1_");
                assert_eq!(sort, SortKey::NameDirsFirst);
            }
            _ => panic!("Expected Ls command"),
        }
    }

    #[test]
    fn test_ls_with_sort() {
        let cli = Cli::try_parse_from(["volumectl", "ls", "l1_", "--sort", "size"]).unwrap();
        match cli.command {
            Commands::Ls { sort, .. } => assert_eq!(sort, SortKey::Size),
            _ => panic!("Expected Ls command"),
        }
        assert!(Cli::try_parse_from(["volumectl", "ls", "l1_", "--sort", "random"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["volumectl", "roots", "-v", "-c", "/tmp/volumes.toml"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/volumes.toml")));
    }

    #[test]
    fn test_mkdir_arguments() {
        let cli = Cli::try_parse_from(["volumectl", "mkdir", "l1_", "new"]).unwrap();
        match cli.command {
            Commands::Mkdir { parent, name } => {
                assert_eq!(parent, "l1_");
                assert_eq!(name, "new");
            }
            _ => panic!("Expected Mkdir command"),
        }
    }

    #[test]
    fn test_upload_check_arguments() {
        let cli =
            Cli::try_parse_from(["volumectl", "upload-check", "l1", "image/png"]).unwrap();
        assert!(matches!(cli.command, Commands::UploadCheck { .. }));
    }
}
