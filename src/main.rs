use std::collections::VecDeque;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate::livescan::{ProbeError, ProbeSource};
use facegate::{config, Embedding, EmbeddingStore, FaceGate, ScanOptions, ScanState};
use facegate::credential::CredentialStore;
use log::{info, warn};

#[derive(Parser)]
#[command(name = "facegate")]
#[command(
    version,
    about = "Face-embedding matching and credential-validation engine"
)]
struct Cli {
    /// API key; falls back to $FACEGATE_KEY
    #[arg(long, global = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from an embedding file (JSON float array)
    Enroll {
        /// Display name for the identity
        #[arg(short, long)]
        name: String,
        /// Path to the embedding file
        #[arg(short, long)]
        embedding: PathBuf,
    },
    /// Rank enrolled identities against a probe embedding
    Search {
        /// Path to the probe embedding file
        #[arg(short, long)]
        embedding: PathBuf,
        /// Number of results to return
        #[arg(short, default_value_t = 10)]
        k: usize,
    },
    /// One-shot verification of two embeddings
    Verify {
        #[arg(short, long)]
        target: PathBuf,
        #[arg(short, long)]
        probe: PathBuf,
    },
    /// Run the live-scan loop, replaying probe files from a directory
    Scan {
        /// Path to the target embedding file
        #[arg(short, long)]
        target: PathBuf,
        /// Directory of probe embedding files, consumed in name order
        #[arg(short, long)]
        probe_dir: PathBuf,
        /// Ticks per second
        #[arg(short, long)]
        rate: Option<f32>,
    },
    /// List enrolled identities
    Identities,
    /// Remove an enrolled identity
    Remove {
        #[arg(short, long)]
        id: u64,
    },
    /// Remove all enrolled identities
    Purge,
    /// Manage API keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Open config file in editor
    Config,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Issue a new key; the secret is printed exactly once
    Issue {
        /// Owner or purpose of the key
        #[arg(short, long)]
        label: String,
    },
    /// Revoke a key by id
    Revoke {
        #[arg(short, long)]
        id: u64,
    },
    /// List keys (id, prefix, label only)
    List,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(None)?;

    let identities = EmbeddingStore::open(config::identity_store_path(), cfg.dimension)
        .context("opening identity store")?;
    let credentials =
        CredentialStore::open(config::credential_store_path()).context("opening credential store")?;
    let mut gate = FaceGate::new(cfg.clone(), identities, credentials);

    match cli.command {
        Commands::Enroll { name, embedding } => {
            let key = resolve_key(cli.key)?;
            let probe = read_embedding(&embedding, cfg.dimension)?;
            let identity = gate.enroll(&key, &name, probe)?;
            info!("enrolled '{}' with id {}", identity.name, identity.id);
            Ok(())
        }
        Commands::Search { embedding, k } => {
            let key = resolve_key(cli.key)?;
            let probe = read_embedding(&embedding, cfg.dimension)?;
            let hits = gate.search(&key, &probe, k)?;
            if hits.is_empty() {
                info!("no enrolled identities");
                return Ok(());
            }
            for hit in &hits {
                println!(
                    "{:>6}  {:<24}  similarity {:.4}{}",
                    hit.identity.id,
                    hit.identity.name,
                    hit.similarity,
                    if hit.verified { "  ✓" } else { "" }
                );
            }
            Ok(())
        }
        Commands::Verify { target, probe } => {
            let key = resolve_key(cli.key)?;
            let a = read_embedding(&target, cfg.dimension)?;
            let b = read_embedding(&probe, cfg.dimension)?;
            let cmp = gate.verify(&key, &a, &b)?;
            info!(
                "similarity {:.4} (threshold {:.3})",
                cmp.similarity,
                gate.config().threshold
            );
            if cmp.verified {
                info!("✓ verified");
                Ok(())
            } else {
                anyhow::bail!("not verified")
            }
        }
        Commands::Scan {
            target,
            probe_dir,
            rate,
        } => {
            let key = resolve_key(cli.key)?;
            let target = read_embedding(&target, cfg.dimension)?;
            let source = DirProbeSource::new(&probe_dir, cfg.dimension)?;
            let mut controller = gate.scan_controller();
            let opts = ScanOptions {
                threshold: None,
                checks_per_second: rate.unwrap_or(gate.config().checks_per_second),
            };
            gate.start_scan(&key, &mut controller, source, target, opts)?;
            info!("scanning… press Ctrl+C to abort");

            let mut reported = 0u64;
            loop {
                std::thread::sleep(Duration::from_millis(100));
                let status = controller.status();
                if status.ticks > reported {
                    reported = status.ticks;
                    if let Some(similarity) = status.last_similarity {
                        info!("tick {}: similarity {:.4}", status.ticks, similarity);
                    }
                }
                match status.state {
                    ScanState::Scanning => {}
                    ScanState::Succeeded => {
                        info!("✓ live scan verified");
                        return Ok(());
                    }
                    ScanState::Idle => {
                        if let Some(err) = status.last_error {
                            anyhow::bail!("live scan ended without a match: {err}");
                        }
                        anyhow::bail!("live scan ended without a match");
                    }
                }
            }
        }
        Commands::Identities => {
            let key = resolve_key(cli.key)?;
            for identity in gate.identities(&key)? {
                println!(
                    "{:>6}  {:<24}  enrolled {}",
                    identity.id,
                    identity.name,
                    identity.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            Ok(())
        }
        Commands::Remove { id } => {
            let key = resolve_key(cli.key)?;
            gate.remove_identity(&key, id)?;
            Ok(())
        }
        Commands::Purge => {
            let key = resolve_key(cli.key)?;
            gate.purge_identities(&key)?;
            info!("✓ all identities purged");
            Ok(())
        }
        Commands::Key { command } => match command {
            KeyCommands::Issue { label } => {
                let (secret, issued) = gate.issue_key(&label)?;
                info!("issued key {} for '{}'", issued.id, issued.label);
                warn!("the secret is shown once and cannot be recovered:");
                println!("{secret}");
                Ok(())
            }
            KeyCommands::Revoke { id } => {
                gate.revoke_key(id)?;
                Ok(())
            }
            KeyCommands::List => {
                for key in gate.list_keys() {
                    println!(
                        "{:>6}  {}…  {:<24}  issued {}",
                        key.id,
                        key.prefix,
                        key.label,
                        key.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
                Ok(())
            }
        },
        Commands::Config => open_config(),
    }
}

fn resolve_key(flag: Option<String>) -> Result<String> {
    if let Some(key) = flag {
        return Ok(key);
    }
    env::var("FACEGATE_KEY")
        .context("no API key given; pass --key or set FACEGATE_KEY (issue one with 'key issue')")
}

fn read_embedding(path: &Path, dimension: usize) -> Result<Embedding> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading embedding {}", path.display()))?;
    let values: Vec<f32> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing embedding {}", path.display()))?;
    Embedding::new(values, dimension).with_context(|| format!("embedding {}", path.display()))
}

/// Replays embedding files from a directory through the live-scan loop, one
/// file per tick. Stands in for a camera + face-model capture chain.
struct DirProbeSource {
    files: VecDeque<PathBuf>,
    dimension: usize,
}

impl DirProbeSource {
    fn new(dir: &Path, dimension: usize) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("reading probe directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        if files.is_empty() {
            anyhow::bail!("no .json probe files in {}", dir.display());
        }
        Ok(Self {
            files: files.into(),
            dimension,
        })
    }
}

impl ProbeSource for DirProbeSource {
    fn next_probe(&mut self) -> Result<Embedding, ProbeError> {
        let Some(path) = self.files.pop_front() else {
            return Err(ProbeError::Fatal("probe directory exhausted".into()));
        };
        match read_embedding(&path, self.dimension) {
            Ok(embedding) => Ok(embedding),
            Err(err) => Err(ProbeError::Transient(format!(
                "skipping {}: {err}",
                path.display()
            ))),
        }
    }
}

fn open_config() -> Result<()> {
    let config_path = config::CONFIG_PATH.as_os_str();
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
