//! ConsignVault CLI - Command line interface for a custody workspace.
//!
//! This tool creates a workspace, registers principal key pairs, and
//! uploads, reads and shares encrypted shipment documents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use consignvault_common::{ArtifactId, PrincipalId, Role, ShipmentId};
use consignvault_crypto::KdfParams;
use consignvault_vault::{ArtifactOptions, Recipient, StaticRoster, Workspace};

/// Environment variable holding the master secret for non-interactive use.
const SECRET_ENV: &str = "CONSIGNVAULT_MASTER_SECRET";

#[derive(Parser)]
#[command(name = "consignvault")]
#[command(about = "ConsignVault - Encrypted custody of shipment documents")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Workspace directory.
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strength {
    /// PBKDF2-HMAC-SHA256, 600,000 iterations.
    Standard,
    /// PBKDF2-HMAC-SHA256, 100,000 iterations.
    Minimum,
    /// Argon2id, 64 MiB.
    Argon2id,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new workspace.
    Init {
        /// Key derivation strength.
        #[arg(short, long, value_enum, default_value = "standard")]
        strength: Strength,
    },

    /// Generate or import a principal's key pair.
    Keygen {
        /// Principal identifier.
        #[arg(short, long)]
        principal: String,

        /// RSA modulus size in bits.
        #[arg(short, long, default_value_t = 2048)]
        bits: usize,

        /// Import this PEM private key instead of generating one.
        #[arg(short, long)]
        import: Option<PathBuf>,
    },

    /// Print a principal's public key.
    PublicKey {
        /// Principal identifier.
        #[arg(short, long)]
        principal: String,
    },

    /// Encrypt a file and grant access to its recipients.
    Upload {
        /// File to encrypt.
        #[arg(short, long)]
        file: PathBuf,

        /// Uploading principal (becomes OWNER).
        #[arg(short = 'p', long)]
        from: String,

        /// Additional recipient as PRINCIPAL:ROLE (repeatable).
        #[arg(short, long, value_parser = parse_recipient)]
        to: Vec<Recipient>,

        /// Shipment the file belongs to.
        #[arg(short, long)]
        shipment: Option<String>,

        /// Roster JSON naming handlers and authorities for the shipment.
        #[arg(long, requires = "shipment")]
        roster: Option<PathBuf>,
    },

    /// Decrypt an artifact.
    Read {
        /// Artifact id.
        #[arg(short, long)]
        artifact: String,

        /// Reading principal.
        #[arg(short, long)]
        principal: String,

        /// Output file (default: stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Give a principal access to an existing artifact.
    Grant {
        /// Artifact id.
        #[arg(short, long)]
        artifact: String,

        /// Principal to grant access to.
        #[arg(short, long)]
        principal: String,

        /// Role of the grant.
        #[arg(short, long, default_value = "ASSIGNED")]
        role: Role,
    },

    /// List the grants of an artifact.
    Grants {
        /// Artifact id.
        #[arg(short, long)]
        artifact: String,
    },

    /// Show workspace or artifact information.
    Info {
        /// Artifact id (default: whole workspace).
        #[arg(short, long)]
        artifact: Option<String>,
    },

    /// Check an artifact blob against its recorded hash.
    Verify {
        /// Artifact id.
        #[arg(short, long)]
        artifact: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let root = cli.root.as_path();
    match cli.command {
        Commands::Init { strength } => cmd_init(root, strength),

        Commands::Keygen {
            principal,
            bits,
            import,
        } => cmd_keygen(root, &principal, bits, import.as_deref()),

        Commands::PublicKey { principal } => cmd_public_key(root, &principal),

        Commands::Upload {
            file,
            from,
            to,
            shipment,
            roster,
        } => cmd_upload(root, &file, &from, &to, shipment, roster.as_deref()),

        Commands::Read {
            artifact,
            principal,
            out,
        } => cmd_read(root, &artifact, &principal, out.as_deref()),

        Commands::Grant {
            artifact,
            principal,
            role,
        } => cmd_grant(root, &artifact, &principal, role),

        Commands::Grants { artifact } => cmd_grants(root, &artifact),

        Commands::Info { artifact } => cmd_info(root, artifact.as_deref()),

        Commands::Verify { artifact } => cmd_verify(root, &artifact),
    }
}

/// Parse `PRINCIPAL:ROLE`.
fn parse_recipient(value: &str) -> std::result::Result<Recipient, String> {
    let (principal, role) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("Expected PRINCIPAL:ROLE, got '{}'", value))?;
    let principal = PrincipalId::new(principal).map_err(|e| e.to_string())?;
    let role = role.parse::<Role>().map_err(|e| e.to_string())?;
    Ok(Recipient::new(principal, role))
}

/// Master secret from the environment, or prompt for it securely.
fn master_secret(prompt: &str) -> Result<Zeroizing<Vec<u8>>> {
    if let Ok(secret) = std::env::var(SECRET_ENV) {
        return Ok(Zeroizing::new(secret.into_bytes()));
    }
    let secret = rpassword::prompt_password(prompt).context("Failed to read master secret")?;
    Ok(Zeroizing::new(secret.into_bytes()))
}

fn open_workspace(root: &Path) -> Result<Workspace> {
    let secret = master_secret("Master secret: ")?;
    Workspace::open(root, &secret)
        .with_context(|| format!("Failed to open workspace at {}", root.display()))
}

fn principal_id(value: &str) -> Result<PrincipalId> {
    PrincipalId::new(value).context("Invalid principal id")
}

fn artifact_id(value: &str) -> Result<ArtifactId> {
    ArtifactId::parse(value).context("Invalid artifact id")
}

/// Create a new workspace.
fn cmd_init(root: &Path, strength: Strength) -> Result<()> {
    info!("Creating workspace at: {}", root.display());

    let kdf_params = match strength {
        Strength::Standard => KdfParams::standard(),
        Strength::Minimum => KdfParams::minimum(),
        Strength::Argon2id => KdfParams::argon2id(),
    };

    let secret = if std::env::var(SECRET_ENV).is_ok() {
        master_secret("")?
    } else {
        let secret = master_secret("Enter master secret: ")?;
        let confirm = master_secret("Confirm master secret: ")?;
        if *secret != *confirm {
            anyhow::bail!("Secrets do not match");
        }
        secret
    };

    if secret.is_empty() {
        anyhow::bail!("Master secret cannot be empty");
    }

    let workspace =
        Workspace::create(root, &secret, kdf_params).context("Failed to create workspace")?;

    println!("Workspace created successfully!");
    println!("  Location: {}", workspace.root().display());
    println!("  Blob store: {}", workspace.config().settings().blob_provider);

    Ok(())
}

/// Generate or import a key pair.
fn cmd_keygen(root: &Path, principal: &str, bits: usize, import: Option<&Path>) -> Result<()> {
    let id = principal_id(principal)?;
    let workspace = open_workspace(root)?.map_manager(|m| m.with_key_bits(bits));
    let keys = workspace.manager().principals();

    let registered = match import {
        Some(path) => {
            let pem = Zeroizing::new(
                fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
            );
            keys.import_keypair(&id, &pem)
                .context("Failed to import key pair")?
        }
        None => keys
            .generate_keypair(&id)
            .context("Failed to generate key pair")?,
    };

    println!("Key pair registered for {}", registered.id);
    println!("  Bits: {}", registered.public_key.bits());
    println!("  Fingerprint: {}", registered.public_key.fingerprint());
    println!("  Registered: {}", registered.registered_at);

    Ok(())
}

/// Print a public key as PEM.
fn cmd_public_key(root: &Path, principal: &str) -> Result<()> {
    let id = principal_id(principal)?;
    let workspace = open_workspace(root)?;

    let pem = workspace
        .manager()
        .principals()
        .public_key_pem(&id)
        .context("Failed to look up public key")?;
    print!("{}", pem);

    Ok(())
}

/// Encrypt a file for its recipients.
fn cmd_upload(
    root: &Path,
    file: &Path,
    from: &str,
    to: &[Recipient],
    shipment: Option<String>,
    roster: Option<&Path>,
) -> Result<()> {
    info!("Uploading: {}", file.display());

    let uploader = principal_id(from)?;
    let workspace = open_workspace(root)?;
    let manager = workspace.manager();

    let source = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let reader = BufReader::new(source);
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let shipment = shipment
        .map(ShipmentId::new)
        .transpose()
        .context("Invalid shipment id")?;

    let artifact = match (&shipment, roster) {
        (Some(shipment), Some(roster_path)) => {
            let mut roster = StaticRoster::load(roster_path)
                .with_context(|| format!("Failed to load roster {}", roster_path.display()))?;
            for extra in to {
                match extra.role {
                    Role::Authority => {
                        roster = roster.with_authority(extra.principal_id.clone());
                    }
                    _ => {
                        roster = roster.with_handler(shipment.clone(), extra.principal_id.clone());
                    }
                }
            }
            manager.create_for_shipment(reader, shipment, &uploader, &roster, file_name)
        }
        _ => {
            let mut recipients = vec![Recipient::owner(uploader)];
            recipients.extend(to.iter().cloned());
            let options = ArtifactOptions {
                shipment_id: shipment,
                file_name,
            };
            manager.create(reader, &recipients, &options)
        }
    }
    .context("Failed to create artifact")?;

    println!("{}", artifact.id);

    Ok(())
}

/// Decrypt an artifact to a file or stdout.
fn cmd_read(root: &Path, artifact: &str, principal: &str, out: Option<&Path>) -> Result<()> {
    let id = artifact_id(artifact)?;
    let reader = principal_id(principal)?;
    let workspace = open_workspace(root)?;
    let manager = workspace.manager();

    match out {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            let result = manager.read(&id, &reader, BufWriter::new(file));
            if result.is_err() {
                // Nothing was decrypted; do not leave an empty file behind.
                let _ = fs::remove_file(path);
            }
            let bytes = result.context("Failed to read artifact")?;
            info!("Wrote {} bytes to {}", bytes, path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            manager
                .read(&id, &reader, &mut handle)
                .context("Failed to read artifact")?;
            handle.flush()?;
        }
    }

    Ok(())
}

/// Grant access by re-wrapping.
fn cmd_grant(root: &Path, artifact: &str, principal: &str, role: Role) -> Result<()> {
    let id = artifact_id(artifact)?;
    let target = principal_id(principal)?;
    let workspace = open_workspace(root)?;

    let grant = workspace
        .manager()
        .add_access(&id, &target, role)
        .context("Failed to grant access")?;

    println!(
        "Granted {} access to {} as {}",
        grant.principal_id, grant.artifact_id, grant.role
    );

    Ok(())
}

/// List grants of an artifact.
fn cmd_grants(root: &Path, artifact: &str) -> Result<()> {
    let id = artifact_id(artifact)?;
    let workspace = open_workspace(root)?;

    let grants = workspace
        .manager()
        .grants(&id)
        .context("Failed to list grants")?;

    if grants.is_empty() {
        println!("(no grants)");
        return Ok(());
    }

    for grant in grants {
        println!(
            "{:<24} {:<10} hash {}  updated {}",
            grant.principal_id,
            grant.role,
            grant.content_hash.short(),
            grant.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

/// Show workspace or artifact information.
fn cmd_info(root: &Path, artifact: Option<&str>) -> Result<()> {
    let workspace = open_workspace(root)?;
    let manager = workspace.manager();

    match artifact {
        Some(artifact) => {
            let id = artifact_id(artifact)?;
            let artifact = manager.artifact(&id).context("Failed to look up artifact")?;

            println!("Artifact Information:");
            println!("  ID: {}", artifact.id);
            if let Some(shipment) = &artifact.shipment_id {
                println!("  Shipment: {}", shipment);
            }
            if let Some(name) = &artifact.file_name {
                println!("  File: {}", name);
            }
            println!("  State: {}", artifact.state);
            println!("  Plaintext: {} bytes", artifact.plaintext_len);
            println!("  Blob: {} bytes", artifact.blob_size);
            println!("  Hash: {}", artifact.content_hash);
            println!("  Created: {}", artifact.created_at);
            println!("  Updated: {}", artifact.updated_at);
            let readers: Vec<String> = manager
                .authorized_principals(&id)?
                .into_iter()
                .map(String::from)
                .collect();
            println!("  Readers: {}", readers.join(", "));
        }
        None => {
            let settings = workspace.config().settings();

            println!("Workspace Information:");
            println!("  Location: {}", workspace.root().display());
            println!(
                "  Version: {}.{}",
                settings.version.major, settings.version.minor
            );
            println!("  Blob store: {}", settings.blob_provider);
            println!("  Created: {}", settings.created_at);
            match &settings.kdf_params {
                KdfParams::Pbkdf2Sha256 { iterations } => {
                    println!("  KDF: PBKDF2-HMAC-SHA256, {} iterations", iterations)
                }
                KdfParams::Argon2id {
                    memory_cost,
                    time_cost,
                    parallelism,
                } => println!(
                    "  KDF: Argon2id, {} KiB, {} passes, {} lanes",
                    memory_cost, time_cost, parallelism
                ),
            }

            let principals = manager.principals().list()?;
            println!("  Principals: {}", principals.len());
            for principal in principals {
                println!(
                    "    {:<24} {}",
                    principal.principal_id,
                    &principal.fingerprint[..16]
                );
            }
            println!("  Artifacts: {}", manager.list_artifacts()?.len());
        }
    }

    Ok(())
}

/// Verify an artifact's blob hash.
fn cmd_verify(root: &Path, artifact: &str) -> Result<()> {
    let id = artifact_id(artifact)?;
    let workspace = open_workspace(root)?;

    let hash = workspace
        .manager()
        .verify(&id)
        .context("Verification failed")?;
    println!("OK {}", hash);

    Ok(())
}
