//! Arbor security CLI
//!
//! Runs the sanitizers and detectors over command-line input, generates
//! agent identities and inspects trust tiers and configuration.

use anyhow::{Context, Result};
use arbor_security::{
    config::ArborConfig,
    identity::Identity,
    sanitizer::{Payload, SanitizeOptions, SanitizerRegistry},
    taint::Taint,
    trust::{ActionSet, TrustPolicy, TrustTier},
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "arbor-security")]
#[command(author = "Arbor Team")]
#[command(version)]
#[command(about = "Sanitize untrusted input, manage agent identities and inspect trust tiers")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ARBOR_SECURITY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run sanitizers over the input, in order
    Sanitize {
        /// Comma-separated sanitizer names
        #[arg(long = "with", value_delimiter = ',', required = true)]
        sanitizers: Vec<String>,

        /// Root directory for path_traversal
        #[arg(long)]
        root: Option<PathBuf>,

        /// Let ssrf accept private and loopback destinations
        #[arg(long)]
        allow_private: bool,

        /// Value to sanitize
        input: String,
    },

    /// Scan the input for attack patterns
    Detect {
        /// Detector name (all detectors when omitted)
        #[arg(long = "with")]
        sanitizer: Option<String>,

        /// Value to scan
        input: String,
    },

    /// Agent identity operations
    Identity {
        #[command(subcommand)]
        command: IdentityCommands,
    },

    /// Trust tier operations
    Trust {
        #[command(subcommand)]
        command: TrustCommands,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[derive(Subcommand)]
enum IdentityCommands {
    /// Generate a new identity and print its public record
    Generate {
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum TrustCommands {
    /// Show the tier, sandbox level and allowed actions for a trust score
    Tier {
        /// Trust score (0-100)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        score: u8,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("arbor_security={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = match &cli.config {
        Some(path) => ArborConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ArborConfig::default(),
    };

    match cli.command {
        Commands::Sanitize {
            sanitizers,
            root,
            allow_private,
            input,
        } => run_sanitize(&config, &sanitizers, root, allow_private, input),
        Commands::Detect { sanitizer, input } => run_detect(&config, sanitizer.as_deref(), input),
        Commands::Identity {
            command: IdentityCommands::Generate { name },
        } => generate_identity(name.as_deref()),
        Commands::Trust {
            command: TrustCommands::Tier { score },
        } => show_tier(&config, score),
        Commands::Config { default } => show_config(if default { None } else { Some(&config) }),
    }
}

fn run_sanitize(
    config: &ArborConfig,
    sanitizers: &[String],
    root: Option<PathBuf>,
    allow_private: bool,
    input: String,
) -> Result<()> {
    let registry = SanitizerRegistry::from_config(&config.sanitizers);
    let mut opts = SanitizeOptions::new().allow_private(allow_private);
    if let Some(root) = root {
        opts = opts.allowed_root(root);
    }

    let taint = Taint::unknown().with_source("cli");
    let (value, taint) = registry.sanitize_all(sanitizers, &Payload::Text(input), &taint, &opts)?;

    match value {
        Payload::Text(text) => println!("{}", text),
        Payload::Structured(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Payload::Bytes(bytes) => println!("{}", hex::encode(bytes)),
    }
    tracing::info!(
        sanitizations = taint.sanitizations.bits(),
        confidence = %taint.confidence,
        "Sanitized"
    );
    Ok(())
}

fn run_detect(config: &ArborConfig, sanitizer: Option<&str>, input: String) -> Result<()> {
    let registry = SanitizerRegistry::from_config(&config.sanitizers);
    let payload = Payload::Text(input);

    let findings = match sanitizer {
        Some(name) => {
            let detection = registry.detect(name, &payload)?;
            vec![(name.to_string(), detection.patterns().to_vec())]
        }
        None => registry
            .detect_all(&payload)
            .into_iter()
            .map(|(kind, detection)| (kind.to_string(), detection.patterns().to_vec()))
            .collect(),
    };

    let unsafe_findings: Vec<_> = findings
        .into_iter()
        .filter(|(_, patterns)| !patterns.is_empty())
        .collect();
    if unsafe_findings.is_empty() {
        println!("safe");
    } else {
        for (name, patterns) in unsafe_findings {
            println!("{}: {}", name, patterns.join(", "));
        }
    }
    Ok(())
}

fn generate_identity(name: Option<&str>) -> Result<()> {
    let identity = Identity::generate(name)?;
    println!("{}", serde_json::to_string_pretty(&identity.to_json())?);
    Ok(())
}

fn show_tier(config: &ArborConfig, score: u8) -> Result<()> {
    let policy = TrustPolicy::from_config(&config.trust)?;
    let tier = TrustTier::from_score(score);
    let bounds = policy.bounds().for_tier(tier);

    let actions = match &bounds.allowed_actions {
        ActionSet::All => "all".to_string(),
        ActionSet::Only(actions) => actions
            .iter()
            .map(|action| action.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    };

    println!("tier:    {}", tier);
    println!("sandbox: {}", bounds.sandbox);
    println!("actions: {}", actions);
    Ok(())
}

fn show_config(config: Option<&ArborConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    println!("{}", config.to_toml_string()?);
    Ok(())
}
