//! Quest runner CLI.
//!
//! Reads `quest.toml` (or `--config`), the prompt superset, the pruned set,
//! wallet and proxy lists, and drives runs until every selected wallet reaches
//! the goal or the requested number of runs is done.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use quest_runner::core::proxy::ProxyDescriptor;
use quest_runner::core::types::Credential;
use quest_runner::exit_codes;
use quest_runner::io::agent::HttpAgentBackend;
use quest_runner::io::auth::HttpAuthApi;
use quest_runner::io::config::{QuestConfig, load_config, write_config};
use quest_runner::io::credentials::{load_credentials, select_credentials};
use quest_runner::io::prompt_store::write_prompt_list;
use quest_runner::io::proxies::load_optional_proxies;
use quest_runner::io::signer::CommandSigner;
use quest_runner::io::telemetry::HttpTelemetry;
use quest_runner::io::transport::Transport;
use quest_runner::logging;
use quest_runner::looping::{Orchestrator, OrchestratorParts, RunSettings, RunStop};
use quest_runner::pool::QuestionPool;
use quest_runner::register::{Registrar, RegistrationOutcome, RegistrationSettings};

#[derive(Parser)]
#[command(
    name = "quest-runner",
    version,
    about = "Ask agent prompts and report usage for a set of wallets"
)]
struct Cli {
    /// Path to the TOML config. Relative file paths inside it resolve against
    /// its directory.
    #[arg(long, global = true, default_value = "quest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config and an empty pruned-prompt file if missing.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Load every input file and print a summary.
    Validate,
    /// Print the working prompt set (superset minus pruned).
    Pool,
    /// Process shuffled prompt batches for the selected wallets.
    Run {
        /// Restrict the run to these wallet addresses (repeatable).
        #[arg(long = "wallet", value_name = "ADDR")]
        wallets: Vec<String>,
        /// Send every telemetry call directly.
        #[arg(long)]
        no_proxy: bool,
        /// Maximum number of runs.
        #[arg(long, default_value_t = 1)]
        rounds: u32,
    },
    /// Register wallets with the auth service using the configured signer.
    Register {
        /// Restrict registration to these wallet addresses (repeatable).
        #[arg(long = "wallet", value_name = "ADDR")]
        wallets: Vec<String>,
        /// Register every wallet directly.
        #[arg(long)]
        no_proxy: bool,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Validate => cmd_validate(&cli.config),
        Command::Pool => cmd_pool(&cli.config),
        Command::Run {
            wallets,
            no_proxy,
            rounds,
        } => cmd_run(&cli.config, &wallets, no_proxy, rounds),
        Command::Register { wallets, no_proxy } => cmd_register(&cli.config, &wallets, no_proxy),
    }
}

/// Config plus its file paths resolved against the config's directory.
struct Workspace {
    cfg: QuestConfig,
    base: PathBuf,
}

impl Workspace {
    fn load(config_path: &Path) -> Result<Self> {
        let cfg = load_config(config_path)?;
        let base = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self { cfg, base })
    }

    fn path(&self, relative: &Path) -> PathBuf {
        self.base.join(relative)
    }

    fn pool(&self) -> Result<QuestionPool> {
        QuestionPool::load(
            &self.path(&self.cfg.files.prompts),
            &self.path(&self.cfg.files.pruned),
        )
    }

    fn credentials(&self) -> Result<Vec<Credential>> {
        let secrets = self.cfg.files.secrets.as_deref().map(|p| self.path(p));
        load_credentials(&self.path(&self.cfg.files.credentials), secrets.as_deref())
    }

    fn proxies(&self, use_proxy: bool) -> Result<Vec<ProxyDescriptor>> {
        if !use_proxy {
            return Ok(Vec::new());
        }
        load_optional_proxies(&self.path(&self.cfg.files.proxies))
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if force || !config_path.exists() {
        write_config(config_path, &QuestConfig::default())?;
        println!("wrote {}", config_path.display());
    }
    let ws = Workspace::load(config_path)?;
    let pruned = ws.path(&ws.cfg.files.pruned);
    if force || !pruned.exists() {
        write_prompt_list(&pruned, &[])?;
        println!("wrote {}", pruned.display());
    }
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    let ws = Workspace::load(config_path)?;
    println!(
        "config: {} agents, goal {} points, {} per prompt",
        ws.cfg.agents.len(),
        ws.cfg.goal_points,
        ws.cfg.credit_points
    );

    let pool = ws.pool()?;
    println!(
        "prompts: {} total, {} pruned, {} working",
        pool.superset_len(),
        pool.pruned().len(),
        pool.working_set().len()
    );

    let credentials = ws.credentials()?;
    let with_secrets = credentials.iter().filter(|c| c.has_secret()).count();
    println!(
        "wallets: {} ({} with secrets)",
        credentials.len(),
        with_secrets
    );

    let proxies = load_optional_proxies(&ws.path(&ws.cfg.files.proxies))?;
    let usage = if ws.cfg.use_proxy { "enabled" } else { "disabled" };
    println!("proxies: {} ({usage})", proxies.len());
    Ok(())
}

fn cmd_pool(config_path: &Path) -> Result<()> {
    let ws = Workspace::load(config_path)?;
    let pool = ws.pool()?;
    let working = pool.working_set();
    for prompt in &working {
        println!("{prompt}");
    }
    eprintln!(
        "{} working of {} ({} pruned)",
        working.len(),
        pool.superset_len(),
        pool.pruned().len()
    );
    Ok(())
}

fn cmd_run(config_path: &Path, wallets: &[String], no_proxy: bool, rounds: u32) -> Result<()> {
    logging::init();
    let ws = Workspace::load(config_path)?;
    let pool = ws.pool()?;
    let credentials = select_credentials(&ws.credentials()?, wallets)?;
    let use_proxy = ws.cfg.use_proxy && !no_proxy;
    let proxies = ws.proxies(use_proxy)?;
    let settings = RunSettings::from_config(&ws.cfg);
    let agents = HttpAgentBackend::new(
        Transport::direct(settings.request_timeout).context("build agent transport")?,
    );
    let telemetry = HttpTelemetry::new(
        ws.cfg.telemetry.ttft_url.clone(),
        ws.cfg.telemetry.usage_url.clone(),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    runtime.block_on(async {
        let mut orchestrator = Orchestrator::new(OrchestratorParts {
            agents,
            telemetry,
            rng: StdRng::from_entropy(),
            settings,
            endpoints: ws.cfg.agents.clone(),
            credentials,
            pool,
            use_proxy,
            proxies,
        });

        for round in 1..=rounds.max(1) {
            info!(round, rounds, "starting run");
            let outcome = orchestrator.run_batch().await;
            for (address, score) in &outcome.scores {
                info!(credential = %address, score, "final score");
            }
            match outcome.stop {
                RunStop::GoalReached => {
                    info!("goal reached for every wallet");
                    return Ok(());
                }
                RunStop::PoolEmpty => {
                    info!("no prompts left; clear the pruned file to retry them");
                    return Ok(());
                }
                RunStop::BatchExhausted => {}
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn cmd_register(config_path: &Path, wallets: &[String], no_proxy: bool) -> Result<()> {
    logging::init();
    let ws = Workspace::load(config_path)?;
    let credentials = select_credentials(&ws.credentials()?, wallets)?;
    let missing: Vec<&str> = credentials
        .iter()
        .filter(|c| !c.has_secret())
        .map(|c| c.address.as_str())
        .collect();
    if !missing.is_empty() {
        bail!(
            "no secret for {}; set files.secrets to a key file",
            missing.join(", ")
        );
    }
    let registration = &ws.cfg.registration;
    let signer = CommandSigner::new(
        &registration.signer_command,
        Duration::from_secs(registration.signer_timeout_secs),
    )?;
    let auth = HttpAuthApi::new(registration.auth_url.clone(), registration.ip_url.clone());
    let use_proxy = ws.cfg.use_proxy && !no_proxy;
    let proxies = ws.proxies(use_proxy)?;
    let settings = RegistrationSettings::from_config(&ws.cfg);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    let outcomes = runtime.block_on(async {
        let mut registrar = Registrar::new(auth, signer, settings, use_proxy, proxies);
        registrar.register_all(&credentials).await
    });

    let registered = outcomes
        .iter()
        .filter(|(_, outcome)| matches!(outcome, RegistrationOutcome::Registered { .. }))
        .count();
    info!(registered, total = outcomes.len(), "registration finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["quest-runner", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, PathBuf::from("quest.toml"));
    }

    #[test]
    fn parse_run_with_wallets() {
        let cli = Cli::parse_from([
            "quest-runner",
            "--config",
            "alt.toml",
            "run",
            "--wallet",
            "0xa",
            "--wallet",
            "0xb",
            "--no-proxy",
        ]);
        let Command::Run {
            wallets,
            no_proxy,
            rounds,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(wallets, vec!["0xa", "0xb"]);
        assert!(no_proxy);
        assert_eq!(rounds, 1);
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
    }

    #[test]
    fn parse_register_with_wallet() {
        let cli = Cli::parse_from(["quest-runner", "register", "--wallet", "0xa", "--no-proxy"]);
        let Command::Register { wallets, no_proxy } = cli.command else {
            panic!("expected register");
        };
        assert_eq!(wallets, vec!["0xa"]);
        assert!(no_proxy);
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = temp.path().join("quest.toml");
        let ws = Workspace::load(&config).expect("defaults");
        assert_eq!(
            ws.path(&ws.cfg.files.prompts),
            temp.path().join("payloads.json")
        );
    }
}
