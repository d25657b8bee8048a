//! # ActionBot CLI
//!
//! Usage:
//!   actionbot run                      # Run rules against a console transport
//!   actionbot validate                 # Load config and compile every rule
//!   actionbot generate [--force]       # Write a sample config
//!   actionbot --config bot.yaml run    # Use a specific config file

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use actionbot_actions::{ActionEngine, ActionRegistry, Trigger};
use actionbot_core::config::{ActionBotConfig, AuthConfig, SAMPLE_CONFIG};
use actionbot_core::types::{EmbedPayload, InboundMessage, InboundReaction};
use actionbot_core::{AuthProvider, ResponseExecutor};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "actionbot",
    version,
    about = "🤖 ActionBot — configuration-driven chat bot actions"
)]
struct Cli {
    /// Config file (.toml, .yaml or .yml); defaults to ~/.actionbot/config.toml
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the rules against stdin (channel "console")
    Run {
        /// Author ID for console messages
        #[arg(long, default_value = "console-user")]
        user: String,

        /// Guild ID attached to console messages
        #[arg(long)]
        guild: Option<String>,

        /// Do not start the scheduler
        #[arg(long)]
        no_scheduler: bool,
    },
    /// Validate the configuration and print a rule summary
    Validate,
    /// Write a sample configuration
    Generate {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose { "actionbot=debug" } else { "actionbot=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .as_deref()
        .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
        .unwrap_or_else(ActionBotConfig::default_path)
}

fn load_config(path: &Path) -> Result<ActionBotConfig> {
    if !path.exists() {
        bail!(
            "Config not found at {}. Run `actionbot generate` to create one.",
            path.display()
        );
    }
    let config = ActionBotConfig::load_from(path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);
    let path = config_path(&cli);

    match &cli.command {
        Command::Run {
            user,
            guild,
            no_scheduler,
        } => run(&path, user, guild.as_deref(), !no_scheduler).await,
        Command::Validate => validate(&path),
        Command::Generate { force } => generate(&path, *force),
    }
}

async fn run(path: &Path, user: &str, guild: Option<&str>, scheduler: bool) -> Result<()> {
    let config = load_config(path)?;
    let auth: Option<Arc<dyn AuthProvider>> = config
        .auth
        .enabled
        .then(|| Arc::new(ConfigAuth::from_config(&config.auth)) as Arc<dyn AuthProvider>);
    let engine = ActionEngine::new(&config, Arc::new(ConsoleExecutor::default()), auth)?;
    if scheduler {
        engine.start_scheduler()?;
    }

    println!("🤖 ActionBot console — {} rules loaded", engine.list_rules().len());
    println!("   Type messages (prefix '{}'), `/react <emoji>` to react to the last one, Ctrl-D to quit.\n", engine.prefix());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_id = 0u64;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let handled = if let Some(emoji) = line.strip_prefix("/react ") {
            let mut reaction =
                InboundReaction::new(next_id.to_string(), "console", user, emoji.trim());
            reaction.guild_id = guild.map(str::to_string);
            engine.handle_inbound_reaction(&reaction).await
        } else {
            next_id += 1;
            let mut message = InboundMessage::new(next_id.to_string(), "console", user, line);
            message.guild_id = guild.map(str::to_string);
            engine.handle_inbound_message(&message).await
        };
        if let Err(e) = handled {
            tracing::error!("❌ {e}");
        }
    }

    engine.shutdown().await?;
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let registry = ActionRegistry::load(&config.actions)?;

    println!("✅ {} is valid", path.display());
    println!("   Prefix:  {}", config.bot.prefix);
    println!(
        "   Workers: {} (queue {}, {:?})",
        config.dispatcher.workers, config.dispatcher.queue_capacity, config.dispatcher.backpressure
    );
    println!("   Auth:    {}", if config.auth.enabled { "enabled" } else { "disabled" });
    println!("   Rules:   {}\n", registry.len());

    for rule in registry.rules() {
        let trigger = match &rule.trigger {
            Trigger::Command(keyword) => format!("{}{keyword}", config.bot.prefix),
            Trigger::Pattern(regex) => format!("/{}/", regex.as_str()),
            Trigger::Reaction(emoji) => emoji.clone(),
            Trigger::Scheduled {
                expression,
                channels,
            } => format!("{expression} → {}", channels.join(", ")),
        };
        let mut extras = Vec::new();
        if let Some(limit) = &rule.rate_limit {
            extras.push(format!(
                "limit {}/{}s per {}",
                limit.requests, limit.window, limit.scope
            ));
        }
        if !rule.conditions.is_empty() {
            extras.push(format!("{} conditions", rule.conditions.len()));
        }
        if rule.require_auth {
            extras.push("auth".into());
        }
        println!(
            "   • {:<20} {:<10} {:<30} → {}{}",
            rule.name,
            rule.kind().to_string(),
            trigger,
            rule.response.kind(),
            if extras.is_empty() {
                String::new()
            } else {
                format!("  [{}]", extras.join(", "))
            }
        );
    }
    Ok(())
}

fn generate(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, SAMPLE_CONFIG)?;
    println!("✅ Sample config written to {}", path.display());
    Ok(())
}

/// Transport that prints responses to stdout.
#[derive(Default)]
struct ConsoleExecutor {
    dm_channels: AtomicU64,
}

#[async_trait]
impl ResponseExecutor for ConsoleExecutor {
    async fn send_text(&self, channel_id: &str, content: &str) -> actionbot_core::Result<()> {
        println!("[#{channel_id}] {content}");
        Ok(())
    }

    async fn send_embed(&self, channel_id: &str, embed: &EmbedPayload) -> actionbot_core::Result<()> {
        println!("[#{channel_id}] ┃ {}", embed.title);
        if !embed.description.is_empty() {
            println!("[#{channel_id}] ┃ {}", embed.description);
        }
        for field in &embed.fields {
            println!("[#{channel_id}] ┃ {}: {}", field.name, field.value);
        }
        if let Some(footer) = &embed.footer {
            println!("[#{channel_id}] ┃ — {footer}");
        }
        Ok(())
    }

    async fn create_direct_channel(&self, user_id: &str) -> actionbot_core::Result<String> {
        let n = self.dm_channels.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("dm-{user_id}-{n}"))
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> actionbot_core::Result<()> {
        println!("[#{channel_id}] reacted {emoji} to message {message_id}");
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> actionbot_core::Result<()> {
        println!("[#{channel_id}] deleted message {message_id}");
        Ok(())
    }

    async fn fetch_roles(&self, _guild_id: &str, _user_id: &str) -> actionbot_core::Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn fetch_permission_mask(&self, _user_id: &str, _channel_id: &str) -> actionbot_core::Result<u64> {
        Ok(0)
    }
}

/// Auth backed by the `[auth]` section: listed users count as authenticated.
struct ConfigAuth {
    users: HashSet<String>,
    url: String,
}

impl ConfigAuth {
    fn from_config(config: &AuthConfig) -> Self {
        Self {
            users: config.authorized_users.iter().cloned().collect(),
            url: config.auth_url.clone(),
        }
    }
}

#[async_trait]
impl AuthProvider for ConfigAuth {
    async fn is_authenticated(&self, user_id: &str) -> bool {
        self.users.contains(user_id)
    }

    fn auth_url(&self, user_id: &str) -> String {
        self.url.replace("{user}", user_id)
    }
}
