// ABOUTME: Built-in command handlers and route registration for the bot
// ABOUTME: Wires config-driven script routes alongside the Nix-specific commands

pub mod basic;
pub mod fuzzy;
pub mod options;
pub mod packages;
pub mod repl;
pub mod script;
pub mod wiki;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use nixbot_core::config::Config;
use nixbot_core::{KvStore, RegexMatcher, RouteRegistry, SharedHandler};

use self::options::{OptionCatalog, SearchOptions, ShowOption};
use self::packages::SearchPackages;
use self::repl::{DefineBinding, Evaluate, UndefineBinding};
use self::script::ScriptHandler;
use self::wiki::WikiSearch;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Channel and deadline shared by every command that shells out to nix
#[derive(Debug, Clone)]
pub struct NixSettings {
    pub channel: String,
    pub timeout: Duration,
}

impl NixSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            channel: config.nix.channel.clone(),
            timeout: config.nix.eval_timeout(),
        }
    }

    /// `-I nixpkgs=channel:<channel>`
    pub fn nix_path_args(&self) -> [String; 2] {
        ["-I".to_string(), format!("nixpkgs=channel:{}", self.channel)]
    }
}

/// Register every route the bot answers.
///
/// Script routes come from `[scripts]`; the Nix commands are added when
/// `[nix] enabled` is set and share one REPL store.
pub async fn register_all(registry: &mut RouteRegistry, config: &Config) -> Result<()> {
    registry
        .add_route(basic::PING_PATTERN, false, basic::ping)?
        .add_route(basic::ECHO_PATTERN, false, basic::echo)?;

    let script_timeout = config.nix.eval_timeout();
    for (pattern, script) in &config.scripts {
        registry.add_route(pattern, false, ScriptHandler::new(script, script_timeout))?;
        tracing::info!(pattern = %pattern, script = %script, "Registered script handler");
    }

    if !config.nix.enabled {
        tracing::info!("Nix commands disabled");
        return Ok(());
    }

    let settings = NixSettings::from_config(config);
    let store = Arc::new(KvStore::open(config.nix.repl_path(&config.state)).await?);
    let catalog = Arc::new(OptionCatalog::new(settings.clone()));

    registry
        .add_route(wiki::PATTERN, false, WikiSearch::new(HTTP_TIMEOUT)?)?
        .add_route(
            options::OPTIONS_PATTERN,
            false,
            SearchOptions::new(Arc::clone(&catalog)),
        )?
        .add_route(options::OPTION_PATTERN, false, ShowOption::new(catalog))?
        .add_route(packages::PATTERN, false, SearchPackages::new(settings.clone()))?
        .add_route(
            repl::DEFINE_PATTERN,
            false,
            DefineBinding::new(Arc::clone(&store)),
        )?
        .add_route(
            repl::UNDEFINE_PATTERN,
            false,
            UndefineBinding::new(Arc::clone(&store)),
        )?;

    let evaluate: SharedHandler = Arc::new(Evaluate::new(store, settings));
    for pattern in [
        repl::EVAL_PATTERN,
        repl::EVAL_FENCE_PATTERN,
        repl::EVAL_RAW_FENCE_PATTERN,
    ] {
        registry.add_matcher(RegexMatcher::new(pattern)?, false, Arc::clone(&evaluate));
    }

    Ok(())
}
