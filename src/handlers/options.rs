// ABOUTME: !options and !option commands backed by the NixOS options catalogue
// ABOUTME: The catalogue is built with `nix build` once and reused for an hour

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use nixbot_core::render::escape_html;
use nixbot_core::{Handler, HandlerContext};
use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::Mutex;

use super::fuzzy;
use super::NixSettings;
use crate::process;

pub const OPTIONS_PATTERN: &str = "^!options (?P<search>.+)";
pub const OPTION_PATTERN: &str = "^!option (?P<search>.+)";

const CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const SEARCH_LIMIT: usize = 10;

const OPTIONS_EXPR: &str = r#"
with import <nixpkgs> {}; let
  eval = import (pkgs.path + "/nixos/lib/eval-config.nix") { modules = []; };
  opts = (nixosOptionsDoc { options = eval.options; }).optionsJSON;
in runCommandLocal "options.json" { inherit opts; } "cp $opts/share/doc/nixos/options.json $out"
"#;

/// A literal Nix expression as rendered in the options JSON
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionText {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NixOption {
    #[serde(default)]
    pub declarations: Vec<String>,
    #[serde(default)]
    pub default: Option<OptionText>,
    #[serde(default)]
    pub example: Option<OptionText>,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub option_type: String,
    #[serde(default)]
    pub read_only: bool,
}

pub type OptionMap = BTreeMap<String, NixOption>;

#[derive(Debug, Deserialize)]
struct BuildResult {
    outputs: BuildOutputs,
}

#[derive(Debug, Deserialize)]
struct BuildOutputs {
    out: String,
}

/// Lazily built, time-limited cache of every NixOS option
pub struct OptionCatalog {
    settings: NixSettings,
    cached: Mutex<Option<(Instant, Arc<OptionMap>)>>,
}

impl OptionCatalog {
    pub fn new(settings: NixSettings) -> Self {
        Self {
            settings,
            cached: Mutex::new(None),
        }
    }

    /// Current catalogue, rebuilding it when missing or older than an hour.
    /// Concurrent callers wait for a single rebuild.
    pub async fn get(&self) -> Result<Arc<OptionMap>> {
        let mut cached = self.cached.lock().await;
        if let Some((fetched_at, options)) = cached.as_ref() {
            if fetched_at.elapsed() < CACHE_TTL {
                return Ok(Arc::clone(options));
            }
        }

        let options = Arc::new(self.fetch().await?);
        tracing::info!(options = options.len(), "Refreshed NixOS options catalogue");
        *cached = Some((Instant::now(), Arc::clone(&options)));
        Ok(options)
    }

    async fn fetch(&self) -> Result<OptionMap> {
        let mut cmd = Command::new("nix");
        cmd.arg("build")
            .args(self.settings.nix_path_args())
            .args([
                "--impure",
                "--no-allow-import-from-derivation",
                "--no-link",
                "--json",
                "--expr",
                OPTIONS_EXPR,
            ]);

        let output = process::run(cmd, None, self.settings.timeout).await?;
        if !output.success() {
            anyhow::bail!("nix build failed: {}", output.stderr.trim());
        }

        let results: Vec<BuildResult> =
            serde_json::from_str(&output.stdout).context("Failed to parse nix build output")?;
        let out = results
            .first()
            .map(|r| r.outputs.out.clone())
            .context("nix build produced no options.json")?;

        let raw = tokio::fs::read_to_string(&out)
            .await
            .with_context(|| format!("Failed to read {}", out))?;
        serde_json::from_str(&raw).context("Failed to parse options.json")
    }
}

/// Up to ten option names matching the case-insensitive regex `search`,
/// in sorted order
pub fn search_options<'a>(options: &'a OptionMap, search: &str) -> Result<Vec<&'a str>> {
    let re = Regex::new(&format!("(?i){}", search))
        .with_context(|| format!("Invalid search pattern: {}", search))?;
    Ok(options
        .keys()
        .filter(|name| re.is_match(name))
        .take(SEARCH_LIMIT)
        .map(String::as_str)
        .collect())
}

pub fn format_option_list(names: &[&str]) -> String {
    if names.is_empty() {
        return "No options found".to_string();
    }
    names
        .iter()
        .map(|name| {
            format!(
                "- [{}](https://search.nixos.org/options?channel=unstable&query={})",
                escape_html(name),
                name
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Path of a declaration relative to the nixpkgs source root
pub fn declaration_path(declaration: &str) -> &str {
    declaration
        .strip_prefix("/nix/store/")
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, path)| path)
        .unwrap_or(declaration)
}

pub fn format_option_details(name: &str, option: &NixOption) -> String {
    let mut out = format!(
        "**Name**: {}\n\n**Description**: {}\n\n**Type**: {}\n",
        escape_html(name),
        option.description.trim(),
        option.option_type
    );

    if let Some(default) = &option.default {
        out.push_str(&format!("\n**Default**:\n```nix\n{}\n```\n", default.text));
    }
    if let Some(example) = &option.example {
        out.push_str(&format!("\n**Example**:\n```nix\n{}\n```\n", example.text));
    }
    if let Some(declaration) = option.declarations.first() {
        let path = declaration_path(declaration);
        out.push_str(&format!(
            "\n**Declared in** [{}](https://github.com/NixOS/nixpkgs/blob/nixos-unstable/{})\n",
            path, path
        ));
    }
    out.push_str(&format!(
        "\n**Options page** [NixOS Options](https://search.nixos.org/options?channel=unstable&query={})",
        name
    ));
    out
}

/// `!options <regex>`
pub struct SearchOptions {
    catalog: Arc<OptionCatalog>,
}

impl SearchOptions {
    pub fn new(catalog: Arc<OptionCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Handler for SearchOptions {
    async fn call(&self, cx: HandlerContext) -> Result<()> {
        let search = cx.vars.get_or_empty("search").trim();
        let options = self.catalog.get().await?;
        let names = search_options(&options, search)?;
        cx.reply.send_markdown(&format_option_list(&names)).await
    }
}

/// `!option <name>`: details for the closest option name
pub struct ShowOption {
    catalog: Arc<OptionCatalog>,
}

impl ShowOption {
    pub fn new(catalog: Arc<OptionCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Handler for ShowOption {
    async fn call(&self, cx: HandlerContext) -> Result<()> {
        let search = cx.vars.get_or_empty("search").trim();
        let options = self.catalog.get().await?;

        let name = fuzzy::closest(search, options.keys().map(String::as_str))
            .context("unable to find option")?;
        let option = options.get(name).context("unable to find option")?;

        cx.reply
            .send_markdown_summary(&format_option_details(name, option), &escape_html(name))
            .await
    }
}
