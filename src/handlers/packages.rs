// ABOUTME: !package / !packages command - `nix search` over nixpkgs
// ABOUTME: Results are ranked by edit distance to the search term

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use nixbot_core::{Handler, HandlerContext};
use serde::Deserialize;
use tokio::process::Command;

use super::fuzzy::levenshtein;
use super::NixSettings;
use crate::process;

pub const PATTERN: &str = "^!packages? (?P<search>.+)";

const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pname: String,
    #[serde(default)]
    pub version: String,
}

/// Attribute path without the `legacyPackages.<system>.` prefix
pub fn attr_name(key: &str) -> &str {
    match key.strip_prefix("legacyPackages.") {
        Some(rest) => rest.split_once('.').map(|(_, attr)| attr).unwrap_or(rest),
        None => key,
    }
}

/// The closest matches to `search`, best first
pub fn rank_packages<'a>(
    packages: &'a BTreeMap<String, Package>,
    search: &str,
) -> Vec<(&'a str, &'a Package)> {
    let mut ranked: Vec<(&str, &Package)> = packages
        .iter()
        .map(|(key, package)| (attr_name(key), package))
        .collect();
    ranked.sort_by_key(|(name, _)| levenshtein(search, name));
    ranked.truncate(SEARCH_LIMIT);
    ranked
}

pub fn format_packages(ranked: &[(&str, &Package)]) -> String {
    if ranked.is_empty() {
        return "No packages found".to_string();
    }
    ranked
        .iter()
        .map(|(name, package)| {
            format!(
                "- {} ({}) - [NixOS Search](https://search.nixos.org/packages?channel=unstable&query={})",
                name, package.version, name
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trailing `nix search` arguments; `--` keeps a term like `--help` from
/// being read as a flag
pub fn search_args(term: &str) -> [&str; 4] {
    ["--json", "nixpkgs", "--", term]
}

pub struct SearchPackages {
    settings: NixSettings,
}

impl SearchPackages {
    pub fn new(settings: NixSettings) -> Self {
        Self { settings }
    }

    async fn search(&self, term: &str) -> Result<BTreeMap<String, Package>> {
        let mut cmd = Command::new("nix");
        cmd.arg("search")
            .args(self.settings.nix_path_args())
            .args(search_args(term));

        let output = process::run(cmd, None, self.settings.timeout).await?;
        if !output.success() {
            anyhow::bail!("{}", output.stderr.trim());
        }
        serde_json::from_str(&output.stdout).context("Failed to parse nix search output")
    }
}

#[async_trait]
impl Handler for SearchPackages {
    async fn call(&self, cx: HandlerContext) -> Result<()> {
        let search = cx.vars.get_or_empty("search").trim();
        let packages = self.search(search).await?;
        let ranked = rank_packages(&packages, search);
        cx.reply.send_markdown(&format_packages(&ranked)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_term_follows_option_terminator() {
        assert_eq!(search_args("--help"), ["--json", "nixpkgs", "--", "--help"]);
    }

    #[test]
    fn test_attr_name() {
        assert_eq!(attr_name("legacyPackages.x86_64-linux.hello"), "hello");
        assert_eq!(
            attr_name("legacyPackages.aarch64-darwin.python3Packages.requests"),
            "python3Packages.requests"
        );
        assert_eq!(attr_name("hello"), "hello");
    }

    #[test]
    fn test_rank_puts_exact_match_first() {
        let packages: BTreeMap<String, Package> = serde_json::from_str(
            r#"{
                "legacyPackages.x86_64-linux.hello-wayland": {"pname": "hello-wayland", "version": "0.1", "description": ""},
                "legacyPackages.x86_64-linux.hello": {"pname": "hello", "version": "2.12.1", "description": "GNU Hello"}
            }"#,
        )
        .unwrap();

        let ranked = rank_packages(&packages, "hello");
        assert_eq!(ranked[0].0, "hello");
        assert_eq!(
            format_packages(&ranked[..1]),
            "- hello (2.12.1) - [NixOS Search](https://search.nixos.org/packages?channel=unstable&query=hello)"
        );
    }
}
