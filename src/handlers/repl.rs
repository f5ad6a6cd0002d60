// ABOUTME: Nix REPL commands - bind, unbind and evaluate expressions with nix-instantiate
// ABOUTME: Bindings persist in the KvStore and are spliced into a `let` around each expression

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use nixbot_core::{Handler, HandlerContext, KvStore};
use tokio::process::Command;

use super::NixSettings;
use crate::process;

pub const DEFINE_PATTERN: &str = r"(?ms)^, ?(?P<key>[A-Za-z0-9_]+) ?=(?P<expr>[^=].*)";
pub const UNDEFINE_PATTERN: &str = r"(?ms)^, ?(?P<key>[A-Za-z0-9_]+) ?=$";
pub const EVAL_PATTERN: &str = r"(?ms)^,(?P<strict>:p)?(?P<expr>.+)";
pub const EVAL_FENCE_PATTERN: &str = r"(?ms)^.*(?P<strict>eval).*```nix(?P<expr>.*)```";
pub const EVAL_RAW_FENCE_PATTERN: &str =
    r"(?ms)^.*(?P<strict>eval)-?(?P<raw>raw).*```nix(?P<expr>.*)```";

/// Bindings every expression sees unless the user rebinds them
const OVERRIDABLE_BINDINGS: &[(&str, &str)] = &[(
    "_show",
    r#"x: if lib.isDerivation x then "<derivation ${x.drvPath}>" else x"#,
)];

/// Bindings that always win over user bindings
const FIXED_BINDINGS: &[(&str, &str)] = &[("pkgs", "import <nixpkgs> {}"), ("lib", "pkgs.lib")];

/// Names that are never bound
const FORBIDDEN_BINDINGS: &[&str] = &["builtins"];

/// Sandboxing options passed to every evaluation
const EVAL_OPTIONS: &[(&str, &str)] = &[
    ("cores", "0"),
    ("fsync-metadata", "false"),
    ("restrict-eval", "true"),
    ("sandbox", "true"),
    ("timeout", "3"),
    ("max-jobs", "0"),
    ("allow-import-from-derivation", "false"),
    ("allowed-uris", ""),
    ("show-trace", "false"),
];

/// Wrap `expr` in a `let` holding the default and user bindings.
///
/// User bindings override `_show`; `pkgs` and `lib` can't be overridden and
/// `builtins` is dropped.
pub fn generate_expr(user_bindings: &BTreeMap<String, String>, expr: &str) -> String {
    let mut bindings: BTreeMap<&str, &str> = OVERRIDABLE_BINDINGS.iter().copied().collect();
    bindings.extend(user_bindings.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    bindings.extend(FIXED_BINDINGS.iter().copied());
    for name in FORBIDDEN_BINDINGS {
        bindings.remove(name);
    }

    let mut out = String::from("let\n");
    for (name, value) in &bindings {
        out.push_str(&format!("  {} = {};\n", name, value));
    }
    out.push_str(&format!("in _show ( {} )\n", expr));
    out
}

/// `, name = expr`
pub struct DefineBinding {
    store: Arc<KvStore>,
}

impl DefineBinding {
    pub fn new(store: Arc<KvStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler for DefineBinding {
    async fn call(&self, cx: HandlerContext) -> Result<()> {
        let key = cx.vars.get_or_empty("key").trim();
        let expr = cx.vars.get_or_empty("expr").trim();

        if key.is_empty() || expr.is_empty() {
            return cx.reply.send_text("key or expr cannot be empty").await;
        }

        self.store.set(key, expr).await?;
        tracing::info!(key = %key, sender = %cx.sender(), "Defined REPL binding");
        cx.reply.send_text(&format!("Defined {}", key)).await
    }
}

/// `, name =`
pub struct UndefineBinding {
    store: Arc<KvStore>,
}

impl UndefineBinding {
    pub fn new(store: Arc<KvStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler for UndefineBinding {
    async fn call(&self, cx: HandlerContext) -> Result<()> {
        let key = cx.vars.get_or_empty("key").trim();

        if key.is_empty() {
            return cx.reply.send_text("key cannot be empty").await;
        }

        let existed = self.store.delete(key).await?;
        tracing::info!(key = %key, existed, sender = %cx.sender(), "Removed REPL binding");
        cx.reply.send_text(&format!("Undefined {}", key)).await
    }
}

/// What an evaluation produced, ready to be sent
#[derive(Debug, PartialEq, Eq)]
pub enum EvalReply {
    /// Single-line result, sent as-is
    Text(String),
    /// Multi-line result or error, sent as markdown
    Markdown(String),
}

/// Evaluates expressions with `nix-instantiate --eval`
pub struct Evaluate {
    store: Arc<KvStore>,
    settings: NixSettings,
}

impl Evaluate {
    pub fn new(store: Arc<KvStore>, settings: NixSettings) -> Self {
        Self { store, settings }
    }

    pub async fn evaluate(&self, expr: &str, strict: bool, raw: bool) -> Result<EvalReply> {
        let final_expr = if raw {
            expr.to_string()
        } else {
            generate_expr(&self.store.load_all().await, expr)
        };

        let mut cmd = Command::new("nix-instantiate");
        cmd.args(self.settings.nix_path_args());
        for &(name, value) in EVAL_OPTIONS {
            cmd.args(["--option", name, value]);
        }
        if strict {
            cmd.arg("--strict");
        }
        cmd.args(["--eval", "--expr", final_expr.as_str()]);

        let output = process::run(cmd, None, self.settings.timeout).await?;
        if !output.success() {
            return Ok(EvalReply::Markdown(format!(
                "Error\n```\n{}\n```",
                output.stderr.trim_end()
            )));
        }

        let result = output.stdout.trim();
        let formatted = match self.format_nix(result).await {
            Ok(formatted) => formatted,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to format nix output, sending raw result");
                result.to_string()
            }
        };

        Ok(shape_result(formatted))
    }

    async fn format_nix(&self, input: &str) -> Result<String> {
        let output = process::run(Command::new("nixfmt"), Some(input), self.settings.timeout).await?;
        if !output.success() {
            anyhow::bail!("nixfmt failed: {}", output.stderr.trim());
        }
        Ok(output.stdout.trim().to_string())
    }
}

/// Multi-line results go out as a nix code fence, single lines as text
pub fn shape_result(result: String) -> EvalReply {
    if result.contains('\n') {
        EvalReply::Markdown(format!("```nix\n{}\n```", result))
    } else {
        EvalReply::Text(result)
    }
}

#[async_trait]
impl Handler for Evaluate {
    async fn call(&self, cx: HandlerContext) -> Result<()> {
        let expr = cx.vars.get_or_empty("expr");
        if expr.trim().is_empty() {
            return cx.reply.send_text("expr cannot be empty").await;
        }

        let strict = cx.vars.is_set("strict");
        let raw = cx.vars.is_set("raw");

        match self.evaluate(expr, strict, raw).await? {
            EvalReply::Text(text) => cx.reply.send_text(&text).await,
            EvalReply::Markdown(markdown) => cx.reply.send_markdown(&markdown).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_expr_defaults() {
        let expr = generate_expr(&BTreeMap::new(), "1 + 1");
        assert_eq!(
            expr,
            "let\n  \
             _show = x: if lib.isDerivation x then \"<derivation ${x.drvPath}>\" else x;\n  \
             lib = pkgs.lib;\n  \
             pkgs = import <nixpkgs> {};\n\
             in _show ( 1 + 1 )\n"
        );
    }

    #[test]
    fn test_user_bindings_cannot_override_pkgs_or_builtins() {
        let user: BTreeMap<String, String> = [
            ("pkgs", "42"),
            ("builtins", "{}"),
            ("_show", "x: x"),
            ("answer", "42"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let expr = generate_expr(&user, "answer");
        assert!(expr.contains("  pkgs = import <nixpkgs> {};\n"));
        assert!(expr.contains("  _show = x: x;\n"));
        assert!(expr.contains("  answer = 42;\n"));
        assert!(!expr.contains("builtins"));
    }

    #[test]
    fn test_shape_result() {
        assert_eq!(shape_result("2".to_string()), EvalReply::Text("2".to_string()));
        assert_eq!(
            shape_result("{\n  a = 1;\n}".to_string()),
            EvalReply::Markdown("```nix\n{\n  a = 1;\n}\n```".to_string())
        );
    }

    #[test]
    fn test_patterns_compile() {
        for pattern in [
            DEFINE_PATTERN,
            UNDEFINE_PATTERN,
            EVAL_PATTERN,
            EVAL_FENCE_PATTERN,
            EVAL_RAW_FENCE_PATTERN,
        ] {
            regex::Regex::new(pattern).unwrap();
        }
    }
}
