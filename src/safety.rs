//! Safety Gate: a pure, side-effect-free check consulted by every tool that
//! can run a shell command or touch the filesystem. It never blocks on I/O
//! and never calls out to an LLM — it is a fast regex match plus a path
//! canonicalization, so tools can call it inline before doing anything
//! irreversible.

use crate::config::SafetyConfig;
use crate::error::SafetyError;
use regex::{Regex, RegexSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Patterns for commands considered destructive enough to refuse outright.
/// Grouped by category purely for readability; `RegexSet` matches all of
/// them in a single pass. Built case-insensitively — SQL keywords in
/// particular are conventionally uppercase (`DROP TABLE`, `DELETE FROM`).
static DESTRUCTIVE_PATTERNS: LazyLock<regex::RegexSet> = LazyLock::new(|| {
    RegexSetBuilder::new([
        // file destruction
        r"rm\s+-[a-zA-Z]*f[a-zA-Z]*\b",
        r"rm\s+.*(/|~|\*)\s*$",
        r":(){ :\|:& };:",
        r"shred\s+",
        // git force operations
        r"git\s+push\s+.*(--force|-f\b)",
        r"git\s+reset\s+--hard",
        r"git\s+clean\s+-[a-zA-Z]*f[a-zA-Z]*d|git\s+clean\s+-[a-zA-Z]*d[a-zA-Z]*f",
        r"git\s+branch\s+-D\s",
        // database destruction
        r"drop\s+(database|table|schema)\s",
        r"truncate\s+table\s",
        r"delete\s+from\s+\w+\s*;?\s*$",
        // disk / system
        r"mkfs(\.\w+)?\s+/dev/",
        r"dd\s+.*of=/dev/(sd|nvme|hd)",
        r">\s*/dev/(sd|nvme|hd)",
        r"fdisk\s+/dev/",
        // privilege escalation
        r"sudo\s+(rm|chmod|chown|dd|mkfs)",
        r"chmod\s+-R\s+777\s+/",
        r"chown\s+-R\s+.*\s+/\s*$",
        // system control
        r"shutdown\s|reboot\s|halt\s|poweroff\s",
        r"systemctl\s+(stop|disable|mask)\s",
        r"kill\s+-9\s+1\b|kill\s+-9\s+-1\b",
        // remote code execution
        r"curl\s+.*\|\s*(sh|bash)",
        r"wget\s+.*\|\s*(sh|bash)",
        r"eval\s*\(\s*\$\(",
        // fork bomb (duplicate of the classic pattern above, kept distinct for clarity)
        r"fork\s*\(\s*\)\s*{.*fork\s*\(\s*\)",
        // misc
        r"crontab\s+-r",
        r"find\s+.*-delete",
        r"find\s+.*-exec\s+rm",
        r"xargs\s+rm",
        r"perl\s+-e|python\S*\s+-c",
    ])
    .case_insensitive(true)
    .build()
    .expect("destructive pattern set is valid regex")
});

/// Matches backtick or `$()` command substitution wrapping some inner text,
/// capturing the inner text so it can be unwrapped rather than just echoed
/// back — substitution doesn't launder a destructive command, it just hides
/// it from a naive anchored match (e.g. a pattern requiring the destructive
/// verb to trail the end of the string).
static SUBSTITUTION_WRAPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]*)`|\$\(([^)]*)\)").expect("valid regex"));

/// The Safety Gate. Cheap to construct and clone; holds no I/O handles.
pub struct SafetyGate {
    config: arc_swap::ArcSwap<SafetyConfig>,
}

impl SafetyGate {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config: arc_swap::ArcSwap::from_pointee(config),
        }
    }

    pub fn update_config(&self, config: SafetyConfig) {
        self.config.store(std::sync::Arc::new(config));
    }

    /// Returns `Err` if `command` matches a known destructive pattern, after
    /// unwrapping any command-substitution layer around it.
    pub fn is_destructive(&self, command: &str) -> Result<(), SafetyError> {
        let unwrapped = unwrap_substitution(command);
        if DESTRUCTIVE_PATTERNS.is_match(&unwrapped) || DESTRUCTIVE_PATTERNS.is_match(command) {
            return Err(SafetyError::Destructive {
                command: command.to_string(),
            });
        }
        Ok(())
    }

    /// Returns `Err` if `path`, once canonicalized, falls outside the
    /// configured allow-list. An empty allow-list means allow everything —
    /// this check is advisory, not a sandbox.
    pub fn is_path_allowed(&self, path: &Path) -> Result<(), SafetyError> {
        let allowed = self.config.load();
        if allowed.allowed_paths.is_empty() {
            return Ok(());
        }

        let resolved = resolve_path(path);
        let allowed_canonical: Vec<PathBuf> = allowed
            .allowed_paths
            .iter()
            .map(|p| resolve_path(p))
            .collect();

        if allowed_canonical.iter().any(|root| resolved.starts_with(root)) {
            Ok(())
        } else {
            Err(SafetyError::PathNotAllowed {
                path: path.display().to_string(),
            })
        }
    }

    pub fn kill_words(&self) -> Vec<String> {
        self.config.load().kill_words.clone()
    }

    /// True if `text` contains one of the configured kill phrases
    /// (case-insensitive substring match).
    pub fn contains_kill_word(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.config
            .load()
            .kill_words
            .iter()
            .any(|w| lowered.contains(&w.to_lowercase()))
    }
}

/// Strips backtick/`$()` substitution syntax, leaving the inner command
/// text in place of the wrapper (recursively, since substitutions can
/// nest). `"echo $(rm -rf /tmp/foo/)"` becomes `"echo rm -rf /tmp/foo/"`.
fn unwrap_substitution(command: &str) -> String {
    let mut current = command.to_string();
    loop {
        let next = SUBSTITUTION_WRAPPER
            .replace_all(&current, |caps: &regex::Captures| {
                caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string()).unwrap_or_default()
            })
            .to_string();
        if next == current {
            return next;
        }
        current = next;
    }
}

fn resolve_path(path: &Path) -> PathBuf {
    let expanded = if let Ok(stripped) = path.strip_prefix("~") {
        dirs::home_dir()
            .map(|home| home.join(stripped))
            .unwrap_or_else(|| path.to_path_buf())
    } else {
        path.to_path_buf()
    };
    std::fs::canonicalize(&expanded).unwrap_or(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SafetyGate {
        SafetyGate::new(SafetyConfig {
            kill_words: vec!["stop".into()],
            allowed_paths: vec![PathBuf::from("/tmp")],
        })
    }

    #[test]
    fn refuses_rm_rf_root() {
        assert!(gate().is_destructive("rm -rf /").is_err());
    }

    #[test]
    fn refuses_git_reset_hard() {
        assert!(gate().is_destructive("git reset --hard origin/main").is_err());
    }

    #[test]
    fn allows_benign_command() {
        assert!(gate().is_destructive("ls -la").is_ok());
    }

    #[test]
    fn catches_substitution_wrapped_destructive_command() {
        let wrapped = "echo start; $(rm -rf /tmp/foo/) ; echo done";
        assert!(gate().is_destructive(wrapped).is_err());
    }

    #[test]
    fn catches_backtick_wrapped_destructive_command() {
        let wrapped = "echo `rm -rf /tmp/foo`";
        assert!(gate().is_destructive(wrapped).is_err());
    }

    #[test]
    fn catches_uppercase_sql_destruction() {
        assert!(gate().is_destructive("DROP TABLE users").is_err());
        assert!(gate().is_destructive("DELETE FROM logs").is_err());
        assert!(gate().is_destructive("TRUNCATE TABLE t").is_err());
    }

    #[test]
    fn catches_bare_force_delete() {
        assert!(gate().is_destructive("rm -f file.txt").is_err());
    }

    #[test]
    fn catches_short_form_git_force_push() {
        assert!(gate().is_destructive("git push -f").is_err());
    }

    #[test]
    fn does_not_flag_hyphenated_branch_name_as_force_flag() {
        assert!(gate().is_destructive("git push origin my-feature").is_ok());
    }

    #[test]
    fn empty_allow_list_allows_everything() {
        let open_gate = SafetyGate::new(SafetyConfig::default());
        assert!(open_gate.is_path_allowed(Path::new("/etc/passwd")).is_ok());
    }

    #[test]
    fn kill_word_matches_case_insensitively() {
        assert!(gate().contains_kill_word("please STOP now"));
        assert!(!gate().contains_kill_word("keep going"));
    }
}
