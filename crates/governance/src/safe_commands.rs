//! Static known-safe command classification.
//!
//! Commands recognized here skip external risk assessment entirely. The
//! classifier is a pure function over the shell token list: no I/O, no
//! state, no configuration.

use regex::Regex;
use std::sync::LazyLock;

/// Read-only inspection commands. Matched as prefixes of the rendered,
/// lower-cased command string, so `cat` also covers `catapult`.
///
/// Entries must not be able to write files through their own flags, and
/// two-letter names that prefix common unrelated binaries stay out.
pub const SAFE_COMMAND_PREFIXES: &[&str] = &[
    // ──── Filesystem inspection ────
    "ls",
    "cat",
    "head",
    "tail",
    "less",
    "more",
    "file",
    "stat",
    "wc",
    "df",
    "pwd",
    "realpath",
    "basename",
    "dirname",
    "readlink",
    // ──── Search ────
    "grep",
    "egrep",
    "fgrep",
    "rg",
    "find",
    "locate",
    // ──── Text processing (stdout only) ────
    "cut",
    "diff",
    "cmp",
    "jq",
    "echo",
    "printf",
    // ──── Process and environment ────
    "ps",
    "top -b",
    "env",
    "printenv",
    "whoami",
    "groups",
    "uname",
    "uptime",
    "which",
    "whereis",
    // ──── Read-only git ────
    "git log",
    "git diff",
    "git show",
    "git branch",
    "git blame",
    "git rev-parse",
    "git ls-files",
    "git remote -v",
    // ──── Toolchain versions ────
    "node --version",
    "npm --version",
    "python --version",
    "python3 --version",
    "cargo --version",
    "rustc --version",
    "go version",
];

static SYMBOLIC_MODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ugoa]*[-+=][rwxstugo]+$").expect("valid symbolic mode regex"));

static OCTAL_MODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-7]{3,4}$").expect("valid octal mode regex"));

/// Whether a shell token list is known to be safe without assessment.
///
/// Matching is case-insensitive and a single leading `sudo` is ignored.
/// The original tokens are untouched; this only decides.
pub fn is_known_safe_command(tokens: &[String]) -> bool {
    let mut lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
    if lowered.first().map(String::as_str) == Some("sudo") {
        lowered.remove(0);
    }

    let Some(program) = lowered.first().map(String::as_str) else {
        return false;
    };
    let args = &lowered[1..];

    let rendered = shell_words::join(&lowered);
    if SAFE_COMMAND_PREFIXES
        .iter()
        .any(|prefix| rendered.starts_with(prefix))
    {
        return true;
    }

    match program {
        "git" => args.iter().any(|a| a == "status"),
        "sed" => !has_in_place_flag(args),
        "chmod" => is_well_formed_chmod(args),
        _ => is_relative_python_script(program),
    }
}

/// `./script.py`, the shape of ad hoc test scripts.
fn is_relative_python_script(program: &str) -> bool {
    program.starts_with("./") && program.ends_with(".py")
}

/// `-i`, `-i.bak`, clustered short flags containing `i`, or `--in-place`.
fn has_in_place_flag(args: &[String]) -> bool {
    args.iter().any(|arg| {
        if arg == "--in-place" || arg.starts_with("--in-place=") {
            return true;
        }
        match arg.strip_prefix('-') {
            // `-i.bak` carries a backup suffix after the flag
            Some(flags) if !flags.starts_with('-') => flags.contains('i'),
            _ => false,
        }
    })
}

/// At least one valid mode token and at least one path token.
fn is_well_formed_chmod(args: &[String]) -> bool {
    let has_mode = args.iter().any(|arg| is_chmod_mode(arg));
    let has_path = args
        .iter()
        .any(|arg| !arg.starts_with('-') && !is_chmod_mode(arg));
    has_mode && has_path
}

fn is_chmod_mode(token: &str) -> bool {
    SYMBOLIC_MODE.is_match(token) || OCTAL_MODE.is_match(token)
}
