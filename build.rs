//! Generates `archiver_env_allowlist.rs`: every `ARCHIVER_*` variable name
//! mentioned anywhere under `src/`. The `config` command treats any other
//! `ARCHIVER_*` variable in the environment as a typo.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const PREFIX: &str = "ARCHIVER_";

fn rust_sources(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut sources = Vec::new();
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                sources.push(path);
            }
        }
    }
    sources.sort();
    Ok(sources)
}

/// Tokens made of `[A-Z0-9_]` that start with the prefix and name something
/// after it. Trailing underscores are dropped so `ARCHIVER_LOG_` reads as
/// `ARCHIVER_LOG`.
fn env_keys(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
        .map(|token| token.trim_end_matches('_'))
        .filter(|key| key.starts_with(PREFIX))
}

fn render(keys: &BTreeSet<String>) -> String {
    let mut out = String::from("pub const GENERATED_ARCHIVER_ENV_ALLOWLIST: &[&str] = &[\n");
    for key in keys {
        out.push_str(&format!("    {key:?},\n"));
    }
    out.push_str("];\n");
    out
}

fn main() -> std::io::Result<()> {
    let mut keys = BTreeSet::new();
    for path in rust_sources(Path::new("src"))? {
        let source = fs::read_to_string(&path)?;
        keys.extend(env_keys(&source).map(str::to_string));
    }

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| std::io::Error::other("OUT_DIR not set"))?;
    fs::write(out_dir.join("archiver_env_allowlist.rs"), render(&keys))?;

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
    Ok(())
}
