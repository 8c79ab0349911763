//! Hygiene: enforces coding standards at test time.
//!
//! Scans the engine, codec and CLI sources for patterns that crash the
//! process or swallow errors. Each pattern has a budget; budgets only ever go
//! down.

use std::fs;
use std::path::Path;

const CRATE_ROOTS: [&str; 3] = ["src", "frames/src", "cli/src"];

struct SourceFile {
    path: String,
    content: String,
}

/// Production `.rs` files of every crate in the workspace, test files excluded.
fn source_files() -> Vec<SourceFile> {
    let mut files = Vec::new();
    for root in CRATE_ROOTS {
        collect_rs_files(Path::new(root), &mut files);
    }
    assert!(!files.is_empty(), "no sources found; run from the workspace root");
    files
}

fn collect_rs_files(dir: &Path, out: &mut Vec<SourceFile>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|name| name == "target" || name == "tests") {
                continue;
            }
            collect_rs_files(&path, out);
        } else if path.extension().is_some_and(|e| e == "rs") {
            let path_str = path.to_string_lossy().to_string();
            if path_str.ends_with("_test.rs") {
                continue;
            }
            if let Ok(content) = fs::read_to_string(&path) {
                out.push(SourceFile { path: path_str, content });
            }
        }
    }
}

/// Fail when more than `max` lines across the workspace contain `pattern`.
fn assert_budget(pattern: &str, max: usize) {
    let hits: Vec<(String, usize)> = source_files()
        .into_iter()
        .filter_map(|file| {
            let count = file.content.lines().filter(|line| line.contains(pattern)).count();
            (count > 0).then_some((file.path, count))
        })
        .collect();
    let total: usize = hits.iter().map(|(_, count)| count).sum();
    let listing = hits
        .iter()
        .map(|(path, count)| format!("  {path}: {count}"))
        .collect::<Vec<_>>()
        .join("\n");
    assert!(total <= max, "`{pattern}` budget exceeded: found {total}, max {max}.\n{listing}");
}

// Panics: these crash the process.

#[test]
fn unwrap_budget() {
    assert_budget(".unwrap()", 0);
}

#[test]
fn expect_budget() {
    assert_budget(".expect(", 0);
}

#[test]
fn panic_budget() {
    assert_budget("panic!(", 0);
}

#[test]
fn unreachable_budget() {
    assert_budget("unreachable!(", 0);
}

#[test]
fn todo_budget() {
    assert_budget("todo!(", 0);
}

#[test]
fn unimplemented_budget() {
    assert_budget("unimplemented!(", 0);
}

// Silent loss: discards errors without inspecting them.

#[test]
fn silent_discard_budget() {
    assert_budget("let _ =", 0);
}

#[test]
fn dot_ok_budget() {
    assert_budget(".ok()", 0);
}

// Style.

#[test]
fn allow_dead_code_budget() {
    assert_budget("#[allow(dead_code)]", 0);
}

#[test]
fn dbg_budget() {
    assert_budget("dbg!(", 0);
}
