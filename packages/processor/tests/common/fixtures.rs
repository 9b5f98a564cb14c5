//! Test fixtures: fake graph generator executables and job helpers.

#![allow(dead_code)]

use std::path::PathBuf;

use processor_core::domains::graph_searches::{GraphSearch, GraphSearchManager};
use serde_json::json;
use tempfile::TempDir;

/// Parses `--search` / `--json_path` and answers `--version`.
const SCRIPT_PRELUDE: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "9.9.9-test"
  exit 0
fi
while [ $# -gt 0 ]; do
  case "$1" in
    --search) SEARCH="$2"; shift 2 ;;
    --json_path) OUT="$2"; shift 2 ;;
    *) shift ;;
  esac
done
"#;

/// Writes a two node, one edge graph and exits 0.
pub const SUCCESS_BODY: &str = r#"
printf '{"nodes":[{"id":"a"},{"id":"b"}],"edges":[{"source":"a","target":"b"}],"metadata":{"search":"%s"}}' "$SEARCH" > "$OUT"
"#;

/// Prints to stderr and exits 1.
pub const FAILURE_BODY: &str = r#"
echo "rate limited" >&2
exit 1
"#;

/// Exits 0 without writing valid JSON.
pub const GARBAGE_BODY: &str = r#"
echo "not json" > "$OUT"
"#;

/// Writes a partial graph, waits, then writes the final graph.
pub const WATCHED_BODY: &str = r#"
printf '{"nodes":[{"id":"a"}],"edges":[],"metadata":{}}' > "$OUT.tmp" && mv "$OUT.tmp" "$OUT"
sleep 0.3
printf '{"nodes":[{"id":"a"},{"id":"b"}],"edges":[{"source":"a","target":"b"}],"metadata":{}}' > "$OUT.tmp" && mv "$OUT.tmp" "$OUT"
"#;

/// Writes a partial graph, then fails.
pub const WATCHED_FAILURE_BODY: &str = r#"
printf '{"nodes":[{"id":"a"}],"edges":[],"metadata":{}}' > "$OUT.tmp" && mv "$OUT.tmp" "$OUT"
sleep 0.2
echo "crashed" >&2
exit 3
"#;

/// A fake generator executable living in its own temp dir.
pub struct FakeGenerator {
    _dir: TempDir,
    pub path: PathBuf,
}

#[cfg(unix)]
pub fn fake_generator(body: &str) -> FakeGenerator {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fake-graph-generator");
    std::fs::write(&path, format!("{SCRIPT_PRELUDE}{body}")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");

    FakeGenerator { _dir: dir, path }
}

/// Queue a search through the manager, the way the HTTP facade does.
pub async fn enqueue(manager: &GraphSearchManager, raw_name: &str) -> GraphSearch {
    manager
        .create_or_get(raw_name, &json!({}), &[])
        .await
        .expect("enqueue graph search")
        .0
}
