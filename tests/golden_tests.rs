//! Golden file tests for nginx-steward
//!
//! These tests analyze fixture trees and compare the rendered report against snapshots.
//! Run `cargo insta review` to update snapshots after intentional changes.

use nginx_steward::report::render_analysis;
use nginx_steward::{analyze_remote, MemoryShell};
use std::path::PathBuf;

fn analyze_fixture(tree: &str) -> String {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/nginx")
        .join(tree);
    let mut shell = MemoryShell::load_tree(&root).expect("Failed to load fixture tree");
    let mirror = tempfile::tempdir().expect("Failed to create mirror dir");

    let result = analyze_remote(&mut shell, "/etc/nginx/nginx.conf", mirror.path())
        .expect("Failed to analyze fixture");
    render_analysis(&result)
}

#[test]
fn test_edge_analysis() {
    let rendered = analyze_fixture("edge");
    insta::assert_snapshot!("edge_analysis", rendered);
}
