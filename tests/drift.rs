//! Drift detection after upstream bumps and patch edits.

mod common;

use common::{TWO_TIER, TestProject, apply_ok, build_scenario_a};
use forkstack::drift::DriftStatus;

fn statuses(tp: &TestProject) -> Vec<DriftStatus> {
    let reports = tp.open().drift(None, None).unwrap();
    assert_eq!(reports.len(), 1);
    reports[0].entries.iter().map(|e| e.status.clone()).collect()
}

#[test]
fn revision_bump_marks_every_tree_stale() {
    let tp = TestProject::two_tier();
    build_scenario_a(&tp);
    assert_eq!(statuses(&tp), vec![DriftStatus::Fresh, DriftStatus::Fresh]);

    tp.upstream_file("paper", "r2", "src/file.txt", "A\nB\nC\nD\n");
    tp.write(
        "forkstack.toml",
        &TWO_TIER
            .replace("{apply}", "")
            .replace("revision = \"r1\"", "revision = \"r2\""),
    );
    assert_eq!(statuses(&tp), vec![DriftStatus::Stale, DriftStatus::Stale]);

    let project = tp.open();
    let err = project.drift(Some("paper"), None).unwrap()[0]
        .ensure_fresh()
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("'r1'") && message.contains("'r2'"), "{message}");

    apply_ok(&project);
    assert_eq!(tp.read("work/two/src/file.txt").as_deref(), Some("A\nX\nY\nD\n"));
    assert_eq!(statuses(&tp), vec![DriftStatus::Fresh, DriftStatus::Fresh]);
}

#[test]
fn revision_read_from_properties_file() {
    let tp = TestProject::new(
        &TWO_TIER
            .replace("{apply}", "")
            .replace(
                "revision = \"r1\"",
                "revision = { property = \"paperRef\" }",
            ),
    );
    tp.write("gradle.properties", "group=example\npaperRef=r1\n");
    tp.upstream_file("paper", "r1", "src/file.txt", "A\n");
    tp.upstream_file("paper", "r2", "src/file.txt", "A\n");
    apply_ok(&tp.open());
    assert_eq!(statuses(&tp), vec![DriftStatus::Fresh, DriftStatus::Fresh]);

    tp.write("gradle.properties", "group=example\npaperRef=r2\n");
    assert_eq!(statuses(&tp), vec![DriftStatus::Stale, DriftStatus::Stale]);
}

#[test]
fn editing_a_parent_patch_marks_only_that_node() {
    let tp = TestProject::two_tier();
    build_scenario_a(&tp);
    let patch = tp.read("patches/one/file.txt.patch").unwrap();
    tp.write("patches/one/file.txt.patch", &patch.replace("Subject: [PATCH]", "Subject: [PATCH] "));
    assert_eq!(
        statuses(&tp),
        vec![DriftStatus::PatchesChanged, DriftStatus::Fresh]
    );
}

#[test]
fn unknown_upstream_filter_is_a_config_error() {
    let tp = TestProject::two_tier();
    tp.upstream_file("paper", "r1", "src/file.txt", "A\n");
    let err = tp.open().drift(Some("purpur"), None).unwrap_err();
    assert_eq!(err.kind(), "config");
}
