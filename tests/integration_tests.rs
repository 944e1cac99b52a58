//! End-to-end tests: the real `Ufw` source against `tests/mock_ufw.sh`
//!
//! Each test gets its own temp directory holding a symlink named `ufw` to the
//! mock, the mock's state, and the annotation files.

use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;
use ufwm::core::metadata::MetadataStore;
use ufwm::core::rule::FirewallStatus;
use ufwm::core::source::{Mutation, RuleSource};
use ufwm::core::ufw::Ufw;
use ufwm::{Action, Direction, Error, Protocol, Reconciler, RuleSpec};

static NO_ELEVATION: Once = Once::new();

struct Harness {
    dir: TempDir,
    reconciler: Reconciler<Ufw>,
}

impl Harness {
    fn new() -> Self {
        NO_ELEVATION.call_once(|| {
            // SAFETY: set once before any ufw process is spawned
            unsafe {
                std::env::set_var("UFWM_TEST_NO_ELEVATION", "1");
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let mock = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/mock_ufw.sh");
        let program = dir.path().join("ufw");
        std::os::unix::fs::symlink(&mock, &program).unwrap();

        let reconciler = Reconciler::new(
            Ufw::new(program.to_string_lossy()),
            MetadataStore::new(dir.path().join("meta")),
        );
        Self { dir, reconciler }
    }

    /// Makes the mock fail every `verb` invocation with `message`.
    fn fail(&self, verb: &str, message: &str) {
        std::fs::create_dir_all(self.dir.path().join("state")).unwrap();
        std::fs::write(
            self.dir.path().join("state/fail"),
            format!("{verb} {message}\n"),
        )
        .unwrap();
    }

    /// Writes `active` or `inactive` to the mock's status file.
    fn set_status(&self, status: &str) {
        std::fs::create_dir_all(self.dir.path().join("state")).unwrap();
        std::fs::write(self.dir.path().join("state/status"), format!("{status}\n")).unwrap();
    }

    fn services_file(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("meta/services.txt")).unwrap_or_default()
    }
}

fn spec(action: Action, direction: Direction, protocol: Protocol, port: &str, endpoint: &str) -> RuleSpec {
    RuleSpec {
        action,
        direction,
        protocol,
        port: port.to_string(),
        endpoint: endpoint.to_string(),
    }
}

fn tcp_in(port: &str) -> RuleSpec {
    spec(Action::Allow, Direction::In, Protocol::Tcp, port, "any")
}

#[tokio::test]
async fn test_listing_round_trips_rule_specs() {
    let h = Harness::new();
    let specs = vec![
        tcp_in("22"),
        spec(Action::Deny, Direction::Out, Protocol::Udp, "53", "10.0.0.0/8"),
        spec(Action::Limit, Direction::In, Protocol::Tcp, "8000:8100", "192.168.1.0/24"),
    ];
    for s in &specs {
        h.reconciler.source().apply(&Mutation::Add(s.clone())).await.unwrap();
    }

    let listing = h.reconciler.source().list().await.unwrap();
    assert_eq!(listing.status, FirewallStatus::Active);
    assert_eq!(listing.reported, 3);
    let parsed: Vec<RuleSpec> = listing.rules.iter().map(|r| r.spec.clone()).collect();
    assert_eq!(parsed, specs);
}

#[tokio::test]
async fn test_annotations_follow_rules_through_delete() {
    let h = Harness::new();
    for (port, service) in [("22", "ssh"), ("80", "http"), ("443", "https")] {
        let applied = h.reconciler.add_rule(&tcp_in(port), service, "").await.unwrap();
        assert!(applied.warning.is_none());
    }

    let applied = h.reconciler.delete_rule(1).await.unwrap();
    let services: Vec<&str> = applied
        .snapshot
        .rules
        .iter()
        .map(|r| r.service.as_str())
        .collect();
    assert_eq!(services, vec!["http", "https"]);
    assert_eq!(h.services_file(), "1:http\n2:https\n");
}

#[tokio::test]
async fn test_edit_reinserts_at_same_position() {
    let h = Harness::new();
    h.reconciler.add_rule(&tcp_in("22"), "ssh", "").await.unwrap();
    h.reconciler.add_rule(&tcp_in("80"), "http", "").await.unwrap();
    h.reconciler.add_rule(&tcp_in("443"), "https", "").await.unwrap();

    let applied = h
        .reconciler
        .edit_rule(1, &tcp_in("2222"), "ssh-alt", "moved")
        .await
        .unwrap();
    let rules = &applied.snapshot.rules;
    assert_eq!(rules[0].rule.spec.port, "2222");
    assert_eq!(rules[0].service, "ssh-alt");
    assert_eq!(rules[0].note, "moved");
    assert_eq!(rules[1].service, "http");
    assert_eq!(rules[2].service, "https");
}

#[tokio::test]
async fn test_duplicate_add_warns_and_leaves_metadata() {
    let h = Harness::new();
    h.reconciler.add_rule(&tcp_in("22"), "ssh", "").await.unwrap();
    let applied = h.reconciler.add_rule(&tcp_in("22"), "other", "").await.unwrap();

    assert!(applied.warning.is_some());
    assert_eq!(applied.snapshot.rules.len(), 1);
    assert_eq!(applied.snapshot.rules[0].service, "ssh");
}

#[tokio::test]
async fn test_panic_reset_clears_everything() {
    let h = Harness::new();
    h.reconciler.add_rule(&tcp_in("22"), "ssh", "admin").await.unwrap();

    let applied = h.reconciler.panic_reset().await.unwrap();
    assert_eq!(applied.snapshot.status, FirewallStatus::Inactive);
    assert!(applied.snapshot.rules.is_empty());
    assert!(h.reconciler.annotations().await.unwrap().is_empty());
    assert_eq!(h.services_file(), "");
}

#[tokio::test]
async fn test_failed_delete_keeps_annotations() {
    let h = Harness::new();
    h.reconciler.add_rule(&tcp_in("22"), "ssh", "").await.unwrap();
    h.reconciler.add_rule(&tcp_in("80"), "http", "").await.unwrap();
    h.fail("delete", "ERROR: Could not delete non-existent rule");

    let err = h.reconciler.delete_rule(1).await.unwrap_err();
    match err {
        Error::Tool { exit_code, message } => {
            assert_eq!(exit_code, Some(1));
            assert!(message.contains("non-existent rule"));
        }
        other => panic!("expected tool error, got {other:?}"),
    }
    assert_eq!(h.services_file(), "1:ssh\n2:http\n");
}

#[tokio::test]
async fn test_root_requirement_is_permission_error() {
    let h = Harness::new();
    h.fail("status", "ERROR: You need to be root to run this script");
    let err = h.reconciler.refresh().await.unwrap_err();
    assert!(matches!(err, Error::Permission(_)), "got {err:?}");
}

#[tokio::test]
async fn test_missing_binary_is_tool_unavailable() {
    let h = Harness::new();
    let reconciler = Reconciler::new(
        Ufw::new(h.dir.path().join("no-such-ufw").to_string_lossy()),
        MetadataStore::new(h.dir.path().join("meta")),
    );
    let err = reconciler.refresh().await.unwrap_err();
    assert!(matches!(err, Error::ToolUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn test_external_delete_prunes_trailing_annotation() {
    let h = Harness::new();
    h.reconciler.add_rule(&tcp_in("22"), "ssh", "").await.unwrap();
    h.reconciler.add_rule(&tcp_in("80"), "http", "").await.unwrap();

    // Someone ran `ufw delete 2` outside ufwm
    h.reconciler.source().apply(&Mutation::Delete(2)).await.unwrap();

    let snapshot = h.reconciler.refresh().await.unwrap();
    assert_eq!(snapshot.rules.len(), 1);
    assert_eq!(h.services_file(), "1:ssh\n");
}

#[tokio::test]
async fn test_reload_picks_up_external_annotation_edits() {
    let h = Harness::new();
    h.reconciler.add_rule(&tcp_in("22"), "ssh", "").await.unwrap();
    std::fs::write(h.dir.path().join("meta/notes.txt"), "1:edited by hand\n").unwrap();

    let applied = h.reconciler.reload().await.unwrap();
    assert_eq!(applied.snapshot.rules[0].note, "edited by hand");
    assert_eq!(applied.snapshot.rules[0].service, "ssh");
}

#[tokio::test]
async fn test_disabled_firewall_keeps_annotations() {
    let h = Harness::new();
    h.reconciler.add_rule(&tcp_in("22"), "ssh", "").await.unwrap();
    h.reconciler.add_rule(&tcp_in("80"), "http", "").await.unwrap();

    h.set_status("inactive");
    let snapshot = h.reconciler.refresh().await.unwrap();
    assert_eq!(snapshot.status, FirewallStatus::Inactive);
    assert!(snapshot.rules.is_empty());
    assert_eq!(h.services_file(), "1:ssh\n2:http\n");

    h.set_status("active");
    let snapshot = h.reconciler.refresh().await.unwrap();
    let services: Vec<(u32, &str)> = snapshot
        .rules
        .iter()
        .map(|r| (r.rule.position, r.service.as_str()))
        .collect();
    assert_eq!(services, vec![(1, "ssh"), (2, "http")]);
}

#[tokio::test]
async fn test_edit_into_existing_rule_removes_it() {
    let h = Harness::new();
    for (port, service) in [("22", "ssh"), ("80", "http"), ("443", "https")] {
        h.reconciler.add_rule(&tcp_in(port), service, "").await.unwrap();
    }

    let applied = h
        .reconciler
        .edit_rule(1, &tcp_in("443"), "dup", "")
        .await
        .unwrap();
    assert!(applied.warning.is_some());
    let rules: Vec<(&str, &str)> = applied
        .snapshot
        .rules
        .iter()
        .map(|r| (r.rule.spec.port.as_str(), r.service.as_str()))
        .collect();
    assert_eq!(rules, vec![("80", "http"), ("443", "https")]);
    assert_eq!(h.services_file(), "1:http\n2:https\n");
}
