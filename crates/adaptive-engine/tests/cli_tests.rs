//! CLI integration tests using assert_cmd.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const ITEMS: &str = r#"{"id": "q-easy", "course_id": "cardio", "type": "qcs", "difficulty": "easy", "baseline": 1.0, "estimated_time": 30, "knowledge_components": ["kc-valves"]}
{"id": "q-medium", "course_id": "cardio", "type": "qcm", "difficulty": "medium", "estimated_time": 60}

{"id": "q-hard", "course_id": "cardio", "type": "qroc", "difficulty": "hard"}
"#;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config.toml");
        let db = dir.path().join("adaptive.db");
        std::fs::write(
            &config,
            format!(
                "[storage]\ndatabase_path = {:?}\n\n[policy]\nepsilon = 0.0\n",
                db.to_string_lossy()
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn cmd(&self) -> Command {
        #[allow(deprecated)]
        let mut cmd = Command::cargo_bin("adaptctl").unwrap();
        cmd.env_remove("RUST_LOG")
            .arg("--config")
            .arg(&self.config);
        cmd
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn with_items(self) -> Self {
        let items = self.write("items.jsonl", ITEMS);
        self.cmd()
            .args(["import", "items"])
            .arg(&items)
            .assert()
            .success()
            .stdout(predicate::str::contains("Imported 3 of 3 items"));
        self
    }
}

#[test]
fn help_lists_commands() {
    #[allow(deprecated)]
    Command::cargo_bin("adaptctl")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("record"))
        .stdout(predicate::str::contains("calibrate"))
        .stdout(predicate::str::contains("evaluate"));
}

#[test]
fn config_path_honours_flag() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn config_validate_rejects_bad_values() {
    let ws = Workspace::new();
    let bad = ws.write("bad.toml", "[bkt]\nslipping_probability = 2.0\n");
    ws.cmd()
        .args(["config", "validate", "--file"])
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("slipping_probability"));

    ws.cmd()
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn config_show_json_reflects_file() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "show", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"epsilon\": 0.0"));
}

#[test]
fn status_on_fresh_database() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Attempts:        0"));
}

#[test]
fn import_reports_malformed_line() {
    let ws = Workspace::new();
    let file = ws.write(
        "items.jsonl",
        "{\"id\": \"q1\", \"course_id\": \"c\", \"type\": \"qcs\", \"difficulty\": \"easy\"}\nnot json\n",
    );
    ws.cmd()
        .args(["import", "items"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn import_attempts_checks_items_and_courses() {
    let ws = Workspace::new().with_items();
    let line = |item: &str, course: &str, spent: f64| {
        format!(
            "{{\"user_id\": \"u\", \"item_id\": \"{item}\", \"course_id\": \"{course}\", \
             \"timestamp\": \"2025-01-01T00:00:00Z\", \"success_ratio\": 0.5, \"time_spent\": {spent}}}\n"
        )
    };

    for (name, contents, message) in [
        ("ghost.jsonl", line("ghost", "cardio", 10.0), "item not found"),
        ("course.jsonl", line("q-easy", "neuro", 10.0), "course_id"),
        ("time.jsonl", line("q-easy", "cardio", -3.0), "time_spent"),
    ] {
        let file = ws.write(name, &contents);
        ws.cmd()
            .args(["import", "attempts"])
            .arg(&file)
            .assert()
            .failure()
            .stderr(predicate::str::contains(message));
    }

    let good = ws.write("good.jsonl", &line("q-easy", "cardio", 10.0));
    ws.cmd()
        .args(["import", "attempts"])
        .arg(&good)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 1 of 1 attempts"));
    ws.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Attempts:        1"));
}

#[test]
fn record_updates_learner_in_session() {
    let ws = Workspace::new().with_items();

    ws.cmd()
        .args(["record", "alice", "q-easy", "--session", "s1", "-r", "1.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded attempt"))
        .stdout(predicate::str::contains("kc-valves"));

    ws.cmd()
        .args(["learner", "show", "alice", "--course", "cardio", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"course_id\": \"cardio\""));

    ws.cmd()
        .args(["learner", "components", "alice", "--course", "cardio"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kc-valves"));
}

#[test]
fn record_outside_session_leaves_learner_alone() {
    let ws = Workspace::new().with_items();

    ws.cmd()
        .args(["record", "bob", "q-easy", "-r", "0.9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Learner unchanged"));

    ws.cmd()
        .args(["learner", "show", "bob"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("learner not found"));
}

#[test]
fn record_duplicate_is_reported() {
    let ws = Workspace::new().with_items();
    let args = [
        "record",
        "alice",
        "q-easy",
        "-s",
        "s1",
        "-r",
        "0.5",
        "--at",
        "2025-03-01T09:00:00Z",
    ];

    ws.cmd().args(args).assert().success();
    ws.cmd()
        .args(args)
        .assert()
        .success()
        .stdout(predicate::str::contains("Duplicate attempt"));
}

#[test]
fn record_rejects_invalid_ratio_and_unknown_item() {
    let ws = Workspace::new().with_items();

    ws.cmd()
        .args(["record", "alice", "q-easy", "-r", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("success_ratio"));

    ws.cmd()
        .args(["record", "alice", "ghost", "-r", "0.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("item not found"));
}

#[test]
fn params_show_falls_back_to_heuristics() {
    let ws = Workspace::new().with_items();
    ws.cmd()
        .args(["params", "show", "q-hard"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Source:"))
        .stdout(predicate::str::contains("Difficulty:     1.0000"));
}

#[test]
fn seed_calibrate_and_evaluate() {
    let ws = Workspace::new().with_items();

    for user in ["u1", "u2"] {
        ws.cmd()
            .args(["seed", user, "cardio", "-n", "10", "--seed", "42"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Seeded 30 attempts"));
    }

    ws.cmd()
        .args(["calibrate", "--min-attempts", "5", "--label", "v-test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Calibrated 3 items as version v-test"));

    ws.cmd()
        .args(["params", "show", "q-easy", "--all", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\": \"v-test\""));

    let out = ws.path().join("metrics.json");
    let csv = ws.path().join("SCORECARD.csv");
    ws.cmd()
        .arg("evaluate")
        .arg("--out")
        .arg(&out)
        .arg("--csv")
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("Baseline-MA"))
        .stdout(predicate::str::contains("IRT-online"));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    // 30 attempts per user split 21 / 4 / 5.
    assert_eq!(written["splits"]["n_train"], 42);
    assert_eq!(written["splits"]["n_test"], 10);
    assert_eq!(written["models"].as_array().unwrap().len(), 4);

    let scorecard = std::fs::read_to_string(&csv).unwrap();
    assert!(scorecard.starts_with("Model,Log-loss,Brier,AUC,ECE,N\n"));
    assert!(scorecard.contains("BKT-corrected,"));
    assert_eq!(scorecard.lines().count(), 5);
}

#[test]
fn session_and_next_for_new_learner() {
    let ws = Workspace::new().with_items();

    ws.cmd()
        .args([
            "session",
            "carol",
            "cardio",
            "--field",
            "qcm,number-of-questions",
            "--format",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"qcm\""))
        .stdout(predicate::str::contains("\"number_of_questions\""))
        .stdout(predicate::str::contains("time_limit").not());

    // Ability 0 falls in the easy band and exploration is disabled.
    ws.cmd()
        .args(["next", "carol", "cardio", "--seed", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("q-easy"));
}
