use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde_json::Value;

struct Desk {
    _temp: tempfile::TempDir,
    repo: PathBuf,
    home: PathBuf,
}

impl Desk {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = temp.path().join("repo");
        let home = temp.path().join("home");
        fs::create_dir_all(&repo).expect("repo dir");
        fs::create_dir_all(&home).expect("home dir");
        Self {
            _temp: temp,
            repo,
            home,
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.repo.join(".crewdesk/data")
    }

    fn write_roles(&self, roles: &str) {
        fs::create_dir_all(self.data_dir()).expect("data dir");
        fs::write(self.data_dir().join("roles.json"), roles).expect("roles");
    }
}

fn run_cli(desk: &Desk, user: &str, args: &[&str], stdin: Option<&str>) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_crewdesk"));
    cmd.current_dir(&desk.repo)
        .args(args)
        .env("HOME", &desk.home)
        .env("LOGNAME", user)
        .env("USER", user)
        .env_remove("LNAME")
        .env_remove("USERNAME")
        .env_remove("CREWDESK_LOG");
    if stdin.is_none() {
        return cmd.output().expect("command runs");
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().expect("command spawns");
    {
        let mut pipe = child.stdin.take().expect("stdin pipe");
        pipe.write_all(stdin.expect("stdin content").as_bytes())
            .expect("stdin write");
    }
    child.wait_with_output().expect("command output")
}

fn run_json(desk: &Desk, user: &str, args: &[&str], stdin: Option<&str>) -> Value {
    let output = run_cli(desk, user, args, stdin);
    assert!(
        output.status.success(),
        "command failed: args={args:?}\nstdout={}\nstderr={}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

fn run_err(desk: &Desk, user: &str, args: &[&str]) -> Value {
    let output = run_cli(desk, user, args, None);
    assert!(
        !output.status.success(),
        "command unexpectedly succeeded: args={args:?}\nstdout={}",
        String::from_utf8_lossy(&output.stdout)
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr
        .lines()
        .rev()
        .find(|line| line.starts_with("{\"error\""))
        .unwrap_or_else(|| panic!("no error payload in stderr: {stderr}"));
    serde_json::from_str::<Value>(line).expect("json error")["error"].clone()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).expect("read document")).expect("parse document")
}

#[test]
fn init_creates_layout_and_default_config() {
    let desk = Desk::new();
    let init = run_json(&desk, "michael", &["init"], None);
    assert_eq!(init["status"], "ok");
    assert_eq!(init["roles_seeded"], true);

    for name in ["parts.json", "ideas.json", "points.json", "roles.json"] {
        assert!(desk.data_dir().join(name).is_file(), "{name} missing");
    }
    assert!(desk.repo.join(".crewdesk/exports").is_dir());
    let config = fs::read_to_string(desk.repo.join(".crewdesk/config.yml")).expect("config");
    assert!(config.contains("alert_threshold: 90"));

    let whoami = run_json(&desk, "Michael", &["whoami"], None);
    assert_eq!(whoami["identity"], "michael");
    assert_eq!(whoami["role"], "submitter");
    assert_eq!(whoami["points"], 0);

    let submitted = run_json(
        &desk,
        "michael",
        &["ideas", "submit", "--text", "Fresh desk idea", "--tag", "UX"],
        None,
    );
    assert_eq!(submitted["status"], "submitted");
    let reviewed = run_json(&desk, "alice", &["ideas", "review", "1", "--accurate"], None);
    assert_eq!(reviewed["points"], 5);
}

#[test]
fn init_keeps_an_existing_role_table() {
    let desk = Desk::new();
    desk.write_roles(r#"{"carol": "admin"}"#);

    let init = run_json(&desk, "carol", &["init"], None);
    assert_eq!(init["roles_seeded"], false);
    let roles = read_json(&desk.data_dir().join("roles.json"));
    assert_eq!(roles, serde_json::json!({"carol": "admin"}));

    let err = run_err(&desk, "michael", &["ideas", "submit", "--text", "x", "--tag", "UX"]);
    assert_eq!(err["code"], "access_denied");
}

#[test]
fn import_show_edit_and_navigate_parts() {
    let desk = Desk::new();
    run_json(&desk, "michael", &["init"], None);

    let import = run_json(
        &desk,
        "michael",
        &["parts", "import"],
        Some("x1\tx0\tcracked\nnot a record\nX0\t\n"),
    );
    assert_eq!(import["added"], 2);
    assert_eq!(import["message"], "Import complete! Added 2 new parts.");

    let show = run_json(&desk, "michael", &["parts", "show", " x1 "], None);
    assert_eq!(show["status"], "found");
    assert_eq!(show["part"]["parent"], "X0");
    assert_eq!(show["part"]["issues"], "cracked");
    assert_eq!(show["parent_link"]["status"], "found");

    let parent = run_json(&desk, "michael", &["parts", "parent"], None);
    assert_eq!(parent["status"], "ok");
    assert_eq!(parent["selected_part"], "X0");

    let selected = run_json(&desk, "michael", &["parts", "show"], None);
    assert_eq!(selected["part"]["part_number"], "X0");
    assert_eq!(selected["children"], serde_json::json!(["X1"]));

    let edited = run_json(
        &desk,
        "michael",
        &["parts", "edit", "X1", "--usage", "line 3\nstation 2"],
        None,
    );
    assert_eq!(edited["status"], "updated");
    assert_eq!(edited["part"]["parent"], "X0");
    assert_eq!(edited["part"]["usage"], "line 3\nstation 2");

    let stored = read_json(&desk.data_dir().join("parts.json"));
    assert_eq!(stored["X1"]["usage"], "line 3\nstation 2");
    assert_eq!(stored["X1"]["issues"], "cracked");

    let missing = run_json(&desk, "michael", &["parts", "show", "nope"], None);
    assert_eq!(missing["status"], "not_found");
    assert_eq!(missing["part_number"], "NOPE");

    let added = run_json(&desk, "michael", &["parts", "add", "nope"], None);
    assert_eq!(added["status"], "added");
    let again = run_json(&desk, "michael", &["parts", "add", "NOPE"], None);
    assert_eq!(again["status"], "exists");
}

#[test]
fn dangling_parent_is_reported_as_not_found() {
    let desk = Desk::new();
    run_json(&desk, "michael", &["parts", "import"], Some("Y1\tGHOST\n"));
    run_json(&desk, "michael", &["parts", "select", "y1"], None);

    let parent = run_json(&desk, "michael", &["parts", "parent"], None);
    assert_eq!(parent["status"], "not_found");
    assert_eq!(parent["parent_link"]["part_number"], "GHOST");

    let err = run_err(&desk, "michael", &["parts", "parent"]);
    assert_eq!(err["code"], "part_not_found");

    let cleared = run_json(&desk, "michael", &["parts", "select", "--clear"], None);
    assert_eq!(cleared["selected_part"], Value::Null);
    let err = run_err(&desk, "michael", &["parts", "show"]);
    assert_eq!(err["code"], "no_selection");
}

#[test]
fn edit_without_fields_toggles_edit_mode() {
    let desk = Desk::new();
    run_json(&desk, "michael", &["parts", "import"], Some("A1\t\nB2\tA1\n"));

    let on = run_json(&desk, "michael", &["parts", "edit", "b2"], None);
    assert_eq!(on["edit_mode"], true);
    assert_eq!(on["parent_options"], serde_json::json!(["", "A1", "B2"]));

    let off = run_json(&desk, "michael", &["parts", "edit"], None);
    assert_eq!(off["edit_mode"], false);
}

#[test]
fn stale_revision_rejects_parts_write() {
    let desk = Desk::new();
    run_json(&desk, "michael", &["init"], None);
    let listed = run_json(&desk, "michael", &["parts", "list"], None);
    let revision = listed["revision"].as_str().expect("revision").to_string();

    let first = run_json(
        &desk,
        "michael",
        &["parts", "add", "Z1", "--if-revision", &revision],
        None,
    );
    assert_eq!(first["status"], "added");

    let err = run_err(&desk, "michael", &["parts", "add", "Z2", "--if-revision", &revision]);
    assert_eq!(err["code"], "stale_revision");

    let stored = read_json(&desk.data_dir().join("parts.json"));
    assert!(stored.get("Z1").is_some());
    assert!(stored.get("Z2").is_none());
}

#[test]
fn idea_review_workflow_is_role_gated() {
    let desk = Desk::new();
    desk.write_roles(
        r#"{"michael": "submitter", "alice": "reviewer", "bob": "trainer", "root": "admin", "eve": "auditor"}"#,
    );

    let submitted = run_json(
        &desk,
        "michael",
        &["ideas", "submit", "--text", "Label the bins", "--tag", "ux"],
        None,
    );
    assert_eq!(submitted["idea"]["id"], 1);
    assert_eq!(submitted["idea"]["tag"], "UX");
    assert_eq!(submitted["idea"]["link"], Value::Null);
    assert_eq!(submitted["idea"]["submitter"], "michael");

    let err = run_err(
        &desk,
        "alice",
        &["ideas", "submit", "--text", "x", "--tag", "UX"],
    );
    assert_eq!(err["code"], "access_denied");
    let err = run_err(&desk, "mallory", &["ideas", "review", "1", "--accurate"]);
    assert_eq!(err["code"], "access_denied");
    assert!(err["message"].as_str().expect("message").contains("Access denied"));
    let err = run_err(&desk, "eve", &["ideas", "review", "1", "--accurate"]);
    assert_eq!(err["code"], "unknown_role");

    let reviewed = run_json(&desk, "alice", &["ideas", "review", "1", "--not-accurate"], None);
    assert_eq!(reviewed["points"], 5);
    assert_eq!(reviewed["idea"]["reviews"][0]["accurate"], false);

    let err = run_err(&desk, "alice", &["ideas", "review", "1", "--accurate"]);
    assert_eq!(err["code"], "already_reviewed");

    run_json(&desk, "root", &["ideas", "review", "1", "--accurate"], None);
    let board = run_json(&desk, "michael", &["ideas", "leaderboard"], None);
    assert_eq!(board["leaderboard"][0]["identity"], "alice");
    assert_eq!(board["leaderboard"][0]["points"], 5);
    assert_eq!(board["leaderboard"][1]["identity"], "root");

    let trained = run_json(&desk, "bob", &["ideas", "train", "1"], None);
    assert_eq!(trained["idea"]["trained"], true);
    assert_eq!(trained["idea"]["trained_by"], "bob");
    assert_eq!(trained["idea"]["tally"]["total"], 2);
    assert_eq!(trained["idea"]["tally"]["accurate"], 1);

    let pending = run_json(&desk, "bob", &["ideas", "pending"], None);
    assert_eq!(pending["count"], 0);

    let points = read_json(&desk.data_dir().join("points.json"));
    assert_eq!(points["alice"], 5);
    assert_eq!(points["root"], 5);
}

#[test]
fn blank_submission_leaves_book_untouched() {
    let desk = Desk::new();
    desk.write_roles(r#"{"michael": "submitter"}"#);

    let err = run_err(
        &desk,
        "michael",
        &["ideas", "submit", "--text", "   ", "--tag", "UX"],
    );
    assert_eq!(err["code"], "blank_text");
    assert_eq!(err["message"], "Please enter an idea text.");

    let listed = run_json(&desk, "michael", &["ideas", "list"], None);
    assert_eq!(listed["total"], 0);
}

#[test]
fn ideas_list_filters_by_search_term() {
    let desk = Desk::new();
    desk.write_roles(r#"{"michael": "submitter"}"#);
    run_json(
        &desk,
        "michael",
        &["ideas", "submit", "--text", "Torque audit", "--tag", "backend"],
        None,
    );
    run_json(
        &desk,
        "michael",
        &["ideas", "submit", "--text", "Bin labels", "--tag", "Floor"],
        None,
    );

    let hits = run_json(&desk, "michael", &["ideas", "list", "--search", "TORQUE"], None);
    assert_eq!(hits["count"], 1);
    assert_eq!(hits["ideas"][0]["id"], 1);

    let by_tag = run_json(&desk, "michael", &["ideas", "list", "--search", "floor"], None);
    assert_eq!(by_tag["ideas"][0]["id"], 2);
}

#[test]
fn exports_write_escaped_html() {
    let desk = Desk::new();
    run_json(&desk, "michael", &["init"], None);

    let err = run_err(&desk, "michael", &["parts", "export"]);
    assert_eq!(err["code"], "no_parts");
    assert_eq!(err["message"], "No parts data to export!");

    run_json(
        &desk,
        "michael",
        &["parts", "import"],
        Some("P1\t\tWidget & <b>bold</b>\n"),
    );
    let export = run_json(&desk, "michael", &["parts", "export"], None);
    let path = PathBuf::from(export["path"].as_str().expect("path"));
    let file_name = path.file_name().and_then(|name| name.to_str()).expect("name");
    assert!(file_name.starts_with("parts_information_"));
    assert!(file_name.ends_with(".html"));

    let html = fs::read_to_string(&path).expect("export file");
    assert!(html.contains("Widget &amp; &lt;b&gt;bold&lt;/b&gt;"));
    assert!(!html.contains("<b>bold"));

    let output = run_cli(&desk, "michael", &["ideas", "export", "--stdout"], None);
    assert!(output.status.success());
    let streamed = String::from_utf8_lossy(&output.stdout);
    assert!(streamed.starts_with("<!DOCTYPE html>"));
    assert!(streamed.contains("Total Ideas: 0"));
}

#[test]
fn corrupt_document_reads_as_empty_and_warns() {
    let desk = Desk::new();
    fs::create_dir_all(desk.data_dir()).expect("data dir");
    fs::write(desk.data_dir().join("parts.json"), "{ not json").expect("corrupt");

    let output = run_cli(&desk, "michael", &["parts", "list"], None);
    assert!(output.status.success());
    let listed: Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    assert_eq!(listed["count"], 0);
    assert!(String::from_utf8_lossy(&output.stderr).contains("corrupt document"));

    let raw = fs::read_to_string(desk.data_dir().join("parts.json")).expect("still there");
    assert_eq!(raw, "{ not json");
}

#[test]
fn budget_summary_uses_configured_budgets() {
    let desk = Desk::new();
    fs::create_dir_all(desk.data_dir()).expect("data dir");
    fs::write(
        desk.data_dir().join("sample.json"),
        r#"[
  {"Part Name": "Bearing", "Group Name": "Parts", "Date": "2026-01-05", "Amount": 1000.0},
  {"Part Name": "Fixture", "Group Name": "GroupA", "Date": "2026-01-06", "Amount": 60000.0},
  {"Part Name": "Gasket", "Group Name": "GroupA", "Date": "2025-12-30", "Amount": 5.0}
]"#,
    )
    .expect("sample");
    fs::write(desk.repo.join(".crewdesk.project.yml"), "budgets:\n  parts: 2000\n")
        .expect("project config");

    let report = run_json(
        &desk,
        "michael",
        &["budget", "summary", "--today", "2026-01-20"],
        None,
    );
    assert_eq!(report["window"]["start"], "2026-01-01");
    assert_eq!(report["summary"]["total_spent"], 61000.0);
    assert_eq!(report["summary"]["groups_over_budget"], 1);
    assert_eq!(report["alert_threshold"], 90.0);
    assert_eq!(report["alerts"][0]["group"], "GroupA");
    assert_eq!(report["alerts"][0]["level"], "critical");
    assert_eq!(report["comparison"][1]["budget"], 2000.0);
    assert_eq!(report["high_value"]["parts"][0]["part_name"], "Fixture");

    let previous = run_json(
        &desk,
        "michael",
        &["budget", "summary", "--today", "2026-01-20", "--period", "previous"],
        None,
    );
    assert_eq!(previous["summary"]["total_spent"], 5.0);
}
