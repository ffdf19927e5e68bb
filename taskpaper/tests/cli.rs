use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const SAMPLE: &str = "Errands:\n\t- shop\n\t\t- milk @done(2024-01-02)\n\t\t- eggs\n\t- bank @today\nWork:\n\t- mail\n";

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskpaper"))
        .args(args)
        .output()
        .expect("run taskpaper")
}

fn write_sample(dir: &Path) -> String {
    let path = dir.join("list.taskpaper");
    fs::write(&path, SAMPLE).expect("write sample");
    path.to_str().expect("utf-8 path").to_string()
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).expect("utf-8 stdout")
}

#[test]
fn format_prints_the_file_unchanged() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_sample(tmp.path());

    let out = run(&["format", &path]);
    assert_eq!(stdout(&out), SAMPLE);
}

#[test]
fn filter_by_tag_keeps_owners() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_sample(tmp.path());

    let out = run(&["filter", &path, "--tag", "done"]);
    assert_eq!(
        stdout(&out),
        "Errands:\n\t- shop\n\t\t- milk @done(2024-01-02)\n"
    );

    let out = run(&["filter", &path, "--tag", "done", "--no-ancestors", "--no-tabs"]);
    assert_eq!(stdout(&out), "- milk @done(2024-01-02)\n");
}

#[test]
fn filter_by_kind() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_sample(tmp.path());

    let out = run(&["filter", &path, "--kind", "project"]);
    assert_eq!(stdout(&out), "Errands:\nWork:\n");
}

#[test]
fn filter_without_criteria_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_sample(tmp.path());

    let out = run(&["filter", &path]);
    assert!(!out.status.success());
}

#[test]
fn done_tags_the_requested_line_in_place() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_sample(tmp.path());

    let out = run(&["done", &path, "--line", "7", "--date", "2024-03-09", "--in-place"]);
    stdout(&out);

    let updated = fs::read_to_string(&path).expect("read back");
    assert_eq!(
        updated,
        SAMPLE.replace("\t- mail\n", "\t- mail @done(2024-03-09)\n")
    );
}

#[test]
fn done_rejects_missing_line() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_sample(tmp.path());

    let out = run(&["done", &path, "--line", "42"]);
    assert!(!out.status.success());
}

#[test]
fn parse_emits_nested_json() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_sample(tmp.path());

    let out = run(&["parse", &path, "--json"]);
    let json: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("json");
    let items = &json[0]["items"];
    assert_eq!(items[0]["text"], "Errands:");
    assert_eq!(items[0]["kind"], "project");
    assert_eq!(items[0]["children"][0]["children"][0]["tags"]["done"], "2024-01-02");
    assert_eq!(items[1]["text"], "Work:");
}
