use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn minecollect_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("minecollect");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("fox.txt"),
        "The quick brown fox jumps over the lazy dog.",
    )
    .unwrap();
    fs::write(
        files_dir.join("garden.md"),
        "# Garden\n\nTomatoes need six hours of sun.",
    )
    .unwrap();
    fs::write(files_dir.join("legacy.doc"), [0xd0u8, 0xcf, 0x11, 0xe0]).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/minecollect.sqlite"

[embedding]
dims = 64

[connectors.filesystem]
root = "{}/files"
include_globs = ["**/*.txt", "**/*.md", "**/*.doc"]
"#,
        root.display(),
        root.display()
    );
    let config_path = root.join("minecollect.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run(config_path: &Path, args: &[&str]) -> (serde_json::Value, String, bool) {
    let binary = minecollect_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "minecollect=debug")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run minecollect at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let json = serde_json::from_str(&stdout).unwrap_or(serde_json::Value::Null);
    (json, stderr, output.status.success())
}

#[test]
fn init_ingest_ask_delete() {
    let (tmp, config_path) = setup_test_env();

    let (out, stderr, ok) = run(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert_eq!(out["status"], "initialized");
    assert!(tmp.path().join("data/minecollect.sqlite").exists());

    let files = tmp.path().join("files");
    let (out, stderr, ok) = run(&config_path, &["ingest", files.to_str().unwrap()]);
    assert!(ok, "ingest failed: {}", stderr);
    assert_eq!(out["ingested"].as_array().unwrap().len(), 2);
    assert_eq!(out["rejected"][0]["error"]["kind"], "unsupported_format");

    let (out, stderr, ok) = run(&config_path, &["ask", "What animal jumps?"]);
    assert!(ok, "ask failed: {}", stderr);
    assert_eq!(out["answers"][0]["text"], "fox");
    assert!(stderr.contains("rebuilt indexes"));

    let (out, _, ok) = run(
        &config_path,
        &["search", "tomatoes", "--semantic-weight", "0"],
    );
    assert!(ok);
    let hits = out.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    let garden = hits[0]["document_id"].as_str().unwrap().to_string();

    let (out, _, ok) = run(&config_path, &["delete", &garden]);
    assert!(ok);
    assert_eq!(out["removed_chunks"].as_array().unwrap().len(), 1);

    let (out, _, ok) = run(
        &config_path,
        &["search", "tomatoes", "--semantic-weight", "0"],
    );
    assert!(ok);
    assert!(out.as_array().unwrap().is_empty());
}

#[test]
fn blank_question_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, ok) = run(&config_path, &["ask", "   "]);
    assert!(!ok);
    assert!(stderr.contains("invalid query"), "stderr: {}", stderr);
}
