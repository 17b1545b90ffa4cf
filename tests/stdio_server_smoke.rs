use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

#[test]
fn stdio_server_smoke() {
    let bin = env!("CARGO_BIN_EXE_hermes");

    let project = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        project.path().join("lib.rs"),
        "pub fn greet(name: &str) -> String {\n    format!(\"hello {name}\")\n}\n",
    )
    .unwrap();

    let mut child = Command::new(bin)
        .arg("--root")
        .arg(project.path())
        .arg("--project")
        .arg("smoke-test")
        .arg("serve")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn hermes serve");

    {
        let stdin = child.stdin.as_mut().expect("child stdin");
        writeln!(stdin, "{}", serde_json::json!({"tool": "index", "args": {}})).unwrap();
        writeln!(
            stdin,
            "{}",
            serde_json::json!({"tool": "search", "args": {"query": "greet", "topK": 5}})
        )
        .unwrap();
        writeln!(
            stdin,
            "{}",
            serde_json::json!({"tool": "fact", "args": {"type": "decision", "content": "use sqlite"}})
        )
        .unwrap();
        writeln!(stdin, "{}", serde_json::json!({"tool": "bogus", "args": {}})).unwrap();
    }
    drop(child.stdin.take());

    let stdout = child.stdout.take().expect("child stdout");
    let reader = BufReader::new(stdout);
    let lines: Vec<String> = reader.lines().map(|l| l.unwrap()).collect();

    child.wait().expect("wait for child");

    assert_eq!(lines.len(), 4, "expected one response line per request: {lines:?}");

    let index_response: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert!(index_response.get("error").is_none(), "{index_response:?}");
    assert_eq!(index_response["result"]["indexed"], 1);

    let search_response: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
    assert!(search_response.get("error").is_none(), "{search_response:?}");
    let pointers = search_response["result"]["pointers"].as_array().unwrap();
    assert!(!pointers.is_empty());
    assert!(pointers.iter().any(|p| p["chunk"] == "greet"));

    let fact_response: serde_json::Value = serde_json::from_str(&lines[2]).unwrap();
    assert_eq!(fact_response["result"]["status"], "recorded");

    let bogus_response: serde_json::Value = serde_json::from_str(&lines[3]).unwrap();
    assert!(bogus_response.get("error").is_some());
}
