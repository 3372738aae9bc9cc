use std::{
    path::{Path, PathBuf},
    process::Command,
};

use serde_json::Value;

fn searchlab_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_searchlab") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("searchlab");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}

fn manifest_dir() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
}

fn run(
    data_dir: &Path,
    args: &[&str],
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let output = Command::new(searchlab_bin()?)
        .env_remove("SEARCHLAB_DATA_DIR")
        .env_remove("SEARCHLAB_LOG")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("-q")
        .args(args)
        .output()?;

    assert!(
        output.status.success(),
        "searchlab failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(output.stdout)
}

fn run_json(
    data_dir: &Path,
    args: &[&str],
) -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::from_slice(&run(data_dir, args)?)?)
}

fn hit_counts(results: &Value) -> Vec<(String, u64)> {
    results
        .as_array()
        .unwrap()
        .iter()
        .map(|r| {
            (
                r["query"].as_str().unwrap().to_string(),
                r["hit_count"].as_u64().unwrap(),
            )
        })
        .collect()
}

#[test]
fn lines_demo_over_short_stories() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let docs = manifest_dir().join("short-stories");

    let results = run_json(
        tmp.path(),
        &["lines", "--json", "--docs", docs.to_str().unwrap()],
    )?;

    assert_eq!(
        hit_counts(&results),
        vec![
            ("'explorer'".to_string(), 2),
            ("'*fish'".to_string(), 3),
            ("'entity'".to_string(), 0),
            ("lines 2 and earlier".to_string(), 6),
        ]
    );
    Ok(())
}

#[test]
fn lines_skip_index_reuses_existing_index()
-> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let docs = manifest_dir().join("short-stories");

    let stdout = run(
        tmp.path(),
        &["lines", "--index-only", "--json", "--docs", docs.to_str().unwrap()],
    )?;
    assert!(stdout.is_empty());

    let results = run_json(
        tmp.path(),
        &["lines", "--skip-index", "--json", "compass"],
    )?;
    let hits = results[0]["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["file_name"], "the-explorer.txt");
    assert_eq!(hits[0]["line_number"], 2);
    Ok(())
}

#[test]
fn symbols_finds_items_in_own_sources()
-> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let src = manifest_dir().join("src");

    let output = Command::new(searchlab_bin()?)
        .arg("--data-dir")
        .arg(tmp.path())
        .arg("-q")
        .args(["symbols", "--json", "--kind", "struct", "--root"])
        .arg(&src)
        .arg("SearchIndex")
        .output()?;
    assert!(output.status.success());

    let results: Value = serde_json::from_slice(&output.stdout)?;
    let hits = results[0]["hits"].as_array().unwrap();
    assert!(hits.iter().any(|h| {
        h["item_name"] == "SearchIndex"
            && h["module_path"] == "searchlab::tantivy_index"
            && h["matched_on"] == "item_name"
    }));
    Ok(())
}
