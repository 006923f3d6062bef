use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const BASE_CONFIG: &str = r#"
[bucket]
name = "my-native-s3-table-bucket"

[database]
name = "s3tables_db"

[role]
name = "glue5-s3tables-role"

[job]
name = "glue5-iceberg-s3tables-job"
"#;

fn write_config(dir: &TempDir, content: &str) -> Result<PathBuf> {
    let path = dir.path().join("glueform.toml");
    std::fs::write(&path, content)?;
    Ok(path)
}

fn glueform(config: &Path, args: &[&str]) -> Output {
    glueform_logging(config, args, "error")
}

fn glueform_logging(config: &Path, args: &[&str], rust_log: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_glueform"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", rust_log)
        .env_remove("GLUEFORM_CONFIG")
        .env_remove("GLUEFORM_CONFIG_CONTENT")
        .env_remove("GLUEFORM_LOG_LEVEL")
        .output()
        .expect("Failed to run binary")
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_glueform"))
        .arg("--help")
        .output()
        .expect("Failed to run binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["plan", "apply", "submit-job", "status", "upload-script", "etl-preview"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
    assert!(stdout.contains("--config"));
    assert!(stdout.contains("--log-level"));
}

#[test]
fn test_cli_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_glueform"))
        .arg("--version")
        .output()
        .expect("Failed to run binary");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("glueform"));
}

#[test]
fn test_offline_plan_orders_resources() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(&dir, BASE_CONFIG)?;

    let output = glueform(&config, &["plan", "--offline"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let position = |needle: &str| {
        stdout
            .find(needle)
            .unwrap_or_else(|| panic!("{needle} not in plan:\n{stdout}"))
    };
    let bucket = position("bucket:my-native-s3-table-bucket");
    let database = position("database:s3tables_db");
    let role = position("role:glue5-s3tables-role");
    let managed = position("policy:AWSGlueServiceRole");
    let inline = position("policy:glue-custom-access");
    let job = position("job:glue5-iceberg-s3tables-job");

    assert!(bucket < role && database < role);
    assert!(role < managed && role < inline);
    assert!(managed < job && inline < job);
    assert!(stdout.contains("Plan: 6 to create, 0 to update, 0 unchanged."));
    Ok(())
}

#[test]
fn test_offline_plan_json() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(&dir, BASE_CONFIG)?;

    let output = glueform(&config, &["plan", "--offline", "--output", "json"]);
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let actions = plan["actions"].as_array().expect("actions array");
    assert_eq!(actions.len(), 6);
    assert!(actions.iter().all(|a| a["kind"] == "create"));
    assert_eq!(actions[5]["resource"], "job:glue5-iceberg-s3tables-job");
    Ok(())
}

#[test]
fn test_invalid_config_exits_with_validation_code() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(&dir, "[bucket]\nname = \"Bad_Bucket\"\n")?;

    let output = glueform(&config, &["plan", "--offline"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E001"));
    assert!(stderr.contains("bucket.name"));
    Ok(())
}

#[test]
fn test_missing_config_file_exits_with_validation_code() {
    let output = glueform(Path::new("/nonexistent/glueform.toml"), &["plan"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_undefined_dependency_is_validation_error() -> Result<()> {
    let dir = TempDir::new()?;
    let content = format!("{BASE_CONFIG}depends_on = [\"role:does-not-exist\"]\n");
    let config = write_config(&dir, &content)?;

    let output = glueform(&config, &["plan", "--offline"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("role:does-not-exist"));
    Ok(())
}

#[test]
fn test_dependency_cycle_exits_before_planning() -> Result<()> {
    let dir = TempDir::new()?;
    let content = BASE_CONFIG.replace(
        "name = \"my-native-s3-table-bucket\"",
        "name = \"my-native-s3-table-bucket\"\ndepends_on = [\"job:glue5-iceberg-s3tables-job\"]",
    );
    let config = write_config(&dir, &content)?;

    let output = glueform(&config, &["plan", "--offline"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Dependency cycle"));
    Ok(())
}

#[test]
fn test_etl_preview_prints_evolved_table() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(&dir, BASE_CONFIG)?;

    let output = glueform(&config, &["etl-preview"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("email"));
    assert!(stdout.contains("Alice"));
    assert!(stdout.contains("Bob"));
    assert!(!stdout.contains("Charlie"));
    Ok(())
}

#[test]
fn test_status_wait_requires_flag_for_timeout() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(&dir, BASE_CONFIG)?;

    // --timeout-secs is only meaningful with --wait
    let output = glueform(&config, &["status", "jr_123", "--timeout-secs", "5"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--wait"));
    Ok(())
}

#[test]
fn test_config_warnings_reach_stderr() -> Result<()> {
    let dir = TempDir::new()?;
    let content = format!("{BASE_CONFIG}worker_count = 1\n");
    let config = write_config(&dir, &content)?;

    let output = glueform_logging(&config, &["plan", "--offline"], "warn");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stderr).contains("at least 2 workers"));
    Ok(())
}

#[test]
fn test_rust_log_overrides_config_level() -> Result<()> {
    let dir = TempDir::new()?;
    let content = format!("[log]\nlevel = \"debug\"\n{BASE_CONFIG}worker_count = 1\n");
    let config = write_config(&dir, &content)?;

    let output = glueform_logging(&config, &["plan", "--offline"], "error");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("DEBUG"), "{stderr}");
    assert!(!stderr.contains("INFO"), "{stderr}");
    Ok(())
}

#[test]
fn test_log_level_flag_overrides_rust_log() -> Result<()> {
    let dir = TempDir::new()?;
    let content = format!("{BASE_CONFIG}worker_count = 1\n");
    let config = write_config(&dir, &content)?;

    let output = glueform_logging(&config, &["plan", "--offline", "--log-level", "warn"], "error");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("at least 2 workers"));
    Ok(())
}
