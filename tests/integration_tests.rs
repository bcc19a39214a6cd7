//! Integration tests for the powder CLI

use std::process::Command;

fn powder() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_powder"));
    // Keep user configuration out of the tests
    command.env("XDG_CONFIG_HOME", std::env::temp_dir());
    command
}

const STOWE: &str = r#"{
    "name": "Stowe", "state": "VT", "lat": 44.5258, "lon": -72.7858,
    "vertical_drop": 2160, "base_elevation": 1559, "summit_elevation": 3719,
    "green_pct": 16, "blue_pct": 55, "black_pct": 21, "double_black_pct": 8,
    "pass_types": "epic", "lift_types": "gondola,highspeed,fixed",
    "avg_weekday_price": 189, "avg_weekend_price": 219
}"#;

/// Test that the CLI lists its subcommands
#[test]
fn test_cli_help() {
    let output = powder().arg("--help").output().expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("powder"));
    for command in ["ask", "eval", "fetch-historic", "interesting-days", "seed", "validate-mountain"] {
        assert!(stdout.contains(command), "missing {command} in help:\n{stdout}");
    }
}

/// Test that ask documents its replay and trace flags
#[test]
fn test_ask_help() {
    let output = powder()
        .args(["ask", "--help"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--date"));
    assert!(stdout.contains("--mode"));
    assert!(stdout.contains("--save-trace"));
}

#[test]
fn test_validate_mountain_valid() {
    let output = powder()
        .args(["validate-mountain", STOWE])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {stdout}");
    assert_eq!(stdout.trim(), "Valid");
}

#[test]
fn test_validate_mountain_lists_errors() {
    let output = powder()
        .args(["validate-mountain", r#"{"name": "Nowhere", "state": "Vermont", "lat": 95}"#])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Validation errors:"));
    assert!(stdout.contains("  - Missing required field: lon"));
    assert!(stdout.contains("state must be a two-letter code"));
    assert!(stdout.contains("lat must be between"));
}

#[test]
fn test_validate_mountain_rejects_bad_json() {
    let output = powder()
        .args(["validate-mountain", "{not json"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Invalid JSON"));
}

/// Without a key, ask fails before touching any network service
#[test]
fn test_ask_requires_api_key() {
    let output = powder()
        .args(["ask", "Where should I ski?"])
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("POWDER_LLM__API_KEY")
        .current_dir(std::env::temp_dir())
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Error: ANTHROPIC_API_KEY environment variable not set"));
}
