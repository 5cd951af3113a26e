use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use fleetquote_cli::commands::{apply_promotion, config, price, submit, summary, validate};
use serde_json::Value;
use tempfile::TempDir;

const CATALOG: &str = r#"
[[products]]
id = "inst-std"
name = "Standard installation"
unit_price = 100
category = "installation_fee"

[[products]]
id = "plan-basic"
name = "Basic tracking"
unit_price = 20
category = "monthly_plan"

[[products]]
id = "acc-camera"
name = "Dash camera"
unit_price = 50
category = "accessory"

[[promotions]]
id = "PROMO-FLEET"
name = "Fleet launch"
description = "10% off installation from 5 vehicles."

[[promotions.rules]]
product_id = "inst-std"
minimum_unit_count = 5
discount = { kind = "percentage", percent = 10 }
"#;

const READY_DRAFT: &str = r#"{
  "reference_code": "Q-1001",
  "client": { "first_name": "Ana", "phone": "+1 555 0100" },
  "unit_count": 3,
  "issued_on": "2026-01-10",
  "installation_assignee_id": "tech-7",
  "installation": { "product_id": "inst-std", "payment_method_id": "transfer" },
  "plan": { "product_id": "plan-basic", "payment_method_id": "debit" }
}"#;

struct Fixture {
    _dir: TempDir,
    config_path: PathBuf,
    draft_path: PathBuf,
}

fn fixture(draft: &str, extra_config: &str) -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let catalog_path = dir.path().join("catalog.toml");
    fs::write(&catalog_path, CATALOG).expect("write catalog");

    let config_path = dir.path().join("fleetquote.toml");
    let config = format!(
        "[catalog]\npath = \"{}\"\n\n[summary]\ndefault_validity_days = 30\n{extra_config}",
        catalog_path.display()
    );
    fs::write(&config_path, config).expect("write config");

    let draft_path = dir.path().join("draft.json");
    fs::write(&draft_path, draft).expect("write draft");

    Fixture { _dir: dir, config_path, draft_path }
}

impl Fixture {
    fn config(&self) -> Option<&Path> {
        Some(self.config_path.as_path())
    }
}

#[test]
fn price_returns_totals_for_a_draft() {
    with_env(&[], || {
        let fixture = fixture(READY_DRAFT, "");
        let result = price::run(fixture.config(), &fixture.draft_path);
        assert_eq!(result.exit_code, 0, "expected successful pricing: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "price");
        assert_eq!(payload["status"], "ok");
        let pricing = &payload["data"]["pricing"];
        assert_eq!(decimal(&pricing["one_time_investment"]), 300.0);
        assert_eq!(decimal(&pricing["recurring_monthly_cost"]), 60.0);
        assert_eq!(decimal(&pricing["first_period_total"]), 360.0);
    });
}

#[test]
fn price_reports_unreadable_drafts_as_input_errors() {
    with_env(&[], || {
        let fixture = fixture("{ not json", "");
        let result = price::run(fixture.config(), &fixture.draft_path);
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "draft_input");
    });
}

#[test]
fn missing_catalog_is_a_config_failure() {
    with_env(&[("FLEETQUOTE_CATALOG_PATH", "/nonexistent/catalog.toml")], || {
        let fixture = fixture(READY_DRAFT, "");
        let result = price::run(fixture.config(), &fixture.draft_path);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "catalog_load");
    });
}

#[test]
fn summary_renders_text_with_configured_signature() {
    with_env(&[("FLEETQUOTE_SUMMARY_SIGNATURE", "Northwind fleet desk")], || {
        let fixture = fixture(READY_DRAFT, "");
        let result = summary::run(fixture.config(), &fixture.draft_path);
        assert_eq!(result.exit_code, 0, "expected summary: {}", result.output);

        let payload = parse_payload(&result.output);
        let text = payload["data"]["text"].as_str().expect("summary text");
        assert!(text.starts_with("Hello Ana,"));
        assert!(text.contains("Q-1001"));
        assert!(text.contains("(until 2026-02-09)"), "validity default from config: {text}");
        assert!(text.ends_with("Northwind fleet desk\n"));
    });
}

#[test]
fn summary_without_phone_is_rejected() {
    with_env(&[], || {
        let draft = READY_DRAFT.replace("\"+1 555 0100\"", "null");
        let fixture = fixture(&draft, "");
        let result = summary::run(fixture.config(), &fixture.draft_path);
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "no_contact");
    });
}

#[test]
fn apply_promotion_rewrites_the_draft_and_raises_unit_count() {
    with_env(&[], || {
        let fixture = fixture(READY_DRAFT, "");
        let result = apply_promotion::run(fixture.config(), &fixture.draft_path, "PROMO-FLEET");
        assert_eq!(result.exit_code, 0, "expected promotion applied: {}", result.output);

        let payload = parse_payload(&result.output);
        let draft = &payload["data"]["draft"];
        assert_eq!(draft["selected_promotion_id"], "PROMO-FLEET");
        assert_eq!(draft["unit_count"], 5);
        assert_eq!(draft["installation"]["product_id"], "inst-std");

        let installation = &payload["data"]["pricing"]["installation"];
        assert_eq!(decimal(&installation["base_amount"]), 500.0);
        assert_eq!(decimal(&installation["final_amount"]), 450.0);

        let locked = payload["data"]["locked_fields"].as_array().expect("locked fields");
        assert!(locked.contains(&Value::from("installation_product")));
    });
}

#[test]
fn apply_unknown_promotion_fails_with_input_error() {
    with_env(&[], || {
        let fixture = fixture(READY_DRAFT, "");
        let result = apply_promotion::run(fixture.config(), &fixture.draft_path, "PROMO-404");
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "promotion_not_found");
        assert!(payload["data"]["notices"].as_array().is_some_and(|notices| !notices.is_empty()));
    });
}

#[test]
fn validate_reports_the_first_failing_rule() {
    with_env(&[], || {
        let draft = READY_DRAFT.replace("\"tech-7\"", "null");
        let fixture = fixture(&draft, "");
        let result = validate::run(fixture.config(), &fixture.draft_path);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "validation_failed");
        assert_eq!(payload["data"]["violation"]["code"], "MISSING_INSTALLATION_ASSIGNEE");
        assert_eq!(payload["data"]["violation"]["field"], "installation_assignee");
    });
}

#[test]
fn validate_accepts_a_complete_draft() {
    with_env(&[], || {
        let fixture = fixture(READY_DRAFT, "");
        let result = validate::run(fixture.config(), &fixture.draft_path);
        assert_eq!(result.exit_code, 0, "expected valid draft: {}", result.output);
        assert_eq!(parse_payload(&result.output)["status"], "ok");
    });
}

#[test]
fn submit_dry_run_prints_the_payload_without_sending() {
    with_env(&[], || {
        let fixture = fixture(READY_DRAFT, "");
        let result = submit::run(fixture.config(), &fixture.draft_path, true);
        assert_eq!(result.exit_code, 0, "expected dry run success: {}", result.output);

        let payload = parse_payload(&result.output);
        let body = &payload["data"]["payload"];
        assert_eq!(body["referenceCode"], "Q-1001");
        assert_eq!(body["installationProductId"], "inst-std");
        assert_eq!(body["unitCount"], 3);
        assert_eq!(body["validityDays"], 30);
        assert!(body.get("promotionId").is_none());
    });
}

#[test]
fn submit_refuses_when_submission_is_disabled() {
    with_env(&[], || {
        let fixture = fixture(READY_DRAFT, "");
        let result = submit::run(fixture.config(), &fixture.draft_path, false);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "submission_disabled");
    });
}

#[test]
fn submit_validates_before_sending() {
    with_env(&[], || {
        let draft = READY_DRAFT.replace("\"debit\"", "null");
        let fixture = fixture(&draft, "");
        let result = submit::run(fixture.config(), &fixture.draft_path, true);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "validation_failed");
        assert_eq!(payload["data"]["retryable"], false);
    });
}

#[test]
fn submit_unreachable_backend_is_a_retryable_transport_failure() {
    with_env(&[], || {
        let extra = "\n[submission]\nenabled = true\nendpoint = \"http://127.0.0.1:9/quotes\"\n\
                     api_token = \"fq_test_token\"\ntimeout_secs = 2\n";
        let fixture = fixture(READY_DRAFT, extra);
        let result = submit::run(fixture.config(), &fixture.draft_path, false);
        assert_eq!(result.exit_code, 5, "expected transport failure: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "submission_transport");
        assert_eq!(payload["data"]["retryable"], true);
        assert_eq!(payload["data"]["notification"]["kind"], "warning");
        assert_eq!(
            payload["data"]["user_message"],
            "The quote service is temporarily unavailable. Please retry shortly."
        );
    });
}

#[test]
fn config_reports_sources_and_redacts_the_token() {
    with_env(&[("FLEETQUOTE_SUBMISSION_API_TOKEN", "fq_secret_value")], || {
        let fixture = fixture(READY_DRAFT, "");
        let result = config::run(fixture.config());
        assert_eq!(result.exit_code, 0, "expected config output: {}", result.output);

        let payload = parse_payload(&result.output);
        let entries = payload["data"]["entries"].as_array().expect("entries");
        let entry = |key: &str| {
            entries.iter().find(|entry| entry["key"] == key).cloned().expect("entry present")
        };

        assert_eq!(entry("submission.api_token")["value"], "fq_***");
        assert_eq!(
            entry("submission.api_token")["source"],
            "env (FLEETQUOTE_SUBMISSION_API_TOKEN)"
        );
        assert!(entry("catalog.path")["source"].as_str().is_some_and(|s| s.starts_with("file")));
        assert_eq!(entry("logging.level")["source"], "default");
        assert!(!result.output.contains("fq_secret_value"));
    });
}

#[test]
fn config_reports_validation_failures() {
    with_env(&[("FLEETQUOTE_LOGGING_LEVEL", "chatty")], || {
        let fixture = fixture(READY_DRAFT, "");
        let result = config::run(fixture.config());
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn decimal(value: &Value) -> f64 {
    match value {
        Value::String(raw) => raw.parse().expect("decimal string"),
        other => other.as_f64().expect("numeric value"),
    }
}

fn with_env(vars: &[(&str, &str)], test: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "FLEETQUOTE_CATALOG_PATH",
        "FLEETQUOTE_SUBMISSION_ENABLED",
        "FLEETQUOTE_SUBMISSION_ENDPOINT",
        "FLEETQUOTE_SUBMISSION_API_TOKEN",
        "FLEETQUOTE_SUBMISSION_TIMEOUT_SECS",
        "FLEETQUOTE_SUMMARY_CURRENCY_SYMBOL",
        "FLEETQUOTE_SUMMARY_SIGNATURE",
        "FLEETQUOTE_SUMMARY_PERIOD_LABEL",
        "FLEETQUOTE_SUMMARY_DEFAULT_VALIDITY_DAYS",
        "FLEETQUOTE_LOGGING_LEVEL",
        "FLEETQUOTE_LOGGING_FORMAT",
        "FLEETQUOTE_LOG_LEVEL",
        "FLEETQUOTE_LOG_FORMAT",
    ];

    for key in keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test();

    for key in keys {
        env::remove_var(key);
    }
}
