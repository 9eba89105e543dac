use std::path::Path;
use std::sync::Arc;

use churn_risk::app::pipeline::{score_file, write_synthetic};
use churn_risk::config::AppConfig;
use churn_risk::domain::{ModelSelection, ModelVariant, PredictionResult, Record, ValidationPolicy};
use churn_risk::error::ErrorKind;
use churn_risk::io::{read_artifact, write_predictions_csv};
use churn_risk::logging::LogHandle;
use churn_risk::score::{Scorer, ScoringService};
use churn_risk::train::{BEST_ARTIFACT_FILE, Trainer, TrainingRun, artifact_path};
use serde_json::json;
use tracing::Span;

fn train_on_synthetic(dir: &Path, selection: ModelSelection) -> TrainingRun {
    let raw = dir.join("raw").join("telco.csv");
    write_synthetic(1000, 11, &raw).unwrap();

    let mut config = AppConfig::with_defaults(&raw, "Churn");
    config.artifacts.dir = dir.join("models");
    config.challenger.n_estimators = 30;
    config.validate().unwrap();

    Trainer::new(config, &LogHandle::detached()).run(selection).unwrap()
}

fn new_customer_request() -> Record {
    serde_json::from_value(json!({
        "customerID": "0000-NEWCU",
        "gender": "Female",
        "SeniorCitizen": 0,
        "Partner": "No",
        "Dependents": "No",
        "tenure": 0,
        "PhoneService": "Yes",
        "MultipleLines": "No",
        "InternetService": "Fiber optic",
        "OnlineSecurity": "No",
        "OnlineBackup": "No",
        "DeviceProtection": "No",
        "TechSupport": "No",
        "StreamingTV": "No",
        "StreamingMovies": "No",
        "Contract": "Month-to-month",
        "PaperlessBilling": "Yes",
        "PaymentMethod": "Electronic check",
        "MonthlyCharges": 70.0,
        "TotalCharges": null
    }))
    .unwrap()
}

#[test]
fn reloaded_artifacts_reproduce_in_process_probabilities() {
    let dir = tempfile::tempdir().unwrap();
    let run = train_on_synthetic(dir.path(), ModelSelection::All);
    assert_eq!(run.outcomes.len(), 2);
    assert_eq!(run.counts.duplicates_removed, 5);

    for outcome in &run.outcomes {
        let path = artifact_path(&dir.path().join("models"), outcome.variant());
        let artifact = read_artifact(&path).unwrap();
        assert_eq!(artifact.variant, outcome.variant());
        assert_eq!(artifact.feature_width(), run.counts.n_features);

        let scorer = Scorer::from_artifact(Arc::new(artifact), ValidationPolicy::Advisory, Span::none());
        let reloaded = scorer.score_batch(&run.test_records).unwrap();
        assert_eq!(reloaded.len(), outcome.test_probabilities.len());
        for (after, before) in reloaded.iter().zip(&outcome.test_probabilities) {
            assert!(
                (after.churn_probability - before).abs() < 1e-12,
                "{} drifted: {} vs {before}",
                outcome.variant(),
                after.churn_probability
            );
        }
    }
}

#[test]
fn both_variant_run_designates_the_higher_auc_as_best() {
    let dir = tempfile::tempdir().unwrap();
    let run = train_on_synthetic(dir.path(), ModelSelection::All);

    let auc = |v: ModelVariant| run.outcome(v).and_then(|o| o.metrics.auc).unwrap();
    let (base, chal) = (auc(ModelVariant::Baseline), auc(ModelVariant::Challenger));
    let expected = if chal > base { ModelVariant::Challenger } else { ModelVariant::Baseline };
    assert_eq!(run.best.variant, expected);

    let best = read_artifact(&dir.path().join("models").join(BEST_ARTIFACT_FILE)).unwrap();
    assert_eq!(best.variant, expected);
    assert!(best.metrics.is_some_and(|m| m.auc.is_some()));
    assert!(base > 0.6 && chal > 0.6, "models learned nothing: {base} / {chal}");
}

#[test]
fn new_customer_with_null_charges_scores_deterministically() {
    let dir = tempfile::tempdir().unwrap();
    let run = train_on_synthetic(dir.path(), ModelSelection::Challenger);
    assert_eq!(run.best.variant, ModelVariant::Challenger);

    let service = ScoringService::start(&run.best_path, ValidationPolicy::Strict, Span::none());
    assert!(service.is_ready());
    let info = service.info();
    assert_eq!(info.variant, Some(ModelVariant::Challenger));
    assert_eq!(info.feature_width, Some(run.counts.n_features));

    let request = new_customer_request();
    let result = service.score(&request).unwrap();
    assert!((0.0..=1.0).contains(&result.churn_probability));
    assert_eq!(result, PredictionResult::from_probability(result.churn_probability));

    // null, absent and explicit zero charges are the same request
    let mut absent = request.clone();
    absent.remove("TotalCharges");
    let zero = request.clone().with("TotalCharges", churn_risk::domain::Value::Number(0.0));
    assert_eq!(service.score(&absent).unwrap(), result);
    assert_eq!(service.score(&zero).unwrap(), result);
    assert_eq!(service.score(&request).unwrap(), result);
}

#[test]
fn concurrent_scoring_shares_one_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let run = train_on_synthetic(dir.path(), ModelSelection::Baseline);
    let scorer = Scorer::load(&run.best_path, ValidationPolicy::Strict, Span::none()).unwrap();
    let request = new_customer_request();
    let expected = scorer.score(&request).unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|_| s.spawn(|| scorer.score(&request).unwrap())).collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn strict_serving_rejects_out_of_domain_requests() {
    let dir = tempfile::tempdir().unwrap();
    let run = train_on_synthetic(dir.path(), ModelSelection::Baseline);

    let bad = new_customer_request().with("Contract", churn_risk::domain::Value::Text("Weekly".into()));

    let strict = Scorer::load(&run.best_path, ValidationPolicy::Strict, Span::none()).unwrap();
    let err = strict.score(&bad).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    assert!(err.message().contains("Contract"));

    // Advisory scores anyway; the unseen category encodes to zeros.
    let advisory = Scorer::load(&run.best_path, ValidationPolicy::Advisory, Span::none()).unwrap();
    let result = advisory.score(&bad).unwrap();
    assert!((0.0..=1.0).contains(&result.churn_probability));
}

#[test]
fn unsupported_or_corrupt_artifacts_leave_the_service_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let run = train_on_synthetic(dir.path(), ModelSelection::Baseline);

    let mut value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&run.best_path).unwrap()).unwrap();
    value["format_version"] = json!(99);
    let future = dir.path().join("future.json");
    std::fs::write(&future, value.to_string()).unwrap();
    assert_eq!(read_artifact(&future).unwrap_err().kind(), ErrorKind::InvalidConfiguration);

    let corrupt = dir.path().join("corrupt.json");
    std::fs::write(&corrupt, "{ not json").unwrap();

    for path in [&future, &corrupt] {
        let service = ScoringService::start(path, ValidationPolicy::Strict, Span::none());
        assert!(!service.is_ready());
        assert!(!service.info().ready);
        let err = service.score(&new_customer_request()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelNotLoaded);
    }
}

#[test]
fn structurally_broken_trees_are_refused_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let run = train_on_synthetic(dir.path(), ModelSelection::Challenger);
    let pristine: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&run.best_path).unwrap()).unwrap();

    let first_split = |value: &serde_json::Value| -> usize {
        let nodes = value["model"]["trees"][0]["nodes"].as_array().unwrap();
        nodes.iter().position(|n| n["node"] == "split").unwrap()
    };
    let mut out_of_range = pristine.clone();
    let i = first_split(&out_of_range);
    out_of_range["model"]["trees"][0]["nodes"][i]["feature"] = json!(100000);

    let mut cyclic = pristine.clone();
    let i = first_split(&cyclic);
    cyclic["model"]["trees"][0]["nodes"][i]["left"] = json!(i);

    for (name, value) in [("out_of_range", out_of_range), ("cyclic", cyclic)] {
        let path = dir.path().join(format!("{name}.json"));
        std::fs::write(&path, value.to_string()).unwrap();
        assert_eq!(read_artifact(&path).unwrap_err().kind(), ErrorKind::InvalidConfiguration);

        let service = ScoringService::start(&path, ValidationPolicy::Strict, Span::none());
        assert!(!service.is_ready(), "{name} loaded");
        let err = service.score(&new_customer_request()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelNotLoaded);
    }
}

#[test]
fn score_file_reads_json_requests_and_exports_csv() {
    let dir = tempfile::tempdir().unwrap();
    let run = train_on_synthetic(dir.path(), ModelSelection::Baseline);
    let scorer = Scorer::load(&run.best_path, ValidationPolicy::Strict, Span::none()).unwrap();

    let mut second = serde_json::to_value(new_customer_request()).unwrap();
    second["customerID"] = json!("0000-OTHER");
    second["tenure"] = json!(60);
    second["TotalCharges"] = json!(4200.0);
    second["Contract"] = json!("Two year");
    let input = dir.path().join("requests.json");
    std::fs::write(&input, json!([new_customer_request(), second]).to_string()).unwrap();

    let rows = score_file(&scorer, &input).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, "0000-NEWCU");
    assert_eq!(rows[1].0, "0000-OTHER");

    let out = dir.path().join("scores.csv");
    write_predictions_csv(&out, &rows).unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.starts_with("customer_id,churn_probability,risk_category"));
}

#[test]
fn shipped_config_parses_and_validates() {
    let text = include_str!("../configs/config.toml");
    let config = AppConfig::from_toml_str(text).unwrap();
    config.validate().unwrap();
    assert_eq!(config.data.target_col, "Churn");
    assert_eq!(config.validation.serving, ValidationPolicy::Strict);
}
