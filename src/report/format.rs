//! Formatted terminal output.
//!
//! Formatting lives in one place so the pipeline code stays free of layout
//! and output changes stay local.

use crate::domain::PredictionResult;
use crate::report::EvaluationMetrics;
use crate::score::ServiceInfo;
use crate::train::TrainingRun;

/// Per-class precision/recall/F1/support table plus accuracy and AUC.
pub fn format_classification_report(metrics: &EvaluationMetrics) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:>12} {:>10} {:>10} {:>10} {:>10}\n",
        "", "precision", "recall", "f1-score", "support"
    ));
    out.push('\n');
    for class in &metrics.per_class {
        out.push_str(&format!(
            "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}\n",
            class.label, class.precision, class.recall, class.f1, class.support
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        "{:>12} {:>10} {:>10} {:>10.2} {:>10}\n",
        "accuracy", "", "", metrics.accuracy, metrics.n_test
    ));

    let c = &metrics.confusion;
    out.push_str(&format!(
        "\nconfusion (rows=actual No/Yes, cols=predicted No/Yes):\n  [{:>6} {:>6}]\n  [{:>6} {:>6}]\n",
        c.tn, c.fp, c.fn_, c.tp
    ));
    out.push_str(&format!("ROC-AUC: {}\n", fmt_auc(metrics.auc)));
    out
}

/// Dataset counts, per-variant diagnostics and the chosen artifact.
pub fn format_run_summary(run: &TrainingRun) -> String {
    let mut out = String::new();
    let c = &run.counts;

    out.push_str("=== churn - Training Run ===\n");
    out.push_str(&format!("Source: {}\n", run.source.display()));
    out.push_str(&format!("Mode: {}\n", format!("{:?}", run.selection).to_lowercase()));
    out.push_str(&format!(
        "Rows: read={} | malformed={} | duplicates={} | unlabeled={}\n",
        c.rows_read, c.rows_skipped, c.duplicates_removed, c.unlabeled
    ));
    out.push_str(&format!(
        "Split: train={} | test={} | features={}\n",
        c.n_train, c.n_test, c.n_features
    ));

    out.push_str("\nModel diagnostics:\n");
    for outcome in &run.outcomes {
        let m = &outcome.metrics;
        let chosen = if outcome.variant() == run.best.variant { "*" } else { " " };
        out.push_str(&format!(
            "{chosen} {:<32} AUC={} Recall={:.4} Precision={:.4} F1={:.4}\n",
            outcome.variant().display_name(),
            fmt_auc(m.auc),
            m.recall,
            m.precision,
            m.f1
        ));
    }

    for outcome in &run.outcomes {
        out.push_str(&format!("\n{} classification report:\n", outcome.variant().display_name()));
        out.push_str(&format_classification_report(&outcome.metrics));
    }

    out.push_str("\nArtifacts:\n");
    for (variant, path) in &run.artifacts {
        out.push_str(&format!("- {variant}: {}\n", path.display()));
    }
    out.push_str(&format!(
        "- best: {} ({}; {})\n",
        run.best_path.display(),
        run.best.variant,
        run.best.reason
    ));
    out
}

/// Health/info surface as text.
pub fn format_info(info: &ServiceInfo) -> String {
    let mut out = String::new();
    let status = if info.ready { "ready" } else { "degraded (model not loaded)" };
    out.push_str(&format!("Status: {status}\n"));
    out.push_str(&format!("Artifact: {}\n", info.artifact_path.display()));
    if let Some(reason) = &info.reason {
        out.push_str(&format!("Reason: {reason}\n"));
    }
    if let Some(variant) = info.variant {
        out.push_str(&format!("Variant: {}\n", variant.display_name()));
    }
    if let Some(version) = info.format_version {
        out.push_str(&format!("Format version: {version}\n"));
    }
    if let Some(width) = info.feature_width {
        out.push_str(&format!("Features: {width}\n"));
    }
    if let Some(trained_at) = info.trained_at {
        out.push_str(&format!("Trained at: {}\n", trained_at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if let Some(m) = &info.metrics {
        out.push_str(&format!(
            "Test metrics: AUC={} Recall={:.4} Precision={:.4} F1={:.4} (n={})\n",
            fmt_auc(m.auc),
            m.recall,
            m.precision,
            m.f1,
            m.n_test
        ));
    }
    out
}

/// One line per scored record.
pub fn format_predictions(rows: &[(String, PredictionResult)]) -> String {
    let mut out = String::new();
    out.push_str(format!("{:<24} {:>12} {:<8}", "customer_id", "probability", "risk").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<24} {:-<12} {:-<8}", "", "", "").trim_end());
    out.push('\n');
    for (id, result) in rows {
        out.push_str(
            format!(
                "{:<24} {:>12.4} {:<8}",
                truncate(id, 24),
                result.churn_probability,
                result.risk_category.as_str()
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

fn fmt_auc(auc: Option<f64>) -> String {
    auc.map(|a| format!("{a:.4}")).unwrap_or_else(|| "n/a".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
