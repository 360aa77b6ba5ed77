//! Integration test: full sessions against a seeded local tracking store

use shaplens::config::SessionConfig;
use shaplens::demo::{self, DemoSeed};
use shaplens::explain::{ExplainerMethod, DISPLAY_CLASS};
use shaplens::model::{TreeEnsemble, TreeNode, TREE_MODEL_FILE};
use shaplens::render::{format_value, Artifact, Renderer};
use shaplens::session::{run_session, HaltReason, Level, Upload};
use shaplens::tracking::LocalStore;
use tempfile::TempDir;

fn seeded_store() -> (TempDir, DemoSeed) {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::create(dir.path()).unwrap();
    let seeded = demo::seed(&store, "churn-demo").unwrap();
    (dir, seeded)
}

fn config(dir: &TempDir, experiment: &str) -> SessionConfig {
    SessionConfig::new(dir.path().to_string_lossy(), experiment)
}

fn upload(rows: usize, with_target: bool) -> Upload {
    Upload::new("customers.csv", demo::csv(rows, 7, with_target).unwrap())
}

#[test]
fn test_missing_experiment_reports_not_found() {
    let (dir, _) = seeded_store();
    let report = run_session(&config(&dir, "fraud-detection"), None);

    assert_eq!(report.halted, Some(HaltReason::ExperimentNotFound));
    assert_eq!(
        report.messages_at(Level::Error),
        vec!["Experiment not found: fraud-detection"]
    );
    assert!(report.runs.is_none());
    assert!(report.model_uri.is_none());
}

#[test]
fn test_no_upload_waits_for_data() {
    let (dir, seeded) = seeded_store();
    let report = run_session(&config(&dir, "churn-demo").with_run_id(&seeded.tree_run.run_id), None);

    assert_eq!(report.halted, Some(HaltReason::AwaitingData));
    assert_eq!(report.runs.as_ref().map(|r| r.len()), Some(2));
    assert_eq!(report.loader.as_deref(), Some("tree_ensemble"));
    assert_eq!(report.messages_at(Level::Success).len(), 1);
    assert!(!report.has_error());
}

#[test]
fn test_tree_model_on_large_upload_is_capped() {
    let (dir, seeded) = seeded_store();
    let cfg = config(&dir, "churn-demo")
        .with_run_id(&seeded.tree_run.run_id)
        .with_max_rows(1000);
    let report = run_session(&cfg, Some(&upload(5000, false)));

    assert!(report.halted.is_none(), "messages: {:?}", report.messages);
    assert_eq!(report.original_rows, Some(5000));
    assert_eq!(report.explained_rows, Some(1000));
    assert_eq!(report.method, Some(ExplainerMethod::Tree));
    assert!(report
        .messages_at(Level::Info)
        .contains(&"Explaining 1000 rows (sampled if original > 1000)."));

    let attributions = report.attributions.as_ref().unwrap();
    assert_eq!(attributions.n_rows(), 1000);
    assert!(attributions.max_additivity_gap() < 1e-9);

    assert!(matches!(report.aggregate, Some(Artifact::Image { .. })));
    assert!(matches!(report.force, Some(Artifact::Html { .. })));
    assert_eq!(report.preview.as_ref().map(|p| p.rows.len()), Some(5));
}

#[test]
fn test_generic_model_reshapes_extra_columns() {
    let (dir, seeded) = seeded_store();
    let cfg = config(&dir, "churn-demo").with_run_id(&seeded.generic_run.run_id);
    let report = run_session(&cfg, Some(&upload(200, true)));

    assert!(report.halted.is_none(), "messages: {:?}", report.messages);
    assert_eq!(report.loader.as_deref(), Some("generic"));
    assert_eq!(report.method, Some(ExplainerMethod::Permutation));

    let attributions = report.attributions.as_ref().unwrap();
    assert!(attributions.max_additivity_gap() < 1e-9);

    // The label column is not a model input and must receive no credit
    let summary = attributions.summary(0).unwrap();
    let target = attributions
        .feature_names
        .iter()
        .position(|n| n == demo::TARGET)
        .unwrap();
    assert_eq!(summary.mean_abs_shap[target], 0.0);
}

#[test]
fn test_missing_model_columns_fail_explainer_creation() {
    let (dir, seeded) = seeded_store();
    let csv = "age,income,plan\n30,50000,basic\n45,80000,plus\n";
    let cfg = config(&dir, "churn-demo")
        .with_run_id(&seeded.generic_run.run_id)
        .with_max_rows(50);
    let report = run_session(&cfg, Some(&Upload::new("partial.csv", csv.as_bytes().to_vec())));

    assert_eq!(report.halted, Some(HaltReason::ExplainerCreationError));
    let errors = report.messages_at(Level::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Failed to create SHAP explainer"));
    assert!(errors[0].contains("tenure"));
    assert!(report.aggregate.is_none());
}

#[test]
fn test_out_of_range_index_keeps_summary() {
    let (dir, seeded) = seeded_store();
    let cfg = config(&dir, "churn-demo")
        .with_run_id(&seeded.tree_run.run_id)
        .with_max_rows(50)
        .with_sample_index(75);
    let report = run_session(&cfg, Some(&upload(100, false)));

    assert!(report.halted.is_none());
    assert_eq!(report.explained_rows, Some(50));
    assert!(report
        .messages_at(Level::Error)
        .iter()
        .any(|m| m.contains("75") && m.contains("out of range")));
    assert!(report.aggregate.is_some());
    assert!(report.force.is_none());
}

#[test]
fn test_summary_style_does_not_change_attributions() {
    let (dir, seeded) = seeded_store();
    let base = config(&dir, "churn-demo")
        .with_run_id(&seeded.tree_run.run_id)
        .with_max_rows(50);
    let data = upload(120, false);

    let dots = run_session(&base.clone().with_summary_bar(false), Some(&data));
    let bars = run_session(&base.with_summary_bar(true), Some(&data));

    let a = dots.attributions.unwrap();
    let b = bars.attributions.unwrap();
    assert_eq!(a.values, b.values);
    assert_eq!(a.row_indices, b.row_indices);
    assert_ne!(
        dots.aggregate.unwrap().caption(),
        bars.aggregate.unwrap().caption()
    );
}

#[test]
fn test_unknown_run_falls_back_to_latest() {
    let (dir, _) = seeded_store();
    let cfg = config(&dir, "churn-demo").with_run_id("not-a-run");
    let report = run_session(&cfg, None);

    assert_eq!(report.messages_at(Level::Warning).len(), 1);
    let runs = report.runs.as_ref().unwrap();
    assert_eq!(report.selected_run.as_deref(), Some(runs[0].run_id.as_str()));
}

#[test]
fn test_wrong_artifact_path_lists_loader_attempts() {
    let (dir, seeded) = seeded_store();
    let cfg = config(&dir, "churn-demo")
        .with_run_id(&seeded.tree_run.run_id)
        .with_artifact_path("classifier");
    let report = run_session(&cfg, None);

    assert_eq!(report.halted, Some(HaltReason::ModelLoadError));
    let errors = report.messages_at(Level::Error);
    assert!(errors[0].contains(&format!("runs:/{}/classifier", seeded.tree_run.run_id)));
    assert!(errors[0].contains("[tree_ensemble]"));
    assert!(errors[0].contains("[generic]"));
}

#[test]
fn test_static_force_plot_is_image() {
    let (dir, seeded) = seeded_store();
    let mut cfg = config(&dir, "churn-demo")
        .with_run_id(&seeded.tree_run.run_id)
        .with_max_rows(50);
    cfg.explainer.interactive = false;
    let report = run_session(&cfg, Some(&upload(60, false)));

    assert!(matches!(report.force, Some(Artifact::Image { .. })));
    assert_eq!(report.messages_at(Level::Warning).len(), 1);
}

fn leaf(values: [f64; 2], n_samples: usize) -> TreeNode {
    TreeNode::Leaf {
        values: values.to_vec(),
        n_samples,
    }
}

fn split(feature_idx: usize, threshold: f64, left: TreeNode, right: TreeNode) -> TreeNode {
    let n_samples = left.n_samples() + right.n_samples();
    TreeNode::Split {
        feature_idx,
        threshold,
        left: Box::new(left),
        right: Box::new(right),
        n_samples,
    }
}

/// Logs a two-class tree model as a third run and returns its id
fn log_classifier(dir: &TempDir, seeded: &DemoSeed) -> String {
    let store = LocalStore::open(dir.path()).unwrap();
    let run = store
        .create_run(&seeded.experiment.experiment_id, "classifier")
        .unwrap();
    let model = TreeEnsemble::new(
        vec![
            split(2, 12.0, leaf([0.5, -0.2], 350), leaf([-0.3, 0.6], 650)),
            split(0, 40.0, leaf([0.1, 0.9], 400), leaf([-0.2, -0.1], 600)),
        ],
        demo::FEATURES.len(),
        2,
    )
    .with_feature_names(demo::FEATURES.iter().map(|f| f.to_string()).collect())
    .with_classes(vec!["stay".to_string(), "churn".to_string()]);
    store
        .log_artifact(
            &run.run_id,
            &format!("model/{}", TREE_MODEL_FILE),
            &serde_json::to_vec(&model).unwrap(),
        )
        .unwrap();
    run.run_id
}

#[test]
fn test_multi_output_model_shows_first_class_in_both_views() {
    let (dir, seeded) = seeded_store();
    let run_id = log_classifier(&dir, &seeded);
    let cfg = config(&dir, "churn-demo")
        .with_run_id(&run_id)
        .with_max_rows(50)
        .with_summary_bar(true);
    let report = run_session(&cfg, Some(&upload(80, false)));

    assert!(report.halted.is_none(), "messages: {:?}", report.messages);
    assert_eq!(report.method, Some(ExplainerMethod::Tree));
    assert_eq!(report.n_classes, Some(2));
    assert!(report
        .messages_at(Level::Info)
        .contains(&"Model has 2 outputs; both views show class 0 ('stay') of 2."));

    let attributions = report.attributions.as_ref().unwrap();
    assert!(attributions.max_additivity_gap() < 1e-9);
    assert!((attributions.base_value(0).unwrap() - (-0.1)).abs() < 1e-12);
    assert!((attributions.base_value(1).unwrap() - 0.62).abs() < 1e-12);

    // Force view: class 0 base value and prediction
    let local = attributions.row(cfg.sample_index, DISPLAY_CLASS).unwrap();
    assert_eq!(local.base_value, attributions.base_value(DISPLAY_CLASS).unwrap());
    let force = report.force.as_ref().unwrap();
    assert_eq!(
        force.caption(),
        format!(
            "Row 0 (original row {}): base value {} → prediction {}",
            local.original_index,
            format_value(local.base_value),
            format_value(local.prediction)
        )
    );
    match force {
        Artifact::Html { markup, .. } => {
            assert!(markup.contains(&format!("base value = {}", format_value(local.base_value))));
        }
        Artifact::Image { .. } => panic!("expected the interactive force plot"),
    }

    // Summary view: rendered from the class 0 table, not class 1
    let renderer = Renderer::new(&cfg.explainer);
    let shown = report.aggregate.as_ref().unwrap().data_uri();
    let class_0 = renderer.aggregate(attributions, DISPLAY_CLASS, true).unwrap();
    let class_1 = renderer.aggregate(attributions, 1, true).unwrap();
    assert_eq!(shown, class_0.data_uri());
    assert_ne!(shown, class_1.data_uri());
}

#[test]
fn test_plan_codes_follow_model_levels() {
    let (dir, seeded) = seeded_store();
    let cfg = config(&dir, "churn-demo")
        .with_run_id(&seeded.tree_run.run_id)
        .with_max_rows(50);
    let with_basic = "age,income,tenure,plan\n40,60000,5,plus\n30,50000,20,basic\n";
    let premium_only = "age,income,tenure,plan\n40,60000,5,plus\n50,90000,40,premium\n";

    let a = run_session(&cfg, Some(&Upload::new("a.csv", with_basic.as_bytes().to_vec())));
    let b = run_session(&cfg, Some(&Upload::new("b.csv", premium_only.as_bytes().to_vec())));

    let pa = a.attributions.unwrap().row(0, DISPLAY_CLASS).unwrap();
    let pb = b.attributions.unwrap().row(0, DISPLAY_CLASS).unwrap();
    assert!((pa.prediction - (-0.15)).abs() < 1e-12);
    assert_eq!(pa.prediction, pb.prediction);
    assert_eq!(pa.contributions[3].feature_value, 1.0);
    assert_eq!(pb.contributions[3].feature_value, 1.0);
}
