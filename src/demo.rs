//! Demo experiment
//!
//! Seeds a local tracking store with a churn experiment holding two runs: a
//! native tree ensemble and a generic linear model behind `MLmodel.json`.
//! Also generates matching CSV data. Used by `shaplens seed-demo` and tests.

use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::data::CategoryLevels;
use crate::error::Result;
use crate::model::{
    Aggregation, FlavorSpec, LinearModel, Link, ModelDescriptor, Signature, TreeEnsemble,
    TreeNode, DESCRIPTOR_FILE, TREE_MODEL_FILE,
};
use crate::tracking::{Experiment, LocalStore, RunInfo};

/// Model input columns in training order
pub const FEATURES: [&str; 4] = ["age", "income", "tenure", "plan"];
/// Label column written when requested
pub const TARGET: &str = "churned";
/// Plan values in code order, recorded on both demo models
pub const PLANS: [&str; 3] = ["basic", "plus", "premium"];

/// What `seed` created
#[derive(Debug, Clone)]
pub struct DemoSeed {
    pub experiment: Experiment,
    pub tree_run: RunInfo,
    pub generic_run: RunInfo,
}

fn leaf(value: f64, n_samples: usize) -> TreeNode {
    TreeNode::Leaf {
        values: vec![value],
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

fn feature_names() -> Vec<String> {
    FEATURES.iter().map(|f| f.to_string()).collect()
}

/// Level order of the `plan` column
pub fn plan_levels() -> CategoryLevels {
    [(
        "plan".to_string(),
        PLANS.iter().map(|p| p.to_string()).collect(),
    )]
    .into_iter()
    .collect()
}

/// Boosted churn model; raw output is the log-odds of churning
pub fn tree_model() -> TreeEnsemble {
    let trees = vec![
        split(
            2,
            12.0,
            split(3, 0.5, leaf(0.8, 200), leaf(0.3, 150)),
            split(0, 35.0, leaf(0.1, 250), leaf(-0.4, 400)),
        ),
        split(
            1,
            40_000.0,
            leaf(0.35, 380),
            split(2, 36.0, leaf(-0.05, 320), leaf(-0.3, 300)),
        ),
        split(
            0,
            50.0,
            split(1, 70_000.0, leaf(0.1, 420), leaf(-0.1, 250)),
            leaf(-0.2, 330),
        ),
    ];

    TreeEnsemble::new(trees, FEATURES.len(), 1)
        .with_aggregation(Aggregation::Sum)
        .with_base_score(vec![-0.5])
        .with_feature_names(feature_names())
        .with_categories(plan_levels())
}

/// Logistic churn model, columns in `FEATURES` order
pub fn linear_model() -> LinearModel {
    LinearModel::new(vec![vec![-0.02, -0.000_01, -0.04, -0.3]], vec![1.2]).with_link(Link::Logistic)
}

/// Descriptor pointing the generic loader at the linear model
pub fn linear_descriptor() -> ModelDescriptor {
    ModelDescriptor {
        flavors: [(
            "linear".to_string(),
            FlavorSpec {
                data: "linear.json".to_string(),
            },
        )]
        .into_iter()
        .collect(),
        signature: Some(Signature {
            inputs: feature_names(),
            categories: plan_levels(),
        }),
    }
}

/// Random customers as CSV, optionally with the label column last
pub fn csv(rows: usize, seed: u64, with_target: bool) -> Result<Vec<u8>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut age = Vec::with_capacity(rows);
    let mut income = Vec::with_capacity(rows);
    let mut tenure = Vec::with_capacity(rows);
    let mut plan = Vec::with_capacity(rows);
    let mut churned = Vec::with_capacity(rows);

    for _ in 0..rows {
        let a: i64 = rng.gen_range(18..80);
        let i: i64 = rng.gen_range(15..150) * 1000;
        let t: i64 = rng.gen_range(0..72);
        let p = PLANS[rng.gen_range(0..PLANS.len())];
        let risk = if t <= 12 { 0.5 } else { 0.15 } + if p == "basic" { 0.15 } else { 0.0 };
        age.push(a);
        income.push(i);
        tenure.push(t);
        plan.push(p.to_string());
        churned.push(i64::from(rng.gen_bool(risk)));
    }

    let mut df = df!(
        "age" => age,
        "income" => income,
        "tenure" => tenure,
        "plan" => plan,
    )?;
    if with_target {
        df.with_column(Column::new(TARGET.into(), churned))?;
    }

    let mut buf = Vec::new();
    CsvWriter::new(&mut buf).include_header(true).finish(&mut df)?;
    Ok(buf)
}

/// Create the demo experiment and its two runs in a local store
pub fn seed(store: &LocalStore, experiment_name: &str) -> Result<DemoSeed> {
    let experiment = store.create_experiment(experiment_name)?;

    let tree_run = store.create_run(&experiment.experiment_id, "gbt-native")?;
    let tree_json = serde_json::to_vec_pretty(&tree_model())?;
    store.log_artifact(&tree_run.run_id, &format!("model/{}", TREE_MODEL_FILE), &tree_json)?;

    let generic_run = store.create_run(&experiment.experiment_id, "logreg-generic")?;
    let descriptor = serde_json::to_vec_pretty(&linear_descriptor())?;
    store.log_artifact(&generic_run.run_id, &format!("model/{}", DESCRIPTOR_FILE), &descriptor)?;
    let linear = serde_json::to_vec_pretty(&linear_model())?;
    store.log_artifact(&generic_run.run_id, "model/linear.json", &linear)?;

    info!(
        experiment = %experiment.name,
        tree_run = %tree_run.run_id,
        generic_run = %generic_run.run_id,
        "Seeded demo experiment"
    );

    Ok(DemoSeed {
        experiment,
        tree_run,
        generic_run,
    })
}
