//! Regression forest: an ensemble of binary trees whose outputs are averaged.

use serde::{Deserialize, Serialize};

use super::Predictor;
use crate::error::{Result, UpscaleError};

/// One tree node. Split nodes route `x <= threshold` to `left`; a missing
/// (NaN) feature follows `default_left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        /// Index into the forest's covariate list.
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        default_left: bool,
    },
    Leaf {
        value: f64,
    },
}

/// A regression tree stored as a flat node array; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split { feature, threshold, left, right, default_left } => {
                    let x = row[feature];
                    let go_left = if x.is_nan() { default_left } else { x <= threshold };
                    idx = if go_left { left } else { right };
                }
            }
        }
    }

    /// Every node must be reached exactly once from the root, children must be
    /// in bounds and split features must index into `n_features` columns.
    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        let n = self.nodes.len();
        if n == 0 {
            return Err("empty tree".into());
        }
        let mut visited = vec![false; n];
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            if visited[idx] {
                return Err(format!("node {idx} reached twice (cycle or shared subtree)"));
            }
            visited[idx] = true;
            if let Node::Split { feature, left, right, threshold, .. } = self.nodes[idx] {
                if feature >= n_features {
                    return Err(format!(
                        "node {idx} splits on feature {feature}, model has {n_features}"
                    ));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {idx} has a non-finite threshold"));
                }
                for child in [left, right] {
                    if child >= n {
                        return Err(format!("node {idx} points to child {child}, tree has {n} nodes"));
                    }
                    stack.push(child);
                }
            }
        }
        match visited.iter().position(|v| !v) {
            Some(idx) => Err(format!("node {idx} is unreachable")),
            None => Ok(()),
        }
    }
}

/// Averaging ensemble of regression trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub covariates: Vec<String>,
    pub trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(UpscaleError::InvalidModel("random forest has no trees".into()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.covariates.len())
                .map_err(|reason| UpscaleError::InvalidModel(format!("tree {i}: {reason}")))?;
        }
        Ok(())
    }
}

impl Predictor for RandomForest {
    fn covariates(&self) -> &[String] {
        &self.covariates
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
        sum / self.trees.len() as f64
    }
}
