//! Second-order regression trees for gradient boosting.
//!
//! Split finding works on pre-binned feature columns: the candidate
//! thresholds of a feature are its distinct training values (or quantiles of
//! them when there are more than `max_bins`), and a row's bin is the number of
//! thresholds strictly below its value. Sending `bin <= b` left is therefore
//! exactly `x <= threshold[b]`, which is the rule the fitted tree applies to
//! raw values at inference.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::features::FeatureMatrix;

/// Per-feature split thresholds learned from the training matrix.
#[derive(Debug, Clone)]
pub struct FeatureBins {
    cuts: Vec<Vec<f64>>,
}

impl FeatureBins {
    pub fn fit(x: &FeatureMatrix, max_bins: usize) -> Self {
        let max_bins = max_bins.max(2);
        let cuts = (0..x.width())
            .map(|j| {
                let mut col = x.column(j);
                col.sort_by(f64::total_cmp);
                col.dedup();
                if col.len() <= max_bins {
                    col
                } else {
                    let n = col.len();
                    let mut picked: Vec<f64> =
                        (1..=max_bins).map(|k| col[(k * n / max_bins).min(n) - 1]).collect();
                    picked.dedup();
                    picked
                }
            })
            .collect();
        Self { cuts }
    }

    pub fn thresholds(&self, feature: usize) -> &[f64] {
        &self.cuts[feature]
    }

    pub fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }

    pub fn bin(&self, feature: usize, value: f64) -> u16 {
        self.cuts[feature].partition_point(|&c| c < value) as u16
    }

    /// Column-major bin indices: `out[feature][row]`.
    pub fn bin_matrix(&self, x: &FeatureMatrix) -> Vec<Vec<u16>> {
        (0..x.width())
            .map(|j| x.rows().iter().map(|r| self.bin(j, r[j])).collect())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Arena-stored binary tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    /// Structural check for trees read from disk. Children always sit after
    /// their parent in the arena, which also rules out cycles.
    pub fn check(&self, n_features: usize) -> Result<(), AppError> {
        if self.nodes.is_empty() {
            return Err(AppError::config("tree has no nodes"));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= n_features {
                        return Err(AppError::config(format!(
                            "node {idx} splits on feature {feature}, model has {n_features}"
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(AppError::config(format!("node {idx} has a non-finite threshold")));
                    }
                    for child in [left, right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(AppError::config(format!(
                                "node {idx} points to invalid child {child}"
                            )));
                        }
                    }
                }
                Node::Leaf { value } if !value.is_finite() => {
                    return Err(AppError::config(format!("leaf {idx} has a non-finite value")));
                }
                Node::Leaf { .. } => {}
            }
        }
        Ok(())
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
                Some(Node::Leaf { value }) => return *value,
                None => return 0.0,
            }
        }
    }
}

/// Growth limits shared by every tree of an ensemble.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub lambda: f64,
    pub min_child_weight: f64,
    /// Shrinkage folded into the leaf values.
    pub learning_rate: f64,
}

struct SplitCandidate {
    gain: f64,
    feature: usize,
    bin: u16,
}

/// Grows one tree on gradients `grad` and hessians `hess`.
pub struct TreeBuilder<'a> {
    bins: &'a FeatureBins,
    binned: &'a [Vec<u16>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: TreeParams,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(
        bins: &'a FeatureBins,
        binned: &'a [Vec<u16>],
        grad: &'a [f64],
        hess: &'a [f64],
        params: TreeParams,
    ) -> Self {
        Self {
            bins,
            binned,
            grad,
            hess,
            params,
            nodes: Vec::new(),
        }
    }

    pub fn build(mut self) -> RegressionTree {
        let rows: Vec<usize> = (0..self.grad.len()).collect();
        self.grow(rows, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });

        if depth >= self.params.max_depth || rows.len() < 2 || h < 2.0 * self.params.min_child_weight {
            return idx;
        }
        let Some(best) = self.best_split(&rows, g, h) else {
            return idx;
        };

        let column = &self.binned[best.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&i| column[i] <= best.bin);
        let threshold = self.bins.thresholds(best.feature)[best.bin as usize];

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold,
            left,
            right,
        };
        idx
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -self.params.learning_rate * g / (h + self.params.lambda)
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = self.score(g, h);
        let mcw = self.params.min_child_weight;
        let mut best: Option<SplitCandidate> = None;

        for (feature, column) in self.binned.iter().enumerate() {
            let n_thresholds = self.bins.thresholds(feature).len();
            if n_thresholds == 0 {
                continue;
            }
            let n_bins = self.bins.n_bins(feature);
            let mut hist_g = vec![0.0; n_bins];
            let mut hist_h = vec![0.0; n_bins];
            let mut hist_n = vec![0usize; n_bins];
            for &i in rows {
                let b = column[i] as usize;
                hist_g[b] += self.grad[i];
                hist_h[b] += self.hess[i];
                hist_n[b] += 1;
            }

            let (mut gl, mut hl, mut nl) = (0.0, 0.0, 0usize);
            for b in 0..n_thresholds {
                gl += hist_g[b];
                hl += hist_h[b];
                nl += hist_n[b];
                let (gr, hr, nr) = (g - gl, h - hl, rows.len() - nl);
                if nl == 0 || nr == 0 || hl < mcw || hr < mcw {
                    continue;
                }
                let gain = self.score(gl, hl) + self.score(gr, hr) - parent;
                if gain > 1e-12 && best.as_ref().is_none_or(|c| gain > c.gain) {
                    best = Some(SplitCandidate {
                        gain,
                        feature,
                        bin: b as u16,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        let names = (0..rows[0].len()).map(|j| format!("x{j}")).collect();
        FeatureMatrix::new(names, rows).unwrap()
    }

    #[test]
    fn bin_index_agrees_with_threshold_rule() {
        let x = matrix(vec![vec![3.0], vec![1.0], vec![2.0], vec![2.0]]);
        let bins = FeatureBins::fit(&x, 256);
        assert_eq!(bins.thresholds(0), &[1.0, 2.0, 3.0]);
        for (b, &t) in bins.thresholds(0).iter().enumerate() {
            for v in [0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 4.0] {
                assert_eq!(bins.bin(0, v) as usize <= b, v <= t, "v={v} t={t}");
            }
        }
    }

    #[test]
    fn many_distinct_values_are_capped() {
        let x = matrix((0..1000).map(|i| vec![i as f64]).collect());
        let bins = FeatureBins::fit(&x, 16);
        assert!(bins.thresholds(0).len() <= 16);
        assert_eq!(*bins.thresholds(0).last().unwrap(), 999.0);
    }

    #[test]
    fn single_split_separates_gradients() {
        let x = matrix(vec![vec![0.0], vec![0.0], vec![1.0], vec![1.0]]);
        let bins = FeatureBins::fit(&x, 256);
        let binned = bins.bin_matrix(&x);
        let grad = [1.0, 1.0, -1.0, -1.0];
        let hess = [1.0; 4];
        let params = TreeParams {
            max_depth: 3,
            lambda: 0.0,
            min_child_weight: 0.0,
            learning_rate: 1.0,
        };
        let tree = TreeBuilder::new(&bins, &binned, &grad, &hess, params).build();
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[0.0]), -1.0);
        assert_eq!(tree.predict(&[1.0]), 1.0);
        assert_eq!(tree.predict(&[-3.0]), -1.0);
        assert_eq!(tree.predict(&[0.4]), 1.0);
    }

    #[test]
    fn depth_limit_is_respected() {
        let x = matrix((0..64).map(|i| vec![i as f64]).collect());
        let bins = FeatureBins::fit(&x, 256);
        let binned = bins.bin_matrix(&x);
        let grad: Vec<f64> = (0..64).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let hess = vec![1.0; 64];
        let params = TreeParams {
            max_depth: 2,
            lambda: 1.0,
            min_child_weight: 0.0,
            learning_rate: 0.1,
        };
        let tree = TreeBuilder::new(&bins, &binned, &grad, &hess, params).build();
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn grown_trees_pass_the_structural_check() {
        let x = matrix((0..32).map(|i| vec![i as f64, (i % 3) as f64]).collect());
        let bins = FeatureBins::fit(&x, 256);
        let binned = bins.bin_matrix(&x);
        let grad: Vec<f64> = (0..32).map(|i| if i % 5 < 2 { 1.0 } else { -1.0 }).collect();
        let params = TreeParams {
            max_depth: 4,
            lambda: 1.0,
            min_child_weight: 0.0,
            learning_rate: 0.3,
        };
        let tree = TreeBuilder::new(&bins, &binned, &grad, &vec![1.0; 32], params).build();
        assert!(tree.nodes().len() > 1);
        tree.check(2).unwrap();
    }

    #[test]
    fn malformed_trees_are_rejected() {
        let leaf = Node::Leaf { value: 0.5 };
        let split = |feature, left, right| Node::Split {
            feature,
            threshold: 1.0,
            left,
            right,
        };
        let cases = [
            vec![],
            vec![split(7, 1, 2), leaf, leaf],
            vec![split(0, 0, 1), leaf],
            vec![leaf, split(0, 0, 2), leaf],
            vec![split(0, 1, 9), leaf],
            vec![Node::Leaf { value: f64::NAN }],
        ];
        for nodes in cases {
            let tree = RegressionTree { nodes: nodes.clone() };
            let err = tree.check(2).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::InvalidConfiguration, "{nodes:?}");
        }
        RegressionTree {
            nodes: vec![split(1, 1, 2), leaf, leaf],
        }
        .check(2)
        .unwrap();
    }

    #[test]
    fn constant_gradient_gives_single_leaf() {
        let x = matrix(vec![vec![0.0], vec![1.0]]);
        let bins = FeatureBins::fit(&x, 256);
        let binned = bins.bin_matrix(&x);
        let params = TreeParams {
            max_depth: 5,
            lambda: 1.0,
            min_child_weight: 0.0,
            learning_rate: 1.0,
        };
        let tree = TreeBuilder::new(&bins, &binned, &[1.0, 1.0], &[1.0, 1.0], params).build();
        assert_eq!(tree.nodes().len(), 1);
        assert!((tree.predict(&[0.0]) + 2.0 / 3.0).abs() < 1e-12);
    }
}
