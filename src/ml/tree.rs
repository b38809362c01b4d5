//! CART decision tree (Gini impurity)
//!
//! Trees are grown iteratively into a flat node vector so a fitted tree is
//! plain data: cheap to clone and to serialize.

use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Maximum depth; `None` grows until leaves are pure.
    pub max_depth: Option<usize>,
    /// Minimum rows required to split a node.
    pub min_samples_split: usize,
    /// Features considered per split; `None` considers all.
    pub max_features: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { max_depth: None, min_samples_split: 2, max_features: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf { distribution: Vec<f64> },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

/// Fitted classification tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_classes: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

#[allow(clippy::cast_precision_loss)]
fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / total).powi(2)).sum::<f64>()
}

#[allow(clippy::cast_precision_loss)]
fn distribution(counts: &[usize], total: usize) -> Vec<f64> {
    counts.iter().map(|&c| c as f64 / total.max(1) as f64).collect()
}

impl DecisionTree {
    /// Grow a tree on the rows at `indices` (duplicates allowed, for bootstrap samples).
    ///
    /// Callers guarantee `indices` is non-empty and every label is below `n_classes`.
    #[must_use]
    pub fn fit(
        features: &[Vec<f64>],
        labels: &[usize],
        indices: &[usize],
        n_classes: usize,
        config: TreeConfig,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = features.first().map_or(0, Vec::len);
        let max_features = config.max_features.unwrap_or(n_features).clamp(1, n_features.max(1));

        let mut nodes: Vec<Node> = Vec::new();
        // (slot, rows, depth)
        let mut pending: Vec<(usize, Vec<usize>, usize)> = Vec::new();
        nodes.push(Node::Leaf { distribution: Vec::new() });
        pending.push((0, indices.to_vec(), 0));

        while let Some((slot, rows, depth)) = pending.pop() {
            let mut counts = vec![0_usize; n_classes];
            for &i in &rows {
                counts[labels[i]] += 1;
            }
            let impurity = gini(&counts, rows.len());

            let can_split = impurity > 0.0
                && rows.len() >= config.min_samples_split.max(2)
                && config.max_depth.map_or(true, |max| depth < max)
                && n_features > 0;

            let split = if can_split {
                let candidates = index::sample(rng, n_features, max_features).into_vec();
                best_split(features, labels, &rows, &candidates, n_classes, impurity)
            } else {
                None
            };

            match split {
                Some(split) => {
                    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                        .iter()
                        .partition(|&&i| features[i][split.feature] <= split.threshold);
                    let left = nodes.len();
                    nodes.push(Node::Leaf { distribution: Vec::new() });
                    let right = nodes.len();
                    nodes.push(Node::Leaf { distribution: Vec::new() });
                    nodes[slot] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left,
                        right,
                    };
                    pending.push((right, right_rows, depth + 1));
                    pending.push((left, left_rows, depth + 1));
                }
                None => {
                    nodes[slot] = Node::Leaf { distribution: distribution(&counts, rows.len()) };
                }
            }
        }

        Self { nodes, n_classes }
    }

    /// Class probabilities for one row.
    #[must_use]
    pub fn predict_proba_row(&self, row: &[f64]) -> &[f64] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { distribution } => return distribution,
                Node::Split { feature, threshold, left, right } => {
                    at = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Number of classes the tree was grown for.
    #[must_use]
    pub const fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Total node count.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the deepest leaf (root has depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0_usize, 0_usize)];
        while let Some((at, depth)) = stack.pop() {
            match &self.nodes[at] {
                Node::Leaf { .. } => max_depth = max_depth.max(depth),
                Node::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
            }
        }
        max_depth
    }
}

/// Lowest weighted child impurity over the candidate features, if it beats
/// the parent.
#[allow(clippy::cast_precision_loss)]
fn best_split(
    features: &[Vec<f64>],
    labels: &[usize],
    rows: &[usize],
    candidates: &[usize],
    n_classes: usize,
    parent_impurity: f64,
) -> Option<SplitCandidate> {
    let total = rows.len();
    let mut best: Option<SplitCandidate> = None;
    let mut sorted = rows.to_vec();

    for &feature in candidates {
        sorted.sort_by(|&a, &b| features[a][feature].total_cmp(&features[b][feature]));

        let mut left = vec![0_usize; n_classes];
        let mut right = vec![0_usize; n_classes];
        for &i in &sorted {
            right[labels[i]] += 1;
        }

        for pos in 0..total - 1 {
            let label = labels[sorted[pos]];
            left[label] += 1;
            right[label] -= 1;

            let here = features[sorted[pos]][feature];
            let next = features[sorted[pos + 1]][feature];
            if here >= next {
                continue;
            }

            let n_left = pos + 1;
            let n_right = total - n_left;
            let impurity = (n_left as f64 * gini(&left, n_left)
                + n_right as f64 * gini(&right, n_right))
                / total as f64;

            if impurity < parent_impurity - 1e-12
                && best.as_ref().map_or(true, |b| impurity < b.impurity)
            {
                let mut threshold = here + (next - here) / 2.0;
                // Midpoint can round up to `next` for adjacent floats.
                if threshold >= next {
                    threshold = here;
                }
                best = Some(SplitCandidate { feature, threshold, impurity });
            }
        }
    }

    best
}
