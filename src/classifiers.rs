//! Inference for the pre-trained credit-risk models.
//!
//! Models are plain data loaded from JSON artifacts. Each one is exposed to the ensemble
//! only through [`Classifier`], so a slot can hold any algorithm.

use anyhow::{anyhow, bail, ensure};
use serde::{Deserialize, Serialize};

/// A fitted binary classifier.
pub trait Classifier: Send + Sync {
    /// Predicts a label in {0, 1} for an already-scaled feature vector.
    fn predict(&self, features: &[f64]) -> anyhow::Result<u8>;

    /// Short description of the underlying algorithm, for logs.
    fn kind(&self) -> &'static str;
}

/// Per-feature standardization learned at training time: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.mean.len() == self.scale.len(),
            "scaler mean has {} entries but scale has {}",
            self.mean.len(),
            self.scale.len()
        );
        ensure!(
            self.mean.iter().chain(&self.scale).all(|v| v.is_finite()),
            "scaler contains non-finite parameters"
        );
        Ok(())
    }

    pub fn transform(&self, features: &[f64]) -> anyhow::Result<Vec<f64>> {
        ensure!(
            features.len() == self.width(),
            "feature vector has {} values, scaler expects {}",
            features.len(),
            self.width()
        );
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                // zero-variance features were fitted with a unit scale
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect())
    }
}

/// One node of a binary decision tree in flattened, index-linked form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// Go `left` when `x[feature] <= threshold`, otherwise `right`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf { value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn validate(&self, width: usize) -> anyhow::Result<()> {
        ensure!(!self.nodes.is_empty(), "tree has no nodes");
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                ensure!(*feature < width, "node {} splits on feature {} of {}", idx, feature, width);
                ensure!(
                    *left < self.nodes.len() && *right < self.nodes.len(),
                    "node {} points outside the tree",
                    idx
                );
            }
        }
        Ok(())
    }

    /// Walks from the root to a leaf and returns its value.
    pub fn evaluate(&self, features: &[f64]) -> anyhow::Result<f64> {
        let mut idx = 0;
        // a well-formed tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = features
                        .get(*feature)
                        .ok_or_else(|| anyhow!("feature {} missing from vector", feature))?;
                    idx = if x <= threshold { *left } else { *right };
                }
                None => bail!("tree node {} out of range", idx),
            }
        }
        bail!("tree contains a cycle")
    }
}

/// Serialized form of every supported model, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LogisticRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    DecisionTree {
        tree: RegressionTree,
    },
    RandomForest {
        trees: Vec<RegressionTree>,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    GradientBoosting {
        trees: Vec<RegressionTree>,
        #[serde(default)]
        base_score: f64,
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    KNearestNeighbors {
        k: usize,
        points: Vec<Vec<f64>>,
        labels: Vec<u8>,
    },
}

fn default_threshold() -> f64 {
    0.5
}

fn default_learning_rate() -> f64 {
    1.0
}

impl ModelArtifact {
    /// Checks the artifact against the feature width and turns it into a classifier.
    pub fn into_classifier(self, width: usize) -> anyhow::Result<Box<dyn Classifier>> {
        match self {
            ModelArtifact::LogisticRegression {
                coefficients,
                intercept,
            } => {
                ensure!(
                    coefficients.len() == width,
                    "logistic regression has {} coefficients, expected {}",
                    coefficients.len(),
                    width
                );
                Ok(Box::new(LogisticRegression {
                    coefficients,
                    intercept,
                }))
            }
            ModelArtifact::DecisionTree { tree } => {
                tree.validate(width)?;
                Ok(Box::new(DecisionTree { tree }))
            }
            ModelArtifact::RandomForest { trees, threshold } => {
                ensure!(!trees.is_empty(), "random forest has no trees");
                for tree in &trees {
                    tree.validate(width)?;
                }
                Ok(Box::new(RandomForest { trees, threshold }))
            }
            ModelArtifact::GradientBoosting {
                trees,
                base_score,
                learning_rate,
                threshold,
            } => {
                for tree in &trees {
                    tree.validate(width)?;
                }
                Ok(Box::new(GradientBoosting {
                    trees,
                    base_score,
                    learning_rate,
                    threshold,
                }))
            }
            ModelArtifact::KNearestNeighbors { k, points, labels } => {
                ensure!(k >= 1, "k must be at least 1");
                ensure!(
                    points.len() == labels.len(),
                    "{} training points but {} labels",
                    points.len(),
                    labels.len()
                );
                ensure!(points.len() >= k, "k = {} exceeds {} training points", k, points.len());
                ensure!(
                    points.iter().all(|p| p.len() == width),
                    "training points must have {} features",
                    width
                );
                ensure!(labels.iter().all(|l| *l <= 1), "labels must be 0 or 1");
                Ok(Box::new(KNearestNeighbors { k, points, labels }))
            }
        }
    }
}

fn check_width(features: &[f64], expected: usize) -> anyhow::Result<()> {
    ensure!(
        features.len() == expected,
        "feature vector has {} values, model expects {}",
        features.len(),
        expected
    );
    Ok(())
}

pub struct LogisticRegression {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl Classifier for LogisticRegression {
    fn predict(&self, features: &[f64]) -> anyhow::Result<u8> {
        check_width(features, self.coefficients.len())?;
        let z: f64 = self
            .coefficients
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        Ok(u8::from(z > 0.0))
    }

    fn kind(&self) -> &'static str {
        "logistic_regression"
    }
}

pub struct DecisionTree {
    tree: RegressionTree,
}

impl Classifier for DecisionTree {
    fn predict(&self, features: &[f64]) -> anyhow::Result<u8> {
        Ok(u8::from(self.tree.evaluate(features)? > 0.5))
    }

    fn kind(&self) -> &'static str {
        "decision_tree"
    }
}

/// Averaged regression trees, thresholded to a label.
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    threshold: f64,
}

impl Classifier for RandomForest {
    fn predict(&self, features: &[f64]) -> anyhow::Result<u8> {
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.evaluate(features)?;
        }
        let mean = total / self.trees.len() as f64;
        Ok(u8::from(mean > self.threshold))
    }

    fn kind(&self) -> &'static str {
        "random_forest"
    }
}

/// Additive log-odds trees; the probability is the logistic of the raw margin.
pub struct GradientBoosting {
    trees: Vec<RegressionTree>,
    base_score: f64,
    learning_rate: f64,
    threshold: f64,
}

impl GradientBoosting {
    pub fn probability(&self, features: &[f64]) -> anyhow::Result<f64> {
        let mut margin = self.base_score;
        for tree in &self.trees {
            margin += self.learning_rate * tree.evaluate(features)?;
        }
        Ok(1.0 / (1.0 + (-margin).exp()))
    }
}

impl Classifier for GradientBoosting {
    fn predict(&self, features: &[f64]) -> anyhow::Result<u8> {
        Ok(u8::from(self.probability(features)? > self.threshold))
    }

    fn kind(&self) -> &'static str {
        "gradient_boosting"
    }
}

pub struct KNearestNeighbors {
    k: usize,
    points: Vec<Vec<f64>>,
    labels: Vec<u8>,
}

impl Classifier for KNearestNeighbors {
    fn predict(&self, features: &[f64]) -> anyhow::Result<u8> {
        let width = self.points.first().map(Vec::len).unwrap_or(0);
        check_width(features, width)?;

        let mut distances: Vec<(f64, usize)> = self
            .points
            .iter()
            .enumerate()
            .map(|(idx, point)| {
                let d2: f64 = point
                    .iter()
                    .zip(features)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (d2, idx)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let positives = distances
            .iter()
            .take(self.k)
            .filter(|(_, idx)| self.labels[*idx] == 1)
            .count();
        // ties go to the lower class
        Ok(u8::from(positives * 2 > self.k))
    }

    fn kind(&self) -> &'static str {
        "k_nearest_neighbors"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stump(feature: usize, threshold: f64, low: f64, high: f64) -> RegressionTree {
        RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: low },
                TreeNode::Leaf { value: high },
            ],
        }
    }

    #[test]
    fn test_scaler_transform() {
        let scaler = StandardScaler {
            mean: vec![10.0, 0.0],
            scale: vec![2.0, 0.0],
        };
        assert_eq!(scaler.transform(&[14.0, 3.0]).unwrap(), vec![2.0, 3.0]);
        assert!(scaler.transform(&[1.0]).is_err());
    }

    #[test]
    fn test_logistic_regression_sign() {
        let model = ModelArtifact::LogisticRegression {
            coefficients: vec![1.0, -1.0],
            intercept: 0.0,
        }
        .into_classifier(2)
        .unwrap();
        assert_eq!(model.predict(&[2.0, 1.0]).unwrap(), 1);
        assert_eq!(model.predict(&[1.0, 2.0]).unwrap(), 0);
        // exactly on the boundary is class 0
        assert_eq!(model.predict(&[1.0, 1.0]).unwrap(), 0);
        assert!(model.predict(&[1.0]).is_err());
    }

    #[test]
    fn test_tree_walks_left_on_equal() {
        let tree = stump(0, 0.5, 0.0, 1.0);
        assert_eq!(tree.evaluate(&[0.5]).unwrap(), 0.0);
        assert_eq!(tree.evaluate(&[0.6]).unwrap(), 1.0);
    }

    #[test]
    fn test_tree_validation_and_cycles() {
        let bad_index = ModelArtifact::DecisionTree {
            tree: RegressionTree {
                nodes: vec![TreeNode::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 1,
                    right: 7,
                }],
            },
        };
        assert!(bad_index.into_classifier(1).is_err());

        let cyclic = RegressionTree {
            nodes: vec![TreeNode::Split {
                feature: 0,
                threshold: 0.0,
                left: 0,
                right: 0,
            }],
        };
        let err = cyclic.evaluate(&[1.0]).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_random_forest_threshold() {
        let model = ModelArtifact::RandomForest {
            trees: vec![stump(0, 0.0, 0.0, 1.0), stump(0, 1.0, 0.0, 1.0)],
            threshold: 0.5,
        }
        .into_classifier(1)
        .unwrap();
        // mean 0.5 is not above the threshold
        assert_eq!(model.predict(&[0.5]).unwrap(), 0);
        assert_eq!(model.predict(&[2.0]).unwrap(), 1);
    }

    #[test]
    fn test_gradient_boosting_margin() {
        let boosted = GradientBoosting {
            trees: vec![stump(0, 0.0, -2.0, 2.0)],
            base_score: 0.0,
            learning_rate: 0.5,
            threshold: 0.5,
        };
        let p = boosted.probability(&[1.0]).unwrap();
        assert!((p - 1.0 / (1.0 + (-1.0f64).exp())).abs() < 1e-12);
        assert_eq!(boosted.predict(&[1.0]).unwrap(), 1);
        assert_eq!(boosted.predict(&[-1.0]).unwrap(), 0);
    }

    #[test]
    fn test_knn_majority_and_tie() {
        let model = ModelArtifact::KNearestNeighbors {
            k: 3,
            points: vec![vec![0.0], vec![0.1], vec![0.2], vec![5.0]],
            labels: vec![1, 1, 0, 0],
        }
        .into_classifier(1)
        .unwrap();
        assert_eq!(model.predict(&[0.0]).unwrap(), 1);
        assert_eq!(model.predict(&[10.0]).unwrap(), 0);

        let even = ModelArtifact::KNearestNeighbors {
            k: 2,
            points: vec![vec![0.0], vec![1.0]],
            labels: vec![1, 0],
        }
        .into_classifier(1)
        .unwrap();
        assert_eq!(even.predict(&[0.5]).unwrap(), 0);
    }

    #[test]
    fn test_knn_rejects_bad_artifacts() {
        let too_few = ModelArtifact::KNearestNeighbors {
            k: 3,
            points: vec![vec![0.0]],
            labels: vec![1],
        };
        assert!(too_few.into_classifier(1).is_err());

        let bad_label = ModelArtifact::KNearestNeighbors {
            k: 1,
            points: vec![vec![0.0]],
            labels: vec![2],
        };
        assert!(bad_label.into_classifier(1).is_err());
    }

    #[test]
    fn test_artifact_json_shape() {
        let artifact: ModelArtifact = serde_json::from_value(json!({
            "kind": "gradient_boosting",
            "trees": [{"nodes": [{"leaf": {"value": 0.3}}]}]
        }))
        .unwrap();
        match artifact {
            ModelArtifact::GradientBoosting {
                base_score,
                learning_rate,
                threshold,
                ..
            } => {
                assert_eq!(base_score, 0.0);
                assert_eq!(learning_rate, 1.0);
                assert_eq!(threshold, 0.5);
            }
            other => panic!("unexpected artifact {:?}", other),
        }
    }
}
