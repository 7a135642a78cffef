//! Emergency classifier.
//!
//! A small random forest predicting whether a reading is an emergency
//! (critically dry soil or critical pH) from humidity, pH and temperature.
//! Labels come from the decision thresholds, not from the recorded pump
//! state, so the model can be trained on edited history too.
//!
//! Training returns an [`EmergencyModel`] handle owned by the caller; there
//! is no process-wide "last model".

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::stats::{column_values, mean};
use crate::decision::is_emergency;
use crate::error::AnalyticsError;
use crate::models::{Column, Reading};
use crate::settings::{ClassifierSettings, Thresholds};

// ---

/// Model inputs, in feature-vector order.
pub const FEATURES: [Column; 3] = [Column::Humidity, Column::Ph, Column::Temperature];

pub const MIN_TRAINING_READINGS: usize = 10;

/// Hard cap on tree depth.
const MAX_DEPTH: usize = 32;

type Sample = [f64; 3];

/// Qualitative emergency risk shown by the what-if simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_probability(p: f64) -> Self {
        if p > 0.7 {
            RiskLevel::High
        } else if p > 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: Column,
    pub importance: f64,
}

/// Serializable training summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierReport {
    // ---
    pub accuracy: f64,
    pub train_size: usize,
    pub test_size: usize,
    /// False when the split fell back to plain random sampling.
    pub stratified: bool,
    pub n_trees: usize,
    /// Sorted by importance, descending.
    pub feature_importances: Vec<FeatureImportance>,
}

/// Trained classifier handle.
#[derive(Debug, Clone)]
pub struct EmergencyModel {
    forest: Vec<Tree>,
    /// Training means, used to impute missing inputs at prediction time.
    feature_means: Sample,
    report: ClassifierReport,
}

impl EmergencyModel {
    /// Class-1 (emergency) probability, averaged over the trees.
    pub fn probability(&self, humidity: f64, ph: f64, temperature: Option<f64>) -> f64 {
        // ---
        let sample = self.sample(humidity, ph, temperature);
        let total: f64 = self.forest.iter().map(|t| t.predict(&sample)).sum();
        total / self.forest.len() as f64
    }

    /// Binary prediction: emergency when the probability exceeds one half.
    pub fn predict(&self, humidity: f64, ph: f64, temperature: Option<f64>) -> bool {
        self.probability(humidity, ph, temperature) > 0.5
    }

    pub fn risk(&self, humidity: f64, ph: f64, temperature: Option<f64>) -> RiskLevel {
        RiskLevel::from_probability(self.probability(humidity, ph, temperature))
    }

    pub fn accuracy(&self) -> f64 {
        self.report.accuracy
    }

    pub fn report(&self) -> &ClassifierReport {
        &self.report
    }

    fn sample(&self, humidity: f64, ph: f64, temperature: Option<f64>) -> Sample {
        // ---
        let pick = |v: Option<f64>, i: usize| v.filter(|x| x.is_finite()).unwrap_or(self.feature_means[i]);
        [
            pick(Some(humidity), 0),
            pick(Some(ph), 1),
            pick(temperature, 2),
        ]
    }
}

/// Train the emergency classifier on `readings`.
///
/// Fails with [`AnalyticsError::InsufficientData`] below ten readings and
/// with [`AnalyticsError::SingleClass`] when every reading has the same
/// label. Both checks happen before any split is attempted.
pub fn train(
    readings: &[Reading],
    thresholds: &Thresholds,
    settings: &ClassifierSettings,
) -> Result<EmergencyModel, AnalyticsError> {
    // ---
    if readings.len() < MIN_TRAINING_READINGS {
        return Err(AnalyticsError::InsufficientData {
            step: "emergency classifier",
            needed: MIN_TRAINING_READINGS,
            found: readings.len(),
        });
    }

    let labels: Vec<bool> = readings
        .iter()
        .map(|r| is_emergency(r.humidity, r.ph, thresholds))
        .collect();
    if labels.iter().all(|&l| l == labels[0]) {
        return Err(AnalyticsError::SingleClass(readings.len()));
    }

    let feature_means = feature_means(readings);
    let samples: Vec<Sample> = readings
        .iter()
        .map(|r| {
            let mut s = [0.0; 3];
            for (i, column) in FEATURES.iter().enumerate() {
                s[i] = column.value(r).unwrap_or(feature_means[i]);
            }
            s
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let (train_idx, test_idx, stratified) =
        match stratified_split(&labels, settings.test_fraction, &mut rng) {
            Some((train, test)) => (train, test, true),
            None => {
                tracing::debug!("Stratified split infeasible, using a plain random split");
                let (train, test) = random_split(labels.len(), settings.test_fraction, &mut rng);
                (train, test, false)
            }
        };

    let train_x: Vec<Sample> = train_idx.iter().map(|&i| samples[i]).collect();
    let train_y: Vec<bool> = train_idx.iter().map(|&i| labels[i]).collect();

    let (forest, importances) = fit_forest(&train_x, &train_y, settings, &mut rng);

    let correct = test_idx
        .iter()
        .filter(|&&i| {
            let p: f64 = forest.iter().map(|t| t.predict(&samples[i])).sum::<f64>()
                / forest.len() as f64;
            (p > 0.5) == labels[i]
        })
        .count();
    let accuracy = correct as f64 / test_idx.len() as f64;

    let mut feature_importances: Vec<FeatureImportance> = FEATURES
        .iter()
        .zip(importances)
        .map(|(&feature, importance)| FeatureImportance {
            feature,
            importance,
        })
        .collect();
    feature_importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    tracing::info!(
        "Emergency classifier trained: accuracy {:.1}% on {} test readings",
        accuracy * 100.0,
        test_idx.len()
    );

    Ok(EmergencyModel {
        forest,
        feature_means,
        report: ClassifierReport {
            accuracy,
            train_size: train_idx.len(),
            test_size: test_idx.len(),
            stratified,
            n_trees: settings.n_trees,
            feature_importances,
        },
    })
}

fn feature_means(readings: &[Reading]) -> Sample {
    // ---
    let mut means = [0.0; 3];
    for (i, column) in FEATURES.iter().enumerate() {
        let values = column_values(readings, *column);
        if !values.is_empty() {
            means[i] = mean(&values);
        }
    }
    means
}

/// Number of test samples: `ceil(fraction * n)`, leaving at least one for training.
fn held_out_count(n: usize, test_fraction: f64) -> usize {
    ((test_fraction * n as f64).ceil() as usize).clamp(1, n.saturating_sub(1).max(1))
}

/// Split preserving class proportions.
///
/// A class may receive no test members when its share rounds to zero.
/// `None` when a class has fewer than two members, when either side is
/// smaller than the number of classes, or when a class would be left out of
/// training entirely.
fn stratified_split(
    labels: &[bool],
    test_fraction: f64,
    rng: &mut StdRng,
) -> Option<(Vec<usize>, Vec<usize>)> {
    // ---
    let n = labels.len();
    let n_test = held_out_count(n, test_fraction);

    let mut classes: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &l) in labels.iter().enumerate() {
        classes[usize::from(l)].push(i);
    }
    if classes.iter().any(|c| c.len() < 2) || n_test < classes.len() || n - n_test < classes.len() {
        return None;
    }

    // floor allocation, remainder to the largest fractional parts
    let exact: Vec<f64> = classes
        .iter()
        .map(|c| n_test as f64 * c.len() as f64 / n as f64)
        .collect();
    let mut alloc: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let mut order: Vec<usize> = (0..classes.len()).collect();
    order.sort_by(|&a, &b| (exact[b] - exact[b].floor()).total_cmp(&(exact[a] - exact[a].floor())));
    let mut remaining = n_test - alloc.iter().sum::<usize>();
    for &c in order.iter().cycle() {
        if remaining == 0 {
            break;
        }
        alloc[c] += 1;
        remaining -= 1;
    }

    if classes
        .iter()
        .zip(&alloc)
        .any(|(members, &k)| k >= members.len())
    {
        return None;
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for (members, &k) in classes.iter_mut().zip(&alloc) {
        members.shuffle(rng);
        test.extend_from_slice(&members[..k]);
        train.extend_from_slice(&members[k..]);
    }
    train.shuffle(rng);
    test.shuffle(rng);
    Some((train, test))
}

fn random_split(n: usize, test_fraction: f64, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    // ---
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(rng);
    let n_test = held_out_count(n, test_fraction);
    let train = idx.split_off(n_test);
    (train, idx)
}

/// Fit `n_trees` trees on bootstrap samples; returns the forest and the
/// normalized mean impurity-decrease importances.
fn fit_forest(
    x: &[Sample],
    y: &[bool],
    settings: &ClassifierSettings,
    rng: &mut StdRng,
) -> (Vec<Tree>, [f64; 3]) {
    // ---
    // balanced class weights: n / (classes * count)
    let positives = y.iter().filter(|&&l| l).count();
    let negatives = y.len() - positives;
    let weight = |count: usize| {
        if count == 0 {
            0.0
        } else {
            y.len() as f64 / (2.0 * count as f64)
        }
    };
    let class_weight = [weight(negatives), weight(positives)];
    let max_features = ((FEATURES.len() as f64).sqrt() as usize).max(1);

    let mut forest = Vec::with_capacity(settings.n_trees);
    let mut importances = [0.0; 3];

    for _ in 0..settings.n_trees {
        let bootstrap: Vec<usize> = (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect();

        let mut builder = TreeBuilder {
            x,
            y,
            class_weight,
            min_leaf: settings.min_leaf.max(1),
            max_features,
            rng: &mut *rng,
            nodes: Vec::new(),
            importances: [0.0; 3],
        };
        builder.build(bootstrap, 0);

        let total: f64 = builder.importances.iter().sum();
        if total > 0.0 {
            for (acc, imp) in importances.iter_mut().zip(builder.importances) {
                *acc += imp / total;
            }
        }
        forest.push(Tree {
            nodes: builder.nodes,
        });
    }

    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        for imp in importances.iter_mut() {
            *imp /= total;
        }
    }
    (forest, importances)
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        /// Weighted fraction of emergency samples.
        p_emergency: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART tree stored as a flat node array; node 0 is the root.
#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, sample: &Sample) -> f64 {
        // ---
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf { p_emergency } => return *p_emergency,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if sample[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a [Sample],
    y: &'a [bool],
    class_weight: [f64; 2],
    min_leaf: usize,
    max_features: usize,
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
    importances: [f64; 3],
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

impl TreeBuilder<'_> {
    /// Weighted (total, emergency) mass of `idx`.
    fn mass(&self, idx: &[usize]) -> (f64, f64) {
        // ---
        idx.iter().fold((0.0, 0.0), |(w, w1), &i| {
            let cw = self.class_weight[usize::from(self.y[i])];
            (w + cw, if self.y[i] { w1 + cw } else { w1 })
        })
    }

    /// Build the subtree for `idx`, returning its node index.
    fn build(&mut self, idx: Vec<usize>, depth: usize) -> usize {
        // ---
        let node_index = self.nodes.len();
        let (w, w1) = self.mass(&idx);
        let p = if w > 0.0 { w1 / w } else { 0.0 };
        self.nodes.push(Node::Leaf { p_emergency: p });

        let pure = p == 0.0 || p == 1.0;
        if pure || depth >= MAX_DEPTH || idx.len() < 2 * self.min_leaf {
            return node_index;
        }

        let Some(best) = self.best_split(&idx, w, gini(w, w1)) else {
            return node_index;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .iter()
            .partition(|&&i| self.x[i][best.feature] <= best.threshold);

        self.importances[best.feature] += best.decrease;

        let left = self.build(left_idx, depth + 1);
        let right = self.build(right_idx, depth + 1);
        self.nodes[node_index] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_index
    }

    /// Best Gini split over a random subset of `max_features` non-constant
    /// features; `None` when no split satisfies `min_leaf` and improves impurity.
    fn best_split(&mut self, idx: &[usize], w: f64, parent_gini: f64) -> Option<BestSplit> {
        // ---
        let mut features: Vec<usize> = (0..FEATURES.len()).collect();
        features.shuffle(&mut *self.rng);

        let mut best: Option<BestSplit> = None;
        let mut visited = 0;

        for f in features {
            if visited >= self.max_features && best.is_some() {
                break;
            }

            let mut sorted: Vec<usize> = idx.to_vec();
            sorted.sort_by(|&a, &b| self.x[a][f].total_cmp(&self.x[b][f]));
            let first = self.x[sorted[0]][f];
            let last = self.x[sorted[sorted.len() - 1]][f];
            if first == last {
                continue;
            }
            visited += 1;

            let (mut wl, mut wl1) = (0.0, 0.0);
            let (_, w1) = self.mass(&sorted);
            for pos in 0..sorted.len() - 1 {
                let i = sorted[pos];
                let cw = self.class_weight[usize::from(self.y[i])];
                wl += cw;
                if self.y[i] {
                    wl1 += cw;
                }

                let left_n = pos + 1;
                let right_n = sorted.len() - left_n;
                if left_n < self.min_leaf || right_n < self.min_leaf {
                    continue;
                }
                let here = self.x[i][f];
                let next = self.x[sorted[pos + 1]][f];
                if here == next {
                    continue;
                }

                let wr = w - wl;
                let wr1 = w1 - wl1;
                let child = wl * gini(wl, wl1) + wr * gini(wr, wr1);
                let decrease = w * parent_gini - child;

                if decrease > 1e-12 && best.as_ref().map_or(true, |b| decrease > b.decrease) {
                    best = Some(BestSplit {
                        feature: f,
                        threshold: here + (next - here) / 2.0,
                        decrease,
                    });
                }
            }
        }
        best
    }
}

/// Weighted Gini impurity of a two-class node.
fn gini(w: f64, w1: f64) -> f64 {
    // ---
    if w <= 0.0 {
        return 0.0;
    }
    let p = w1 / w;
    2.0 * p * (1.0 - p)
}
