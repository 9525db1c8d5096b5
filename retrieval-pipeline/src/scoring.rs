use std::{cmp::Ordering, collections::HashMap};

use common::storage::types::StoredObject;

/// Holds optional subscores gathered from different retrieval signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scores {
    pub vector: Option<f32>,
    pub lexical: Option<f32>,
}

/// Generic wrapper combining an item with its accumulated retrieval scores.
#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub item: T,
    pub scores: Scores,
    pub fused: f32,
}

impl<T> Scored<T> {
    pub fn new(item: T) -> Self {
        Self {
            item,
            scores: Scores::default(),
            fused: 0.0,
        }
    }

    pub const fn with_vector_score(mut self, score: f32) -> Self {
        self.scores.vector = Some(score);
        self
    }

    pub const fn with_lexical_score(mut self, score: f32) -> Self {
        self.scores.lexical = Some(score);
        self
    }

    pub const fn update_fused(&mut self, fused: f32) {
        self.fused = fused;
    }
}

/// Weights used for linear score fusion.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub vector: f32,
    pub lexical: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 1.0,
            lexical: 0.1,
        }
    }
}

pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

pub fn fuse_scores(scores: &Scores, weights: FusionWeights) -> f32 {
    let vector = scores.vector.unwrap_or(0.0);
    let lexical = scores.lexical.unwrap_or(0.0);
    clamp_unit(lexical.mul_add(weights.lexical, vector * weights.vector))
}

/// Merges `incoming` into `target` by record id, keeping the best score per signal.
pub fn merge_scored_by_id<T>(target: &mut HashMap<String, Scored<T>>, incoming: Vec<Scored<T>>)
where
    T: StoredObject,
{
    for scored in incoming {
        match target.get_mut(scored.item.get_id()) {
            Some(existing) => {
                existing.scores.vector = max_score(existing.scores.vector, scored.scores.vector);
                existing.scores.lexical = max_score(existing.scores.lexical, scored.scores.lexical);
                existing.fused = existing.fused.max(scored.fused);
            }
            None => {
                target.insert(scored.item.get_id().to_owned(), scored);
            }
        }
    }
}

fn max_score(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

pub fn sort_by_fused_desc<T>(items: &mut [Scored<T>])
where
    T: StoredObject,
{
    items.sort_by(|a, b| {
        b.fused
            .partial_cmp(&a.fused)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.item.get_id().cmp(b.item.get_id()))
    });
}

pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        let term = raw.trim().to_lowercase();
        if term.chars().count() >= 3 {
            terms.push(term);
        }
    }
    terms.sort();
    terms.dedup();
    terms
}

pub fn lexical_overlap_score(terms: &[String], haystack: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let lower = haystack.to_lowercase();
    let matches = terms.iter().filter(|term| lower.contains(term.as_str())).count();
    (matches as f32) / (terms.len() as f32)
}
