//! Dominant-group detection over raw element records.
//!
//! Two elements are structurally similar when they share tag, effective role
//! and ancestry signature, and their normalized class sets overlap by at
//! least `min_class_overlap` (Jaccard). Normalization strips generated
//! suffixes and digits so `card-3` and `card-17` compare equal.

use crate::core::dom::GroupingStrategy;
use crate::dom::element::RawElementRecord;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

static GENERATED_SUFFIX: OnceLock<Option<Regex>> = OnceLock::new();

/// Lowercased class token with generated suffixes and digits removed.
pub fn normalize_class(token: &str) -> String {
    let suffix = GENERATED_SUFFIX
        .get_or_init(|| Regex::new(r"^(.+?)[-_]+[a-z0-9]*[0-9][a-z0-9]*$").ok());

    let lower = token.to_ascii_lowercase();
    let stem = suffix
        .as_ref()
        .and_then(|re| re.captures(&lower))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| lower.clone());
    stem.chars()
        .filter(|c| !c.is_ascii_digit())
        .collect::<String>()
        .trim_matches(|c| c == '-' || c == '_')
        .to_string()
}

fn class_set(record: &RawElementRecord) -> BTreeSet<String> {
    record
        .attributes
        .class
        .as_deref()
        .unwrap_or("")
        .split_whitespace()
        .map(normalize_class)
        .filter(|c| !c.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct Fingerprint {
    tag: String,
    role: String,
    parent: String,
    classes: BTreeSet<String>,
}

impl Fingerprint {
    fn of(record: &RawElementRecord) -> Self {
        Self {
            tag: record.tag.clone(),
            role: record.effective_role(),
            parent: record.parent_signature.clone(),
            classes: class_set(record),
        }
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count() as f64;
    let total = a.union(b).count() as f64;
    shared / total
}

#[derive(Debug, Clone)]
pub struct FingerprintGrouping {
    pub min_class_overlap: f64,
    pub min_group_size: usize,
}

impl Default for FingerprintGrouping {
    fn default() -> Self {
        Self {
            min_class_overlap: 0.5,
            min_group_size: 3,
        }
    }
}

impl FingerprintGrouping {
    fn similar(&self, a: &Fingerprint, b: &Fingerprint) -> bool {
        a.tag == b.tag
            && a.role == b.role
            && a.parent == b.parent
            && jaccard(&a.classes, &b.classes) >= self.min_class_overlap
    }
}

impl GroupingStrategy for FingerprintGrouping {
    fn dominant_group(&self, elements: &[RawElementRecord]) -> Vec<bool> {
        let fingerprints: Vec<Fingerprint> = elements.iter().map(Fingerprint::of).collect();

        // Greedy clustering in input order against each cluster's first member.
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for (index, fingerprint) in fingerprints.iter().enumerate() {
            match clusters
                .iter_mut()
                .find(|members| self.similar(&fingerprints[members[0]], fingerprint))
            {
                Some(members) => members.push(index),
                None => clusters.push(vec![index]),
            }
        }

        // Largest cluster wins, then the one with more interactive members,
        // then the earliest.
        let weight = |members: &Vec<usize>| {
            let interactive = members
                .iter()
                .filter(|i| elements[**i].is_interactive())
                .count();
            (members.len(), interactive)
        };
        let mut flags = vec![false; elements.len()];
        let mut best: Option<(&Vec<usize>, (usize, usize))> = None;
        for cluster in &clusters {
            let score = weight(cluster);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((cluster, score));
            }
        }
        let best = best.map(|(members, _)| members);
        if let Some(members) = best.filter(|m| m.len() >= self.min_group_size) {
            for index in members {
                flags[*index] = true;
            }
        }
        flags
    }
}
