//! Class-based TF-IDF keyword extraction.
//!
//! All documents of one topic are treated as a single class document.
//! Term weight for term `t` in class `c`:
//!
//! ```text
//! w(t, c) = tf(t, c) / |c| * ln(1 + A / f(t))
//! ```
//!
//! where `|c|` is the token count of the class, `A` the average token count
//! per class, and `f(t)` the frequency of `t` over all classes.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::TopicId;
use crate::text::tokenize;

/// A representative term of a topic and its c-TF-IDF weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    pub weight: f32,
}

/// Top `top_n` keywords for every topic label present in `labels`.
///
/// `docs` and `labels` are aligned by position. Ties in weight are broken
/// by term so the output is deterministic.
pub fn topic_keywords(
    docs: &[String],
    labels: &[TopicId],
    top_n: usize,
    stop_words: bool,
) -> BTreeMap<TopicId, Vec<Keyword>> {
    let mut class_counts: BTreeMap<TopicId, HashMap<String, usize>> = BTreeMap::new();
    for (doc, label) in docs.iter().zip(labels.iter()) {
        let counts = class_counts.entry(*label).or_default();
        for token in tokenize(doc, stop_words) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    let mut total_freq: HashMap<&str, usize> = HashMap::new();
    let mut class_sizes: BTreeMap<TopicId, usize> = BTreeMap::new();
    for (label, counts) in &class_counts {
        let mut size = 0;
        for (term, count) in counts {
            *total_freq.entry(term.as_str()).or_insert(0) += count;
            size += count;
        }
        class_sizes.insert(*label, size);
    }

    let average = if class_sizes.is_empty() {
        0.0
    } else {
        class_sizes.values().sum::<usize>() as f32 / class_sizes.len() as f32
    };

    class_counts
        .iter()
        .map(|(label, counts)| {
            let size = class_sizes.get(label).copied().unwrap_or(0).max(1) as f32;
            let mut scored: Vec<Keyword> = counts
                .iter()
                .map(|(term, count)| {
                    let freq = total_freq.get(term.as_str()).copied().unwrap_or(1) as f32;
                    Keyword {
                        term: term.clone(),
                        weight: (*count as f32 / size) * (1.0 + average / freq).ln(),
                    }
                })
                .collect();
            scored.sort_by(|a, b| {
                b.weight
                    .total_cmp(&a.weight)
                    .then_with(|| a.term.cmp(&b.term))
            });
            scored.truncate(top_n);
            (*label, scored)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OUTLIER_TOPIC;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn distinctive_terms_rank_first() {
        let docs = docs(&[
            "coffee espresso coffee beans",
            "coffee espresso grinder",
            "football match goal",
            "football goal referee",
        ]);
        let kw = topic_keywords(&docs, &[0, 0, 1, 1], 3, true);
        assert_eq!(kw[&0][0].term, "coffee");
        assert_eq!(kw[&1][0].term, "football");
        assert!(kw[&0].iter().all(|k| k.term != "football"));
        assert_eq!(kw[&0].len(), 3);
    }

    #[test]
    fn outlier_class_gets_keywords_too() {
        let docs = docs(&["coffee beans", "coffee roast", "weather rain"]);
        let kw = topic_keywords(&docs, &[0, 0, OUTLIER_TOPIC], 5, true);
        assert_eq!(kw.len(), 2);
        assert_eq!(kw[&OUTLIER_TOPIC][0].term, "rain");
    }

    #[test]
    fn shared_terms_weigh_less_than_exclusive_terms() {
        let docs = docs(&["shared alpha", "shared beta"]);
        let kw = topic_keywords(&docs, &[0, 1], 2, false);
        let alpha = kw[&0].iter().find(|k| k.term == "alpha").unwrap().weight;
        let shared = kw[&0].iter().find(|k| k.term == "shared").unwrap().weight;
        assert!(alpha > shared);
    }

    #[test]
    fn stop_words_are_excluded_when_requested() {
        let docs = docs(&["the the the coffee"]);
        let kw = topic_keywords(&docs, &[0], 10, true);
        assert_eq!(kw[&0].len(), 1);
        assert_eq!(kw[&0][0].term, "coffee");
    }
}
