//! Grouping of raw message rows into documents.
//!
//! Rows are grouped by `(session_id, group, period)`. Within a group,
//! messages are joined with a single space in input order; absent messages
//! contribute an empty string. Groups are emitted in order of first
//! appearance, and groups whose joined text is blank after trimming are
//! dropped before they can reach a topic engine.
//!
//! When rows of one group disagree on `N`, the surviving value is chosen by
//! an explicit [`SequencePolicy`].

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::models::{Document, DocumentKey, RawRecord};

/// Which row's `N` value a document carries when its rows disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequencePolicy {
    /// The first row of the group in input order.
    #[default]
    First,
    /// The last row of the group in input order.
    Last,
    /// Smallest present value; absent values are ignored.
    Min,
    /// Largest present value; absent values are ignored.
    Max,
}

impl SequencePolicy {
    fn pick(self, values: &[Option<String>]) -> Option<String> {
        match self {
            SequencePolicy::First => values.first().cloned().flatten(),
            SequencePolicy::Last => values.last().cloned().flatten(),
            SequencePolicy::Min => values
                .iter()
                .flatten()
                .min_by(|a, b| compare_sequence(a, b))
                .cloned(),
            SequencePolicy::Max => values
                .iter()
                .flatten()
                .max_by(|a, b| compare_sequence(a, b))
                .cloned(),
        }
    }
}

/// Order used by [`SequencePolicy::Min`] and [`SequencePolicy::Max`].
///
/// Values that parse as finite numbers compare numerically and sort before
/// non-numeric values; non-numeric values compare as text.
pub fn compare_sequence(a: &str, b: &str) -> Ordering {
    let numeric = |v: &str| v.trim().parse::<f64>().ok().filter(|f| f.is_finite());
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Output of [`aggregate_with`], with counters for diagnostics.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub documents: Vec<Document>,
    /// Distinct keys seen, before the blank-text filter.
    pub groups: usize,
    /// Groups removed because their text was blank.
    pub dropped_blank: usize,
    /// Groups whose rows carried more than one distinct `N`.
    pub sequence_conflicts: usize,
}

struct Group {
    key: DocumentKey,
    parts: Vec<String>,
    sequences: Vec<Option<String>>,
}

/// Aggregate rows into documents using [`SequencePolicy::First`].
pub fn aggregate(records: &[RawRecord]) -> Result<Vec<Document>> {
    Ok(aggregate_with(records, SequencePolicy::default())?.documents)
}

/// Aggregate rows into documents with an explicit sequence policy.
///
/// # Errors
///
/// [`PipelineError::InvalidInput`] if any row lacks `session_id`, `group`,
/// or `period`, or carries an empty string for one. Non-empty key values,
/// including whitespace-only ones, are used verbatim. No documents are
/// returned on error.
pub fn aggregate_with(records: &[RawRecord], policy: SequencePolicy) -> Result<Aggregation> {
    let mut index: HashMap<DocumentKey, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let row = i + 1;
        let key = DocumentKey {
            session_id: required(row, "sessionid", record.session_id.as_deref())?,
            group: required(row, "group", record.group.as_deref())?,
            period: required(row, "period", record.period.as_deref())?,
        };
        let message = record.message.clone().unwrap_or_default();

        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(Group {
                key,
                parts: Vec::new(),
                sequences: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].parts.push(message);
        groups[slot].sequences.push(record.sequence.clone());
    }

    let total = groups.len();
    let mut sequence_conflicts = 0;
    let mut documents = Vec::with_capacity(total);

    for group in groups {
        if has_conflict(&group.sequences) {
            sequence_conflicts += 1;
            tracing::debug!(
                session = %group.key.session_id,
                group = %group.key.group,
                period = %group.key.period,
                ?policy,
                "rows disagree on N"
            );
        }
        let text = group.parts.join(" ");
        if text.trim().is_empty() {
            continue;
        }
        documents.push(Document {
            sequence: policy.pick(&group.sequences),
            key: group.key,
            text,
        });
    }

    Ok(Aggregation {
        groups: total,
        dropped_blank: total - documents.len(),
        sequence_conflicts,
        documents,
    })
}

fn required(row: usize, field: &str, value: Option<&str>) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(PipelineError::InvalidInput {
            row,
            reason: format!("missing required field `{}`", field),
        }),
    }
}

fn has_conflict(values: &[Option<String>]) -> bool {
    values.iter().skip(1).any(|v| *v != values[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(s: &str, g: &str, p: &str, n: i64, msg: Option<&str>) -> RawRecord {
        RawRecord::new(s, g, p, Some(&n.to_string()), msg)
    }

    #[test]
    fn joins_left_to_right() {
        let docs = aggregate(&[
            rec("s1", "g1", "p1", 1, Some("a")),
            rec("s1", "g1", "p1", 2, Some("b")),
        ])
        .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "a b");
    }

    #[test]
    fn end_to_end_scenario_drops_blank_group() {
        let agg = aggregate_with(
            &[
                rec("s1", "g1", "p1", 1, Some("hi")),
                rec("s1", "g1", "p1", 2, Some("there")),
                rec("s2", "g1", "p1", 1, Some("")),
            ],
            SequencePolicy::First,
        )
        .unwrap();
        assert_eq!(agg.groups, 2);
        assert_eq!(agg.dropped_blank, 1);
        assert_eq!(agg.documents.len(), 1);
        let doc = &agg.documents[0];
        assert_eq!(doc.key.session_id, "s1");
        assert_eq!(doc.text, "hi there");
    }

    #[test]
    fn missing_message_contributes_empty_string() {
        let docs = aggregate(&[
            rec("s1", "g1", "p1", 1, Some("hi")),
            rec("s1", "g1", "p1", 2, None),
            rec("s1", "g1", "p1", 3, Some("there")),
        ])
        .unwrap();
        assert_eq!(docs[0].text, "hi  there");
        assert!(!docs[0].text.contains("null"));
        assert!(!docs[0].text.contains("NaN"));
    }

    #[test]
    fn whitespace_only_group_is_dropped() {
        let docs = aggregate(&[
            rec("s1", "g1", "p1", 1, Some("   ")),
            rec("s1", "g1", "p1", 2, None),
            rec("s1", "g2", "p1", 1, Some("kept")),
        ])
        .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].key.group, "g2");
    }

    #[test]
    fn groups_are_emitted_in_first_appearance_order() {
        let docs = aggregate(&[
            rec("s2", "g1", "p1", 1, Some("x")),
            rec("s1", "g1", "p1", 1, Some("y")),
            rec("s2", "g1", "p1", 2, Some("z")),
        ])
        .unwrap();
        let sessions: Vec<_> = docs.iter().map(|d| d.key.session_id.as_str()).collect();
        assert_eq!(sessions, vec!["s2", "s1"]);
        assert_eq!(docs[0].text, "x z");
    }

    #[test]
    fn one_document_per_distinct_key() {
        let rows = vec![
            rec("s1", "g1", "1", 1, Some("a")),
            rec("s1", "g1", "2", 1, Some("b")),
            rec("s1", "g2", "1", 1, Some("c")),
            rec("s1", "g1", "1", 2, Some("d")),
            rec("s2", "g1", "1", 1, Some("e")),
        ];
        let docs = aggregate(&rows).unwrap();
        assert_eq!(docs.len(), 4);
        let keys: std::collections::HashSet<_> = docs.iter().map(|d| d.key.clone()).collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(docs[0].text, "a d");
    }

    #[test]
    fn aggregation_is_repeatable() {
        let rows = vec![
            rec("s1", "g1", "p1", 1, Some("hello")),
            rec("s1", "g1", "p1", 2, Some("world")),
            rec("s3", "g2", "p4", 1, Some("again")),
        ];
        let first = aggregate(&rows).unwrap();
        for _ in 0..5 {
            assert_eq!(aggregate(&rows).unwrap(), first);
        }
    }

    #[test]
    fn missing_key_field_is_rejected() {
        let mut bad = rec("s1", "g1", "p1", 1, Some("hi"));
        bad.period = None;
        let err = aggregate(&[rec("s1", "g1", "p1", 1, Some("ok")), bad]).unwrap_err();
        match err {
            PipelineError::InvalidInput { row, reason } => {
                assert_eq!(row, 2);
                assert!(reason.contains("period"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_key_field_is_rejected() {
        let mut bad = rec("s1", "g1", "p1", 1, Some("hi"));
        bad.session_id = Some(String::new());
        assert!(matches!(
            aggregate(&[bad]),
            Err(PipelineError::InvalidInput { row: 1, .. })
        ));
    }

    #[test]
    fn whitespace_key_is_kept_verbatim() {
        let mut row = rec("s1", "g1", "p1", 1, Some("hi"));
        row.group = Some("  ".into());
        let docs = aggregate(&[row, rec("s1", "g1", "p1", 2, Some("there"))]).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].key.group, "  ");
        assert_eq!(docs[0].text, "hi");
    }

    fn conflicting() -> Vec<RawRecord> {
        vec![
            rec("s1", "g1", "p1", 7, Some("a")),
            rec("s1", "g1", "p1", 3, Some("b")),
            rec("s1", "g1", "p1", 9, Some("c")),
            RawRecord::new("s1", "g1", "p1", None, Some("d")),
        ]
    }

    #[test]
    fn first_policy_keeps_first_row_value() {
        let agg = aggregate_with(&conflicting(), SequencePolicy::First).unwrap();
        assert_eq!(agg.documents[0].sequence.as_deref(), Some("7"));
        assert_eq!(agg.sequence_conflicts, 1);
    }

    #[test]
    fn last_policy_keeps_last_row_value() {
        let agg = aggregate_with(&conflicting(), SequencePolicy::Last).unwrap();
        assert_eq!(agg.documents[0].sequence, None);
    }

    #[test]
    fn min_and_max_policies_ignore_absent_values() {
        let min = aggregate_with(&conflicting(), SequencePolicy::Min).unwrap();
        let max = aggregate_with(&conflicting(), SequencePolicy::Max).unwrap();
        assert_eq!(min.documents[0].sequence.as_deref(), Some("3"));
        assert_eq!(max.documents[0].sequence.as_deref(), Some("9"));
    }

    #[test]
    fn min_and_max_compare_numbers_numerically() {
        let rows = vec![
            RawRecord::new("s1", "g1", "p1", Some("10"), Some("a")),
            RawRecord::new("s1", "g1", "p1", Some("9"), Some("b")),
            RawRecord::new("s1", "g1", "p1", Some("1.5"), Some("c")),
        ];
        let min = aggregate_with(&rows, SequencePolicy::Min).unwrap();
        let max = aggregate_with(&rows, SequencePolicy::Max).unwrap();
        assert_eq!(min.documents[0].sequence.as_deref(), Some("1.5"));
        assert_eq!(max.documents[0].sequence.as_deref(), Some("10"));
    }

    #[test]
    fn non_numeric_sequence_is_carried_through() {
        let rows = vec![
            RawRecord::new("s1", "g1", "p1", Some("r2"), Some("a")),
            RawRecord::new("s1", "g1", "p1", Some("3"), Some("b")),
        ];
        let first = aggregate_with(&rows, SequencePolicy::First).unwrap();
        assert_eq!(first.documents[0].sequence.as_deref(), Some("r2"));
        assert_eq!(first.sequence_conflicts, 1);

        let max = aggregate_with(&rows, SequencePolicy::Max).unwrap();
        assert_eq!(max.documents[0].sequence.as_deref(), Some("r2"));
        let min = aggregate_with(&rows, SequencePolicy::Min).unwrap();
        assert_eq!(min.documents[0].sequence.as_deref(), Some("3"));
    }

    #[test]
    fn sequence_order_is_total() {
        assert_eq!(compare_sequence("2", "10"), Ordering::Less);
        assert_eq!(compare_sequence("b", "a"), Ordering::Greater);
        assert_eq!(compare_sequence("1e30", "x"), Ordering::Less);
        assert_eq!(compare_sequence("7", "7"), Ordering::Equal);
    }

    #[test]
    fn policy_does_not_change_text() {
        let first = aggregate_with(&conflicting(), SequencePolicy::First).unwrap();
        let max = aggregate_with(&conflicting(), SequencePolicy::Max).unwrap();
        assert_eq!(first.documents[0].text, "a b c d");
        assert_eq!(first.documents[0].text, max.documents[0].text);
    }

    #[test]
    fn uniform_sequence_is_not_a_conflict() {
        let agg = aggregate_with(
            &[
                rec("s1", "g1", "p1", 4, Some("a")),
                rec("s1", "g1", "p1", 4, Some("b")),
            ],
            SequencePolicy::First,
        )
        .unwrap();
        assert_eq!(agg.sequence_conflicts, 0);
        assert_eq!(agg.documents[0].sequence.as_deref(), Some("4"));
    }

    #[test]
    fn policy_parses_from_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: SequencePolicy,
        }
        let w: Wrapper = serde_json::from_str(r#"{"policy":"max"}"#).unwrap();
        assert_eq!(w.policy, SequencePolicy::Max);
    }
}
