//! Persistence adapter: labeled dataset, aggregated documents, model artifact.
//!
//! Every artifact is first written to a sibling `.tmp` path as a [`Staged`]
//! file and only renamed into place by [`Staged::commit`]. A staged file that
//! is dropped without being committed is removed, so a run that fails after
//! staging some of its outputs leaves none of them behind.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use convo_topics_core::engine::TopicModel;
use convo_topics_core::models::{Document, LabeledDocument};

use crate::records::{COL_GROUP, COL_PERIOD, COL_SEQUENCE, COL_SESSION};

pub const COL_TEXT: &str = "combined_text";
pub const COL_TOPIC: &str = "Topic";
const PROB_PREFIX: &str = "prob_";

/// A fully written artifact waiting at its temporary path.
#[derive(Debug)]
#[must_use = "a staged file is deleted unless committed"]
pub struct Staged {
    tmp: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl Staged {
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Move the staged file to its destination.
    pub fn commit(mut self) -> Result<()> {
        std::fs::rename(&self.tmp, &self.dest).with_context(|| {
            format!(
                "Failed to move {} into place at {}",
                self.tmp.display(),
                self.dest.display()
            )
        })?;
        self.committed = true;
        tracing::info!(path = %self.dest.display(), "wrote artifact");
        Ok(())
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.tmp);
        }
    }
}

/// Stage one row per labeled document.
///
/// Columns are `sessionid, group, period, N, combined_text, Topic`, followed
/// by `prob_0 .. prob_{k-1}` when `include_probabilities` is set. Documents
/// without a distribution get empty probability cells.
pub fn stage_labeled_csv(
    path: &Path,
    labeled: &[LabeledDocument],
    topic_count: usize,
    include_probabilities: bool,
) -> Result<Staged> {
    let mut header: Vec<String> = base_header().iter().map(|s| s.to_string()).collect();
    header.push(COL_TOPIC.to_string());
    if include_probabilities {
        header.extend((0..topic_count).map(|i| format!("{}{}", PROB_PREFIX, i)));
    }

    let staged = stage(path, |w| {
        let mut csv = csv::Writer::from_writer(w);
        csv.write_record(&header)?;
        for row in labeled {
            let mut fields = document_fields(&row.document);
            fields.push(row.topic.to_string());
            if include_probabilities {
                match &row.probabilities {
                    Some(p) => fields.extend(
                        (0..topic_count).map(|i| p.get(i).map(|v| v.to_string()).unwrap_or_default()),
                    ),
                    None => fields.extend(std::iter::repeat(String::new()).take(topic_count)),
                }
            }
            csv.write_record(&fields)?;
        }
        csv.flush()?;
        Ok(())
    })
    .with_context(|| format!("Failed to write labeled dataset: {}", path.display()))?;

    tracing::debug!(path = %path.display(), rows = labeled.len(), "staged labeled dataset");
    Ok(staged)
}

/// Write one row per labeled document; see [`stage_labeled_csv`].
pub fn write_labeled_csv(
    path: &Path,
    labeled: &[LabeledDocument],
    topic_count: usize,
    include_probabilities: bool,
) -> Result<()> {
    stage_labeled_csv(path, labeled, topic_count, include_probabilities)?.commit()
}

/// Write aggregated documents without topics.
pub fn write_documents_csv(path: &Path, documents: &[Document]) -> Result<()> {
    let staged = stage(path, |w| {
        let mut csv = csv::Writer::from_writer(w);
        csv.write_record(base_header())?;
        for doc in documents {
            csv.write_record(document_fields(doc))?;
        }
        csv.flush()?;
        Ok(())
    })
    .with_context(|| format!("Failed to write documents: {}", path.display()))?;

    tracing::debug!(path = %path.display(), rows = documents.len(), "staged aggregated documents");
    staged.commit()
}

/// Stage the serialized topic model.
pub fn stage_model(path: &Path, model: &TopicModel) -> Result<Staged> {
    let bytes = model.serialize()?;
    let staged = stage(path, |w| {
        w.write_all(&bytes)?;
        Ok(())
    })
    .with_context(|| format!("Failed to write topic model: {}", path.display()))?;

    tracing::debug!(path = %path.display(), topics = model.topic_count(), "staged topic model");
    Ok(staged)
}

/// Serialize the topic model to `path`.
pub fn write_model(path: &Path, model: &TopicModel) -> Result<()> {
    stage_model(path, model)?.commit()
}

/// Load a model written by [`write_model`].
pub fn read_model(path: &Path) -> Result<TopicModel> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read topic model: {}", path.display()))?;
    TopicModel::load(&bytes).with_context(|| format!("Invalid topic model: {}", path.display()))
}

fn base_header() -> [&'static str; 5] {
    [COL_SESSION, COL_GROUP, COL_PERIOD, COL_SEQUENCE, COL_TEXT]
}

fn document_fields(doc: &Document) -> Vec<String> {
    vec![
        doc.key.session_id.clone(),
        doc.key.group.clone(),
        doc.key.period.clone(),
        doc.sequence.clone().unwrap_or_default(),
        doc.text.clone(),
    ]
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn stage<F>(path: &Path, write: F) -> Result<Staged>
where
    F: FnOnce(&mut std::io::BufWriter<std::fs::File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let staged = Staged {
        tmp: temp_path(path),
        dest: path.to_path_buf(),
        committed: false,
    };
    let file = std::fs::File::create(&staged.tmp)?;
    let mut writer = std::io::BufWriter::new(file);
    write(&mut writer)?;
    writer.flush()?;
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_topics_core::models::DocumentKey;
    use tempfile::TempDir;

    fn doc(session: &str, n: Option<&str>, text: &str) -> Document {
        Document {
            key: DocumentKey {
                session_id: session.into(),
                group: "g1".into(),
                period: "p1".into(),
            },
            sequence: n.map(str::to_string),
            text: text.into(),
        }
    }

    #[test]
    fn labeled_csv_has_expected_columns() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/out.csv");
        let labeled = vec![
            LabeledDocument {
                document: doc("s1", Some("1"), "hello, world"),
                topic: 0,
                probabilities: Some(vec![0.75, 0.25]),
            },
            LabeledDocument {
                document: doc("s2", None, "bye"),
                topic: -1,
                probabilities: None,
            },
        ];

        write_labeled_csv(&path, &labeled, 2, true).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(
            header,
            vec!["sessionid", "group", "period", "N", "combined_text", "Topic", "prob_0", "prob_1"]
        );
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][4], "hello, world");
        assert_eq!(&rows[0][5], "0");
        assert_eq!(&rows[0][6], "0.75");
        assert_eq!(&rows[1][3], "");
        assert_eq!(&rows[1][5], "-1");
        assert_eq!(&rows[1][7], "");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn labeled_csv_without_probabilities() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.csv");
        let labeled = vec![LabeledDocument {
            document: doc("s1", Some("r3"), "x"),
            topic: 2,
            probabilities: Some(vec![0.1, 0.2, 0.7]),
        }];

        write_labeled_csv(&path, &labeled, 3, false).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "sessionid,group,period,N,combined_text,Topic\ns1,g1,p1,r3,x,2\n"
        );
    }

    #[test]
    fn documents_csv_round_trips_through_reader() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("docs.csv");
        write_documents_csv(&path, &[doc("s1", Some("1"), "a \"quoted\" line")]).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let row = rdr.records().next().unwrap().unwrap();
        assert_eq!(&row[4], "a \"quoted\" line");
    }

    #[test]
    fn uncommitted_stage_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.csv");
        let staged = stage_labeled_csv(&path, &[], 0, false).unwrap();
        assert!(temp_path(&path).exists());
        assert!(!path.exists());

        drop(staged);
        assert!(!temp_path(&path).exists());
        assert!(!path.exists());
    }

    #[test]
    fn staging_under_a_regular_file_fails() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        assert!(stage_labeled_csv(&blocker.join("out.csv"), &[], 0, false).is_err());
    }

    #[test]
    fn read_model_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(read_model(&path).is_err());
    }
}
