use std::path::Path;

use anyhow::{Context, Result};
use core_types::{CorpusRecord, TrainingCorpus};
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Reads one JSON document.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("decode {}", path.display()))
}

/// Reads one JSON value per line. Blank lines are skipped.
pub async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)
        .await
        .with_context(|| format!("open {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut out = Vec::new();
    let mut line_no = 0_usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(&line)
            .with_context(|| format!("decode {} line {line_no}", path.display()))?;
        out.push(value);
    }
    Ok(out)
}

pub async fn read_corpus(path: &Path) -> Result<TrainingCorpus> {
    let records = read_jsonl::<CorpusRecord>(path).await?;
    tracing::info!(path = %path.display(), records = records.len(), "corpus loaded");
    Ok(TrainingCorpus::new(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{ProductCategory, TestPhase};

    #[tokio::test]
    async fn corpus_lines_decode_and_blank_lines_are_skipped() {
        let path = std::env::temp_dir().join(format!("corpus-{}.jsonl", uuid::Uuid::new_v4()));
        let body = concat!(
            r#"{"hook_type":"question","emotion":"curiosity","pacing":"fast","creative_type":"video","product_category":"fitness","test_phase":"micro_test","final_cvr":0.04}"#,
            "\n\n",
            r#"{"hook_type":"before_after","emotion":"achievement","pacing":"medium","creative_type":"ugc","product_category":"finance","test_phase":"scale_test","final_cvr":0.11}"#,
            "\n",
        );
        tokio::fs::write(&path, body).await.expect("write");

        let corpus = read_corpus(&path).await.expect("read");
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.records[0].attributes.product_category, ProductCategory::Fitness);
        assert_eq!(corpus.records[1].attributes.test_phase, TestPhase::ScaleTest);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn bad_line_reports_its_number() {
        let path = std::env::temp_dir().join(format!("corpus-{}.jsonl", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "{\"final_cvr\": 0.1}\n").await.expect("write");
        let err = read_corpus(&path).await.expect_err("missing attributes");
        assert!(format!("{err:#}").contains("line 1"));
        let _ = tokio::fs::remove_file(&path).await;
    }
}
