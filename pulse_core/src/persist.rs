use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::{fs, io::AsyncWriteExt};

use crate::{error::Result, model::SentimentEntry};

/// Asset symbol -> entry. One JSON document on disk.
pub type SentimentFile = BTreeMap<String, SentimentEntry>;

/// Read the persisted sentiment map. A missing file is an empty map.
pub fn load_sentiment_file(path: &Path) -> Result<SentimentFile> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(SentimentFile::new()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SentimentFile::new()),
        Err(e) => Err(e.into()),
    }
}

/// Rewrite the whole map via a temp file in the same directory, then rename over the target.
pub async fn write_sentiment_file(path: &Path, entries: &SentimentFile) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }
    let content = serde_json::to_vec_pretty(entries)?;
    let temp_path = temp_path_for(path);

    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(&content).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path).await {
        tracing::warn!("Cannot move {} over {}: {}", temp_path.display(), path.display(), e);
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

/// Load, insert one entry, write back. Used by one-shot refreshers that only own one asset.
pub async fn merge_sentiment_entry(path: &Path, asset: &str, entry: SentimentEntry) -> Result<SentimentFile> {
    let mut entries = load_sentiment_file(path)?;
    entries.insert(asset.to_uppercase(), entry);
    write_sentiment_file(path, &entries).await?;
    Ok(entries)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "sentiment".to_string());
    let nonce = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), nonce))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SentimentLabel;

    fn temp_file(name: &str) -> PathBuf {
        let nonce = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!("pulse-persist-{}-{}", nonce, name))
    }

    fn entry(label: SentimentLabel, confidence: u8) -> SentimentEntry {
        SentimentEntry {
            sentiment: label,
            confidence,
            risk_flag: label == SentimentLabel::Bearish,
            updated_at: 1_715_342_400_000,
            contrarian: confidence > 65,
            contrarian_note: (confidence > 65).then(|| "Extreme greed".to_string()),
            sample_size: Some(confidence as usize),
        }
    }

    #[tokio::test]
    async fn test_write_then_load() {
        let path = temp_file("sentiment.json");
        let mut entries = SentimentFile::new();
        entries.insert("BTC".to_string(), entry(SentimentLabel::Bullish, 70));
        entries.insert("ETH".to_string(), entry(SentimentLabel::Bearish, 31));
        write_sentiment_file(&path, &entries).await.unwrap();

        let loaded = load_sentiment_file(&path).unwrap();
        assert_eq!(loaded, entries);

        // No temp files left behind
        let dir = path.parent().unwrap();
        let prefix = format!(".{}", path.file_name().unwrap().to_string_lossy());
        let leftovers = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .count();
        assert_eq!(leftovers, 0);
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_merge_keeps_other_assets() {
        let path = temp_file("merge.json");
        let mut entries = SentimentFile::new();
        entries.insert("BTC".to_string(), entry(SentimentLabel::Bullish, 70));
        write_sentiment_file(&path, &entries).await.unwrap();

        let merged = merge_sentiment_entry(&path, "sol", entry(SentimentLabel::Neutral, 10))
            .await
            .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(load_sentiment_file(&path).unwrap(), merged);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_empty() {
        let loaded = load_sentiment_file(&temp_file("missing.json")).unwrap();
        assert!(loaded.is_empty());
    }
}
