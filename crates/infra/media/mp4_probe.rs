use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use mp4::Mp4Reader;
use std::{fs::File, io::BufReader, io::ErrorKind, path::PathBuf};

use crate::domain::repositories::media_probe::MediaProbe;

pub struct Mp4MediaProbe;

impl Mp4MediaProbe {
    fn is_mp4_path(path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("mp4") || ext.eq_ignore_ascii_case("m4v"))
            .unwrap_or(false)
    }
}

#[async_trait]
impl MediaProbe for Mp4MediaProbe {
    async fn file_size(&self, path: PathBuf) -> Result<Option<u64>> {
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to stat {}", path.display())),
        }
    }

    async fn read_duration_seconds(&self, path: PathBuf) -> Result<i64> {
        if !Self::is_mp4_path(&path) {
            bail!("{} is not an mp4 file", path.display());
        }

        tokio::task::spawn_blocking(move || -> Result<i64> {
            let file = File::open(&path)?;
            let size = file.metadata()?.len();
            let reader = BufReader::new(file);
            let mp4 = Mp4Reader::read_header(reader, size)?;

            Ok(mp4.duration().as_secs_f64().round() as i64)
        })
        .await
        .context("failed to join duration reader task")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_size_is_none_for_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Mp4MediaProbe;

        assert_eq!(probe.file_size(dir.path().join("nope.ts")).await.unwrap(), None);

        let path = dir.path().join("capture.ts");
        tokio::fs::write(&path, b"abc").await.unwrap();
        assert_eq!(probe.file_size(path).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn duration_of_garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp4");
        tokio::fs::write(&path, b"not an mp4").await.unwrap();

        assert!(Mp4MediaProbe.read_duration_seconds(path).await.is_err());
        assert!(
            Mp4MediaProbe
                .read_duration_seconds(dir.path().join("a.ts"))
                .await
                .is_err()
        );
    }
}
