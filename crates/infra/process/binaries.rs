use std::path::{Path, PathBuf};

use crate::domain::errors::CaptureError;

/// Resolves an external tool from an explicit path or the `PATH`.
pub fn resolve_binary(configured: Option<&str>, default_name: &str) -> Result<PathBuf, CaptureError> {
    let wanted = configured
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default_name);

    let candidate = Path::new(wanted);
    if candidate.components().count() > 1 {
        return if candidate.is_file() {
            Ok(candidate.to_path_buf())
        } else {
            Err(CaptureError::FatalConfig(format!(
                "binary {} does not exist",
                candidate.display()
            )))
        };
    }

    which::which(wanted).map_err(|err| {
        CaptureError::FatalConfig(format!("binary {} not found on PATH: {}", wanted, err))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_fatal_config() {
        let result = resolve_binary(None, "definitely-not-a-real-capture-tool");

        assert!(matches!(result, Err(CaptureError::FatalConfig(_))));
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("streamlink");
        let result = resolve_binary(missing.to_str(), "streamlink");
        assert!(matches!(result, Err(CaptureError::FatalConfig(_))));

        std::fs::write(&missing, b"#!/bin/sh\n").unwrap();
        assert_eq!(resolve_binary(missing.to_str(), "streamlink").unwrap(), missing);
    }
}
