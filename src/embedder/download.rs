/// Model file auto-download from HuggingFace.
///
/// Fetches the ONNX export of all-MiniLM-L6-v2 (384 dimensions) and its
/// tokenizer when they are not already present locally.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Base URL for HuggingFace model files.
const HF_BASE: &str = "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main";

/// Files required for the embedder, with their relative URL paths.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
    ("special_tokens_map.json", "special_tokens_map.json"),
    ("tokenizer_config.json", "tokenizer_config.json"),
];

/// Return the default model directory path.
#[must_use]
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models/all-MiniLM-L6-v2")
}

/// Names of the required files that are missing from `model_dir`.
#[must_use]
pub fn missing_files(model_dir: &Path) -> Vec<&'static str> {
    MODEL_FILES
        .iter()
        .filter(|(name, _)| !model_dir.join(name).exists())
        .map(|(name, _)| *name)
        .collect()
}

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    missing_files(model_dir).is_empty()
}

/// Download model files from HuggingFace if any are missing.
///
/// Creates the model directory if it doesn't exist and skips files that are
/// already present.
pub fn download_model_files(model_dir: &Path) -> Result<()> {
    info!("Checking model files in {}", model_dir.display());

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    let missing = missing_files(model_dir);
    if missing.is_empty() {
        info!("All model files found, skipping download");
        return Ok(());
    }

    eprintln!("[INFO] Downloading {} model file(s) from HuggingFace...", missing.len());

    for &(filename, url_path) in MODEL_FILES {
        if !missing.contains(&filename) {
            continue;
        }

        let url = format!("{HF_BASE}/{url_path}");
        eprintln!("[INFO] Downloading {filename}...");
        download_file(&model_dir.join(filename), &url)
            .with_context(|| format!("failed to download {filename}"))?;
    }

    eprintln!("[INFO] Model download complete!");
    Ok(())
}

/// Download a single file with a progress bar.
fn download_file(dest: &Path, url: &str) -> Result<()> {
    let mut resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let pb = match resp.content_length() {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
                    .expect("valid template")
                    .progress_chars("█▓░"),
            );
            pb
        }
        _ => ProgressBar::new_spinner(),
    };

    // Stream into `<name>.part`; only a finished download gets the real name.
    let partial = dest.with_extension("part");
    let file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;
    let mut writer = pb.wrap_write(file);
    resp.copy_to(&mut writer).context("failed to stream response body")?;
    writer.flush().context("failed to flush file")?;
    pb.finish_and_clear();

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move download into {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_all_files_present_empty_dir() {
        let dir = tempdir().unwrap();
        assert!(!all_files_present(dir.path()));
        assert_eq!(missing_files(dir.path()).len(), MODEL_FILES.len());
    }

    #[test]
    fn test_all_files_present_complete() {
        let dir = tempdir().unwrap();
        for &(name, _) in MODEL_FILES {
            fs::write(dir.path().join(name), "dummy").unwrap();
        }

        assert!(all_files_present(dir.path()));
        // nothing to fetch, so no network access happens
        download_model_files(dir.path()).unwrap();
    }

    #[test]
    fn test_missing_files_partial() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("tokenizer.json"), "dummy").unwrap();

        let missing = missing_files(dir.path());
        assert!(missing.contains(&"model.onnx"));
        assert!(!missing.contains(&"tokenizer.json"));
    }

    #[test]
    fn test_default_model_dir() {
        let dir = default_model_dir();
        assert!(dir.to_str().unwrap().contains("all-MiniLM-L6-v2"));
    }
}
