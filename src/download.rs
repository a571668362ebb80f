use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use tracing::{error, info};

use crate::db::{Database, DownloadTask};

/// Fetches raw bytes for a URL; non-2xx responses are errors.
pub trait ImageFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(client: Client) -> Self {
        HttpImageFetcher { client }
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self.client.get(url).send()?.error_for_status()?.bytes()?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadStats {
    pub saved: usize,
    pub failed: usize,
}

/// `<image_dir>/<series_name>/<basename of img_src>`
pub fn target_path(image_dir: &Path, task: &DownloadTask) -> PathBuf {
    let file_name = task.img_src.rsplit('/').next().unwrap_or_default();
    image_dir.join(folder_name(&task.series_name)).join(file_name)
}

/// One path component per series: separators become `_`, and so do `.` and `..`.
fn folder_name(series_name: &str) -> String {
    let name = series_name.replace(['/', '\\'], "_");
    match name.trim() {
        "" | "." | ".." => "_".to_string(),
        _ => name,
    }
}

/// Delete and recreate the image directory.
pub fn reset_image_dir(image_dir: &Path) -> Result<()> {
    if image_dir.exists() {
        fs::remove_dir_all(image_dir)
            .with_context(|| format!("Failed to remove {:?}", image_dir))?;
        info!("Removed {:?}", image_dir);
    }
    fs::create_dir_all(image_dir).with_context(|| format!("Failed to create {:?}", image_dir))?;
    Ok(())
}

/// Download every task in order. A failed image is logged and skipped.
pub fn download_all(
    fetcher: &impl ImageFetcher,
    db: &Database,
    image_dir: &Path,
    tasks: &[DownloadTask],
) -> Result<DownloadStats> {
    let pb = ProgressBar::new(tasks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta}) {msg}")?
            .progress_chars("=> "),
    );

    let mut stats = DownloadStats::default();
    for task in tasks {
        pb.set_message(task.series_name.clone());
        match download_one(fetcher, image_dir, task) {
            Ok(path) => {
                db.record_download(task.cid, &path);
                stats.saved += 1;
            }
            Err(e) => {
                error!("download_image : {} : {:#}", task.img_src, e);
                stats.failed += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Downloaded {} images ({} failed)", stats.saved, stats.failed);
    Ok(stats)
}

fn download_one(fetcher: &impl ImageFetcher, image_dir: &Path, task: &DownloadTask) -> Result<PathBuf> {
    let path = target_path(image_dir, task);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let bytes = fetcher.fetch(&task.img_src)?;
    fs::write(&path, bytes).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

// ── Tests ──
