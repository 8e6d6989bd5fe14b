use std::{
    fs::{self, File},
    io::{self, Cursor},
    path::Path,
};

use anyhow::{Context, Result};
use octocrab::{
    Octocrab,
    models::{ArtifactId, RunId as GitHubRunId},
    params::actions::ArchiveFormat,
};
use web2apk_core::{
    models::{RepositoryId, RunId},
    util::{join_normalized, size},
};

/// Download every unexpired artifact of a run, extracting each into `destination/<name>/`.
pub async fn download_run_artifacts(
    client: &Octocrab,
    repo: &RepositoryId,
    run_id: RunId,
    destination: &Path,
) -> Result<()> {
    let artifacts = client
        .all_pages(
            client
                .actions()
                .list_workflow_run_artifacts(&repo.owner, &repo.repo, GitHubRunId::from(run_id.0))
                .send()
                .await
                .context("Failed to fetch artifacts")?
                .value
                .unwrap_or_default(),
        )
        .await?;
    tracing::debug!("Run {} (artifacts {})", run_id, artifacts.len());
    let mut downloaded = 0;
    for artifact in artifacts {
        if artifact.expired {
            tracing::warn!("Skipping expired artifact {} of run {}", artifact.name, run_id);
            continue;
        }
        let target = join_normalized(destination, &artifact.name);
        let files = download_artifact(client, repo, artifact.id, &target)
            .await
            .with_context(|| format!("Failed to download artifact {}", artifact.name))?;
        tracing::info!(
            "Downloaded artifact {} of run {} ({} files, {})",
            artifact.name,
            run_id,
            files,
            size(artifact.size_in_bytes as u64)
        );
        downloaded += 1;
    }
    if downloaded == 0 {
        tracing::warn!("Run {} has no downloadable artifacts", run_id);
    }
    Ok(())
}

async fn download_artifact(
    client: &Octocrab,
    repo: &RepositoryId,
    artifact_id: ArtifactId,
    target: &Path,
) -> Result<usize> {
    let bytes = client
        .actions()
        .download_artifact(&repo.owner, &repo.repo, artifact_id, ArchiveFormat::Zip)
        .await?;
    extract_archive(&bytes, target)
}

/// Unpack a zip archive under `target`, returning the number of files written.
///
/// Entries whose names would escape `target` are skipped.
pub(crate) fn extract_archive(data: &[u8], target: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    fs::create_dir_all(target)?;
    let mut files = 0;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(path) = file.enclosed_name() else {
            tracing::warn!("Skipping unsafe archive entry {}", file.name());
            continue;
        };
        let out = target.join(path);
        if file.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer =
            File::create(&out).with_context(|| format!("Failed to create {}", out.display()))?;
        io::copy(&mut file, &mut writer)?;
        files += 1;
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

    use super::*;

    fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_archive() {
        let dir = tempfile::tempdir().unwrap();
        let data = archive(&[
            ("app-debug.apk", &b"payload"[..]),
            ("output-metadata.json", &b"{}"[..]),
            ("../escape.apk", &b"nope"[..]),
        ]);
        let target = dir.path().join("app-debug");
        assert_eq!(extract_archive(&data, &target).unwrap(), 2);
        assert_eq!(fs::read(target.join("app-debug.apk")).unwrap(), b"payload");
        assert!(!dir.path().join("escape.apk").exists());
    }

    #[test]
    fn test_extract_nested_entries() {
        let dir = tempfile::tempdir().unwrap();
        let data = archive(&[("debug/app.apk", &b"apk"[..])]);
        assert_eq!(extract_archive(&data, dir.path()).unwrap(), 1);
        assert!(dir.path().join("debug/app.apk").is_file());
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        assert!(extract_archive(b"not a zip", dir.path()).is_err());
    }
}
