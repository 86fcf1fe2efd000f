//! Workspace backups.
//!
//! A bundle is a zip holding `manifest.json` and the database under `db/`.
//! A bare SQLite file is also accepted on import so copies taken by hand
//! before bundles existed can still be restored. Whatever the source, the
//! payload must carry the SQLite header and is installed through a temp file
//! and a rename, so a rejected import never touches the live database.

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/marks.sqlite3";
const WORKSPACE_DB: &str = "marks.sqlite3";
const STAGING_DB: &str = "marks.sqlite3.importing";
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
pub const BUNDLE_FORMAT_V1: &str = "marksd-workspace-v1";
pub const LEGACY_SQLITE_FORMAT: &str = "legacy-sqlite3";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleManifest {
    format: String,
    #[serde(default)]
    version: u32,
    #[serde(default)]
    app_version: String,
    #[serde(default)]
    exported_at: String,
    db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

enum Payload {
    Bundle,
    LegacySqlite,
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(WORKSPACE_DB);
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("workspace database not readable: {}", db_path.display()))?;
    let manifest = BundleManifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        version: 1,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        db_sha256: sha256_hex(&db_bytes),
    };

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create output file {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let entries = [
        (MANIFEST_ENTRY, serde_json::to_vec_pretty(&manifest)?),
        (DB_ENTRY, db_bytes),
    ];
    for (name, bytes) in &entries {
        zip.start_file(*name, opts)
            .with_context(|| format!("failed to start entry {name}"))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write entry {name}"))?;
    }
    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: manifest.format,
        entry_count: entries.len(),
        db_sha256: manifest.db_sha256,
    })
}

/// Replaces the workspace database with the one held by `in_path`, either a
/// bundle or a bare SQLite file. Anything else is refused before the
/// workspace is written.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let (db_bytes, detected) = match sniff(in_path)? {
        Payload::Bundle => (read_bundle(in_path)?, BUNDLE_FORMAT_V1),
        Payload::LegacySqlite => (
            std::fs::read(in_path)
                .with_context(|| format!("failed to read {}", in_path.display()))?,
            LEGACY_SQLITE_FORMAT,
        ),
    };
    if !db_bytes.starts_with(SQLITE_HEADER) {
        bail!("bundled database is not a SQLite file");
    }

    install_database(workspace_path, &db_bytes)?;
    Ok(ImportSummary {
        bundle_format_detected: detected.to_string(),
    })
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn sniff(path: &Path) -> anyhow::Result<Payload> {
    let mut head = Vec::with_capacity(SQLITE_HEADER.len());
    File::open(path)
        .with_context(|| format!("failed to open input file {}", path.display()))?
        .take(SQLITE_HEADER.len() as u64)
        .read_to_end(&mut head)
        .context("failed to read file signature")?;

    if head.starts_with(&ZIP_MAGIC) {
        Ok(Payload::Bundle)
    } else if head.as_slice() == SQLITE_HEADER {
        Ok(Payload::LegacySqlite)
    } else {
        Err(anyhow!(
            "{} is neither a workspace bundle nor a SQLite database",
            path.display()
        ))
    }
}

/// Extracts the database entry after checking it against the manifest digest.
fn read_bundle(path: &Path) -> anyhow::Result<Vec<u8>> {
    let file =
        File::open(path).with_context(|| format!("failed to open bundle {}", path.display()))?;
    let mut archive = ZipArchive::new(file).context("invalid zip archive")?;

    let manifest: BundleManifest = serde_json::from_reader(
        archive
            .by_name(MANIFEST_ENTRY)
            .context("bundle missing manifest.json")?,
    )
    .context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {}", manifest.format);
    }

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle missing {DB_ENTRY}"))?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    let actual = sha256_hex(&db_bytes);
    if !actual.eq_ignore_ascii_case(&manifest.db_sha256) {
        bail!(
            "database checksum mismatch: manifest {} but bundle holds {}",
            manifest.db_sha256,
            actual
        );
    }
    Ok(db_bytes)
}

fn install_database(workspace_path: &Path, db_bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("failed to create workspace {}", workspace_path.display()))?;
    let staging = workspace_path.join(STAGING_DB);
    let dst = workspace_path.join(WORKSPACE_DB);

    let mut out = File::create(&staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;
    out.write_all(db_bytes)
        .and_then(|_| out.sync_all())
        .context("failed to write staged database")?;
    drop(out);

    std::fs::rename(&staging, &dst).with_context(|| {
        let _ = std::fs::remove_file(&staging);
        format!("failed to move staged database to {}", dst.display())
    })
}
