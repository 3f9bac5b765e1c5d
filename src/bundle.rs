//! Repro bundle export: one zip with everything needed to rerun a session
//! elsewhere — the event tape, the generated test, its manifest, and the
//! structured session result.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zip::write::FileOptions;

use crate::core::pipeline::SessionResult;

pub const REPRO_BUNDLE_SCHEMA_VERSION: u32 = 1;

const META_JSON: &str = "meta.json";
const TAPE_JSONL: &str = "tape.jsonl";
const RESULT_JSON: &str = "result.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReproBundleMeta {
    pub schema_version: u32,
    pub created_at_ms: u64,
    pub app_version: String,
    pub session_id: Uuid,
    /// member name → sha256 hex of its contents.
    pub digests: BTreeMap<String, String>,
}

pub struct ReproBundle;

impl ReproBundle {
    /// Write a bundle for a finished session. The tape is optional (live
    /// captures that were not recorded have none); generated artifacts are
    /// included when the session produced them.
    pub fn create(
        out_path: &Path,
        result: &SessionResult,
        tape_path: Option<&Path>,
    ) -> anyhow::Result<()> {
        let mut members: Vec<(String, Vec<u8>)> = Vec::new();

        if let Some(tape) = tape_path {
            members.push((TAPE_JSONL.to_string(), std::fs::read(tape)?));
        }
        if let Some(artifacts) = &result.artifacts {
            let source_name = artifacts
                .source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "test.rs".to_string());
            members.push((source_name, std::fs::read(&artifacts.source_path)?));

            let manifest_name = artifacts
                .manifest_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "test.manifest.json".to_string());
            members.push((manifest_name, std::fs::read(&artifacts.manifest_path)?));
        }
        members.push((RESULT_JSON.to_string(), serde_json::to_vec_pretty(result)?));

        let meta = ReproBundleMeta {
            schema_version: REPRO_BUNDLE_SCHEMA_VERSION,
            created_at_ms: now_ms(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            session_id: result.session_id,
            digests: members
                .iter()
                .map(|(name, bytes)| (name.clone(), sha256_hex(bytes)))
                .collect(),
        };

        let zip_file = File::create(out_path)?;
        let mut zip = zip::ZipWriter::new(zip_file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file(META_JSON, options)?;
        zip.write_all(&serde_json::to_vec_pretty(&meta)?)?;

        for (name, bytes) in &members {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        let mut zip_file = zip.finish()?;
        zip_file.flush()?;
        Ok(())
    }

    pub fn read_meta(path: &Path) -> anyhow::Result<ReproBundleMeta> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        let mut entry = archive.by_name(META_JSON)?;
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        Ok(serde_json::from_slice(&buf)?)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
