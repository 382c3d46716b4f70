use std::io::{Cursor, Read, Write};

use aws_config::SdkConfig;
use aws_sdk_s3::primitives::ByteStream;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::adapters::code_staging::CodeStager;
use crate::runtime::planning::staged_rule_key;

use super::block_on;

/// Downloads the published artifact bundle and stages one zip object per
/// rule into the staging bucket.
pub struct HttpCodeStager {
    http: reqwest::Client,
    s3: aws_sdk_s3::Client,
}

impl HttpCodeStager {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            s3: aws_sdk_s3::Client::new(config),
        }
    }

    fn download_bundle(&self, archive_url: &str) -> Result<Vec<u8>, String> {
        block_on(async {
            let response = self
                .http
                .get(archive_url)
                .send()
                .await
                .map_err(|error| format!("failed to download code archive: {error}"))?
                .error_for_status()
                .map_err(|error| format!("code archive download was rejected: {error}"))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|error| format!("failed to read code archive body: {error}"))?;
            Ok(bytes.to_vec())
        })
    }

    fn upload(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), String> {
        block_on(async {
            self.s3
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(body))
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to stage object '{key}': {error}"))
        })
    }
}

impl CodeStager for HttpCodeStager {
    fn stage_rule_code(
        &self,
        archive_url: &str,
        staging_bucket: &str,
        rule_names: &[&str],
    ) -> Result<Vec<String>, String> {
        let bundle = self.download_bundle(archive_url)?;

        let mut staged_keys = Vec::with_capacity(rule_names.len());
        for rule_name in rule_names {
            let artifact = extract_rule_artifact(&bundle, rule_name)?;
            let key = staged_rule_key(rule_name);
            self.upload(staging_bucket, &key, artifact)?;
            staged_keys.push(key);
        }
        Ok(staged_keys)
    }
}

/// Repacks the bundle entries under `rules/<rule>/` into a standalone zip
/// with paths relative to the rule directory.
fn extract_rule_artifact(bundle: &[u8], rule_name: &str) -> Result<Vec<u8>, String> {
    let mut archive = ZipArchive::new(Cursor::new(bundle))
        .map_err(|error| format!("code archive is not a valid zip: {error}"))?;
    let marker = format!("/rules/{rule_name}/");

    let mut output = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);

    let mut copied = 0usize;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|error| format!("failed to read archive entry: {error}"))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some(position) = name.find(&marker) else {
            continue;
        };
        let relative = name[position + marker.len()..].to_string();
        if relative.is_empty() {
            continue;
        }

        let mut body = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut body)
            .map_err(|error| format!("failed to read archive entry '{name}': {error}"))?;

        output
            .start_file(relative, options)
            .map_err(|error| format!("failed to start staged entry for '{name}': {error}"))?;
        output
            .write_all(&body)
            .map_err(|error| format!("failed to write staged entry for '{name}': {error}"))?;
        copied += 1;
    }

    if copied == 0 {
        return Err(format!("code archive has no entries for rule '{rule_name}'"));
    }

    let cursor = output
        .finish()
        .map_err(|error| format!("failed to finish staged zip for '{rule_name}': {error}"))?;
    Ok(cursor.into_inner())
}
