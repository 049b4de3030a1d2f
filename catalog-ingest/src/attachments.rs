//! Attachment storage
//!
//! Uploaded bytes are written under the upload directory as
//! `<millis>-<short uuid>-<sanitized client name>`; the stored name is the
//! reference saved on the record.

use async_trait::async_trait;
use catalog_common::Result;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::pipeline::Attachment;

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));

/// Destination for accepted attachments
#[async_trait]
pub trait AttachmentSink: Send + Sync {
    /// Write an attachment, returning its stored reference
    async fn store(&self, attachment: &Attachment) -> Result<String>;

    /// Remove a previously stored attachment
    async fn remove(&self, reference: &str) -> Result<()>;
}

/// Stores attachments as files in one directory
#[derive(Debug, Clone)]
pub struct DiskAttachmentSink {
    dir: PathBuf,
}

impl DiskAttachmentSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AttachmentSink for DiskAttachmentSink {
    async fn store(&self, attachment: &Attachment) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let id = Uuid::new_v4().simple().to_string();
        let reference = format!(
            "{}-{}-{}",
            Utc::now().timestamp_millis(),
            &id[..8],
            sanitize_file_name(&attachment.file_name)
        );

        tokio::fs::write(self.dir.join(&reference), &attachment.data).await?;
        tracing::debug!(
            reference = %reference,
            bytes = attachment.data.len(),
            "Stored attachment"
        );

        Ok(reference)
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        match tokio::fs::remove_file(self.dir.join(reference)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reduce a client file name to a safe single path component
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = UNSAFE_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
