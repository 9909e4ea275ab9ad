use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

const FILE_PREFIX: &str = "lottery_cloud_backup_";
const FILE_SUFFIX: &str = ".json";

/// `lottery_cloud_backup_<unix millis>.json`
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!("{FILE_PREFIX}{}{FILE_SUFFIX}", at.timestamp_millis())
}

/// The instant encoded in a backup file name, if it is one of ours.
pub fn parse_backup_file_name(name: &str) -> Option<DateTime<Utc>> {
    let millis = name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse::<i64>()
        .ok()?;
    DateTime::from_timestamp_millis(millis)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub file_name: String,
    pub path: PathBuf,
    pub taken_at: DateTime<Utc>,
    pub size: u64,
}

/// A directory of timestamped backup documents.
#[derive(Clone, Debug)]
pub struct BackupDir {
    path: PathBuf,
}

impl BackupDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `document` under the name for `at`. Refuses to overwrite an
    /// existing backup and to store text that is not a JSON object.
    pub fn save(&self, document: &str, at: DateTime<Utc>) -> Result<PathBuf> {
        let value: serde_json::Value =
            serde_json::from_str(document).context("Backup document is not valid JSON")?;
        if !value.is_object() {
            return Err(anyhow!("Backup document must be a JSON object"));
        }
        fs::create_dir_all(&self.path).with_context(|| {
            format!("Failed to create backup directory {}", self.path.display())
        })?;
        let path = self.path.join(backup_file_name(at));
        if path.exists() {
            return Err(anyhow!("Backup {} already exists", path.display()));
        }
        fs::write(&path, document)
            .with_context(|| format!("Failed to write backup {}", path.display()))?;
        Ok(path)
    }

    /// Every backup in the directory, oldest first. Other files are ignored.
    pub fn list(&self) -> Result<Vec<BackupEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        let dir = fs::read_dir(&self.path).with_context(|| {
            format!("Failed to read backup directory {}", self.path.display())
        })?;
        for entry in dir {
            let entry = entry.context("Failed to read backup directory entry")?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(taken_at) = parse_backup_file_name(&file_name) else {
                continue;
            };
            let metadata = entry
                .metadata()
                .with_context(|| format!("Failed to stat backup {file_name}"))?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(BackupEntry {
                path: entry.path(),
                file_name,
                taken_at,
                size: metadata.len(),
            });
        }
        entries.sort_by_key(|entry| entry.taken_at);
        Ok(entries)
    }

    pub fn latest(&self) -> Result<Option<BackupEntry>> {
        Ok(self.list()?.pop())
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read backup {}", path.display()))
    }
}
