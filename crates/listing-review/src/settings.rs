//! Email settings persisted as a JSON document next to the database.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Contents of `email_details.json`. Keys other than `recipients` are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unable to access settings file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings document. A missing file reads as empty settings.
    pub async fn load(&self) -> Result<Settings, SettingsError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&raw).map_err(|source| SettingsError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Write the document to a staging file, then rename it over the original so
    /// readers never see a partial write.
    pub async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        settings
            .serialize(&mut serializer)
            .map_err(|source| SettingsError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SettingsError::Io {
                    path: self.path.clone(),
                    source,
                })?;
        }

        let staging = self.staging_path();
        tokio::fs::write(&staging, buf)
            .await
            .map_err(|source| SettingsError::Io {
                path: staging.clone(),
                source,
            })?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|source| SettingsError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Sibling file the document is written to before it replaces the original.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Replace the recipient list, keeping every other key in the document.
    pub async fn update_recipients<I>(&self, recipients: I) -> Result<Settings, SettingsError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut settings = self.load().await?;
        settings.recipients = recipients
            .into_iter()
            .map(|recipient| recipient.trim().to_string())
            .filter(|recipient| !recipient.is_empty())
            .collect();
        self.save(&settings).await?;
        info!(recipients = settings.recipients.len(), "email recipients updated");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::new(dir.path().join("email_details.json"));
        let settings = store.load().await.expect("load");
        assert!(settings.recipients.is_empty());
    }

    #[tokio::test]
    async fn recipients_round_trip_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::new(dir.path().join("email_details.json"));

        store
            .update_recipients(vec!["a@x.com".to_string(), "b@x.com".to_string()])
            .await
            .expect("update");

        let settings = store.load().await.expect("load");
        assert_eq!(settings.recipients, vec!["a@x.com", "b@x.com"]);
    }

    #[tokio::test]
    async fn update_preserves_unrelated_keys_and_drops_blanks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("email_details.json");
        std::fs::write(
            &path,
            json!({ "recipients": ["old@x.com"], "sender": "alerts@x.com" }).to_string(),
        )
        .expect("seed");

        let store = SettingsStore::new(&path);
        store
            .update_recipients(vec![" new@x.com ".to_string(), "  ".to_string()])
            .await
            .expect("update");

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(written["recipients"], json!(["new@x.com"]));
        assert_eq!(written["sender"], json!("alerts@x.com"));
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("email_details.json");
        std::fs::write(&path, "{ recipients: ").expect("seed");

        let store = SettingsStore::new(&path);
        assert!(matches!(
            store.load().await,
            Err(SettingsError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn save_replaces_the_file_without_leaving_staging_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("email_details.json");
        std::fs::write(&path, json!({ "recipients": ["old@x.com"] }).to_string()).expect("seed");
        std::fs::write(dir.path().join("email_details.json.tmp"), "{ half").expect("stale");

        let store = SettingsStore::new(&path);
        store
            .update_recipients(vec!["new@x.com".to_string()])
            .await
            .expect("update");

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("dir entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("email_details.json")]);

        let settings = store.load().await.expect("load");
        assert_eq!(settings.recipients, vec!["new@x.com"]);
    }
}
