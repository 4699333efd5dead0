//! Account configuration file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use mailsync_core::SyncConfig;
use serde::{Deserialize, Serialize};

/// Contents of `config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Accounts to synchronize.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// One mail account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Name used on the command line and for the cache directory.
    pub name: String,
    /// Server settings in URI form, e.g. `imap+ssl+://PLAIN:user:pass@host`.
    pub server_uri: String,
    /// Folders to synchronize.
    #[serde(default = "default_folders")]
    pub folders: Vec<String>,
    /// Sync options shared by every folder of the account.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Bearer token for XOAUTH2 accounts.
    #[serde(default)]
    pub oauth_token: Option<String>,
    /// Skip server certificate validation.
    #[serde(default)]
    pub accept_invalid_certificates: bool,
}

fn default_folders() -> Vec<String> {
    vec!["INBOX".to_string()]
}

impl AppConfig {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailsync")
            .join("config.json")
    }

    /// Loads the configuration. A missing file yields an empty configuration.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Accounts matching `name`, or all of them when no name is given.
    pub fn select<'a>(&'a self, name: Option<&'a str>) -> impl Iterator<Item = &'a AccountConfig> {
        self.accounts
            .iter()
            .filter(move |account| name.is_none_or(|name| account.name == name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mailsync_core::ExpungePolicy;

    use super::*;

    #[test]
    fn test_minimal_account() {
        let config: AppConfig = serde_json::from_str(
            r#"{"accounts":[{"name":"work","server_uri":"pop3+ssl+://PLAIN:me:pw@pop.example.com"}]}"#,
        )
        .unwrap();

        let account = &config.accounts[0];
        assert_eq!(account.folders, vec!["INBOX".to_string()]);
        assert_eq!(account.sync, SyncConfig::default());
        assert!(account.oauth_token.is_none());
        assert!(!account.accept_invalid_certificates);
    }

    #[test]
    fn test_sync_options() {
        let config: AppConfig = serde_json::from_str(
            r#"{"accounts":[{"name":"a","server_uri":"imap://h","folders":["INBOX","Sent"],
                "sync":{"expunge_policy":"on_poll"}}]}"#,
        )
        .unwrap();

        let account = &config.accounts[0];
        assert_eq!(account.folders.len(), 2);
        assert_eq!(account.sync.expunge_policy, ExpungePolicy::OnPoll);
    }

    #[test]
    fn test_select() {
        let config: AppConfig = serde_json::from_str(
            r#"{"accounts":[{"name":"a","server_uri":"imap://h"},{"name":"b","server_uri":"imap://h"}]}"#,
        )
        .unwrap();

        assert_eq!(config.select(None).count(), 2);
        let names: Vec<_> = config.select(Some("b")).map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
        assert_eq!(config.select(Some("c")).count(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let config = AppConfig::load(Path::new("/nonexistent/mailsync/config.json"))
            .await
            .unwrap();
        assert!(config.accounts.is_empty());
    }
}
