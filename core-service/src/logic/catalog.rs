//! Signature Catalog - Known software identities
//!
//! Maps a human-readable software identity (e.g. "WeChat") to the executable
//! names it runs as. Resolution is an exact, case-sensitive match: processes
//! whose executable is not listed are invisible to the rest of the monitor.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// TYPES
// ============================================================================

/// One identity and its executable-name variants (config form)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub identity: String,
    pub executables: Vec<String>,
}

impl SignatureEntry {
    pub fn new(identity: &str, executables: &[&str]) -> Self {
        Self {
            identity: identity.to_string(),
            executables: executables.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Static lookup table, built once from configuration
#[derive(Debug, Clone, Default)]
pub struct SignatureCatalog {
    entries: Vec<SignatureEntry>,
    by_executable: HashMap<String, usize>,
}

impl SignatureCatalog {
    pub fn new(entries: Vec<SignatureEntry>) -> Self {
        let mut by_executable = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            for exe in &entry.executables {
                // First declared identity wins
                if by_executable.contains_key(exe) {
                    log::warn!("Executable '{}' listed twice, keeping first identity", exe);
                    continue;
                }
                by_executable.insert(exe.clone(), index);
            }
        }
        Self { entries, by_executable }
    }

    /// Identity owning `executable_name`, if any
    pub fn resolve(&self, executable_name: &str) -> Option<&str> {
        self.by_executable
            .get(executable_name)
            .map(|&index| self.entries[index].identity.as_str())
    }

    pub fn contains_identity(&self, identity: &str) -> bool {
        self.entries.iter().any(|e| e.identity == identity)
    }

    /// Identity names in declaration order
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.identity.as_str())
    }
}

// ============================================================================
// DEFAULT CATALOG
// ============================================================================

/// Desktop clients known to run PCDN upload agents
pub fn default_entries() -> Vec<SignatureEntry> {
    vec![
        SignatureEntry::new("WeChat", &["WeChat.exe", "WeChatApp.exe"]),
        SignatureEntry::new("QQ", &["QQ.exe", "QQProtect.exe"]),
        SignatureEntry::new("Baidu Netdisk", &["BaiduNetdisk.exe", "baiduNetdisk.exe"]),
        SignatureEntry::new("Tencent Video", &["QQLive.exe", "TencentVideo.exe", "QyClient.exe"]),
        SignatureEntry::new("Thunder", &["Thunder.exe", "XLLiveUD.exe"]),
        SignatureEntry::new("iQIYI", &["QiyiClient.exe", "QyPlayer.exe"]),
        SignatureEntry::new("NetEase Cloud Music", &["NeteaseCloudMusic.exe"]),
        SignatureEntry::new("Youku", &["YoukuClient.exe"]),
        SignatureEntry::new("Sogou Input", &["SogouCloud.exe", "SGImeGuard.exe"]),
        SignatureEntry::new("DingTalk", &["DingTalk.exe", "DingDing.exe"]),
        SignatureEntry::new("360 Security", &["360Safe.exe", "360Tray.exe"]),
        SignatureEntry::new("WPS Office", &["wps.exe", "et.exe", "wpp.exe"]),
        SignatureEntry::new("AliWangWang", &["AliIM.exe"]),
        SignatureEntry::new("360 Browser", &["360se.exe"]),
    ]
}

#[cfg(test)]
impl SignatureCatalog {
    pub fn with_defaults() -> Self {
        Self::new(default_entries())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_executable() {
        let catalog = SignatureCatalog::with_defaults();
        assert_eq!(catalog.resolve("WeChat.exe"), Some("WeChat"));
        assert_eq!(catalog.resolve("QyClient.exe"), Some("Tencent Video"));
        assert_eq!(catalog.resolve("baiduNetdisk.exe"), Some("Baidu Netdisk"));
    }

    #[test]
    fn test_resolve_is_exact_and_case_sensitive() {
        let catalog = SignatureCatalog::with_defaults();
        assert_eq!(catalog.resolve("wechat.exe"), None);
        assert_eq!(catalog.resolve("WeChat"), None);
        assert_eq!(catalog.resolve("WeChat.exe "), None);
        assert_eq!(catalog.resolve("notepad.exe"), None);
    }

    #[test]
    fn test_first_identity_wins_on_duplicate() {
        let catalog = SignatureCatalog::new(vec![
            SignatureEntry::new("First", &["shared.exe"]),
            SignatureEntry::new("Second", &["shared.exe", "own.exe"]),
        ]);
        assert_eq!(catalog.resolve("shared.exe"), Some("First"));
        assert_eq!(catalog.resolve("own.exe"), Some("Second"));
    }

    #[test]
    fn test_identities_in_declaration_order() {
        let catalog = SignatureCatalog::with_defaults();
        let names: Vec<&str> = catalog.identities().take(3).collect();
        assert_eq!(names, vec!["WeChat", "QQ", "Baidu Netdisk"]);
        assert!(catalog.contains_identity("Youku"));
        assert!(!catalog.contains_identity("Steam"));
    }
}
