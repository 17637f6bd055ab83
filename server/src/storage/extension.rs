//! File extension allow-list

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionCheck {
    Allowed,
    Rejected,
}

#[derive(Debug, Clone, Default)]
pub struct ExtensionPolicy {
    allowed: HashSet<String>,
}

impl ExtensionPolicy {
    /// Parse an allow-list such as `pdf@docx@png`. Commas and whitespace
    /// also separate entries; leading dots and case are ignored.
    pub fn from_allow_list(raw: &str) -> Self {
        let allowed = raw
            .split(|c: char| c == '@' || c == ',' || c.is_whitespace())
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { allowed }
    }

    /// Check an extension (without the dot). Files with no extension are rejected.
    pub fn check(&self, extension: &str) -> ExtensionCheck {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        if !ext.is_empty() && self.allowed.contains(&ext) {
            ExtensionCheck::Allowed
        } else {
            ExtensionCheck::Rejected
        }
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// Lowercased extension of a file name, taken after the last dot
pub fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.trim().to_ascii_lowercase();
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_parsing() {
        let policy = ExtensionPolicy::from_allow_list("pdf@.DOCX, png  txt@@");
        assert_eq!(policy.len(), 4);
        assert_eq!(policy.check("pdf"), ExtensionCheck::Allowed);
        assert_eq!(policy.check("docx"), ExtensionCheck::Allowed);
        assert_eq!(policy.check("PNG"), ExtensionCheck::Allowed);
        assert_eq!(policy.check("exe"), ExtensionCheck::Rejected);
        assert_eq!(policy.check(""), ExtensionCheck::Rejected);
    }

    #[test]
    fn test_empty_allow_list_rejects_everything() {
        let policy = ExtensionPolicy::from_allow_list("");
        assert!(policy.is_empty());
        assert_eq!(policy.check("pdf"), ExtensionCheck::Rejected);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("report.PDF"), Some("pdf".to_string()));
        assert_eq!(extension_of("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of("trailing."), None);
        assert_eq!(extension_of(".bashrc"), Some("bashrc".to_string()));
    }
}
