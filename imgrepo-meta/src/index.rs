//! virt-builder index
//!
//! The index is a list of `[id]` sections of `key=value` lines separated by
//! blank lines. Multi-line values continue on lines starting with a space.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::artifact::ImageArtifact;

pub const IMAGE_FORMAT: &str = "qcow2";

/// Keys written from dedicated fields, or that only matter to the build
/// step; never copied from free-form properties.
const RESERVED_KEYS: [&str; 17] = [
    "name",
    "osinfo",
    "arch",
    "file",
    "revision",
    "format",
    "size",
    "compressed_size",
    "checksum",
    "checksum[sha512]",
    "expand",
    "base",
    "distro",
    "version",
    "id",
    "sha512",
    "meta_data_only",
];

/// One virt-builder template record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: String,
    pub name: String,
    pub osinfo: Option<String>,
    pub arch: String,
    pub file: String,
    pub revision: String,
    pub format: String,
    pub size: u64,
    pub compressed_size: u64,
    pub checksum: String,
    pub expand: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl IndexEntry {
    /// Build the record for an artifact published at `url`
    pub fn from_artifact(artifact: &ImageArtifact, url: String) -> Self {
        let descriptor = &artifact.descriptor;
        let extra = descriptor
            .props
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            id: descriptor.index_id(),
            name: descriptor.name.clone(),
            osinfo: descriptor.osinfo.clone(),
            arch: descriptor.arch.clone(),
            file: url,
            revision: revision(artifact.timestamp),
            format: IMAGE_FORMAT.to_string(),
            size: descriptor.uncompressed_size.unwrap_or(artifact.size()),
            compressed_size: artifact.size(),
            checksum: artifact.checksums.sha512.clone(),
            expand: descriptor.expand.clone(),
            extra,
        }
    }

    pub fn render(&self) -> String {
        let mut lines = vec![format!("[{}]", self.id)];
        let mut push = |key: &str, value: &str| lines.push(format_field(key, value));

        push("name", &self.name);
        if let Some(ref osinfo) = self.osinfo {
            push("osinfo", osinfo);
        }
        push("arch", &self.arch);
        push("file", &self.file);
        push("revision", &self.revision);
        push("format", &self.format);
        push("size", &self.size.to_string());
        push("compressed_size", &self.compressed_size.to_string());
        push("checksum[sha512]", &self.checksum);
        if let Some(ref expand) = self.expand {
            push("expand", expand);
        }
        for (key, value) in &self.extra {
            push(key, value);
        }

        lines.join("\n")
    }
}

/// Revision number derived from the build time (`YYYYmmddHHMMSS`, UTC)
fn revision(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn format_field(key: &str, value: &str) -> String {
    let mut lines = value.lines();
    let first = lines.next().unwrap_or("");
    let mut field = format!("{}={}", key, first);
    for line in lines {
        field.push_str("\n ");
        field.push_str(line);
    }
    field
}

/// The whole index file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDocument {
    pub entries: Vec<IndexEntry>,
}

impl IndexDocument {
    pub fn push(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let records: Vec<String> = self.entries.iter().map(IndexEntry::render).collect();
        records.join("\n\n") + "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactDescriptor;
    use crate::checksum::Checksums;

    fn artifact() -> ImageArtifact {
        let descriptor = ArtifactDescriptor::new("/repo/fc23-1.qcow2", "fc23", "1", "fc23")
            .with_osinfo("fedora23")
            .with_expand("/dev/sda3")
            .with_timestamp(1_451_606_400)
            .with_prop("notes", "Fedora 23\n\nminimal install")
            .with_prop("base", "libguestfs:fedora-23")
            .with_prop("distro", "fc23");

        ImageArtifact {
            descriptor,
            file_name: "fc23-1.qcow2".to_string(),
            checksums: Checksums {
                sha256: "aa".to_string(),
                sha512: "bb".to_string(),
                size: 10,
            },
            timestamp: 1_451_606_400,
        }
    }

    #[test]
    fn test_render_entry() {
        let entry = IndexEntry::from_artifact(&artifact(), "http://myrepo/fc23-1.qcow2".to_string());
        let expected = [
            "[fc23-1]",
            "name=fc23",
            "osinfo=fedora23",
            "arch=x86_64",
            "file=http://myrepo/fc23-1.qcow2",
            "revision=20160101000000",
            "format=qcow2",
            "size=10",
            "compressed_size=10",
            "checksum[sha512]=bb",
            "expand=/dev/sda3",
            "notes=Fedora 23",
            " ",
            " minimal install",
        ]
        .join("\n");
        assert_eq!(entry.render(), expected);
    }

    #[test]
    fn test_reserved_props_not_copied() {
        let entry = IndexEntry::from_artifact(&artifact(), String::new());
        assert_eq!(entry.extra.len(), 1);
        assert!(entry.extra.contains_key("notes"));
    }

    #[test]
    fn test_uncompressed_size_used_for_size() {
        let mut artifact = artifact();
        artifact.descriptor.uncompressed_size = Some(6_442_450_944);
        let entry = IndexEntry::from_artifact(&artifact, String::new());
        assert_eq!(entry.size, 6_442_450_944);
        assert_eq!(entry.compressed_size, 10);
    }

    #[test]
    fn test_document_separates_records() {
        let mut document = IndexDocument::default();
        assert_eq!(document.render(), "");

        let entry = IndexEntry::from_artifact(&artifact(), String::new());
        document.push(entry.clone());
        document.push(entry);

        let rendered = document.render();
        assert!(rendered.ends_with('\n'));
        assert_eq!(rendered.matches("\n\n[fc23-1]").count(), 1);
        assert_eq!(document.names(), vec!["fc23", "fc23"]);
    }
}
