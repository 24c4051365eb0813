//! Upload inventory files
//!
//! One script per line:
//! `ScriptName,productTypeGroup,protocolType,fileWithDirectoryStructure[,description]`.
//! Blank lines and lines starting with `#` are ignored. Malformed lines are
//! reported and skipped so one typo does not block the rest of the upload.

use std::path::{Path, PathBuf};

use crate::common::paths::resolve_relative;

/// A custom script to upload to the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUpload {
    pub script_name: String,
    pub type_group: String,
    pub protocol_type: String,
    pub file: PathBuf,
    pub description: String,
}

/// A line that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryIssue {
    /// 1-based line number
    pub line: usize,
    pub reason: String,
}

/// Parsed inventory
#[derive(Debug, Default)]
pub struct Inventory {
    pub uploads: Vec<ScriptUpload>,
    pub issues: Vec<InventoryIssue>,
}

/// Parse inventory text; relative file paths resolve against `base_dir`
pub fn parse_inventory(content: &str, base_dir: &Path) -> Inventory {
    let mut inventory = Inventory::default();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.splitn(5, ',').map(str::trim).collect();
        if fields.len() < 4 {
            inventory.issues.push(InventoryIssue {
                line: idx + 1,
                reason: format!("expected at least 4 comma-separated fields, got {}", fields.len()),
            });
            continue;
        }

        if let Some(pos) = fields[..4].iter().position(|f| f.is_empty()) {
            let name = ["script name", "type group", "protocol type", "file"][pos];
            inventory.issues.push(InventoryIssue {
                line: idx + 1,
                reason: format!("{name} is empty"),
            });
            continue;
        }

        inventory.uploads.push(ScriptUpload {
            script_name: fields[0].to_string(),
            type_group: fields[1].to_string(),
            protocol_type: fields[2].to_string(),
            file: resolve_relative(base_dir, Path::new(fields[3])),
            description: fields.get(4).map(|d| d.to_string()).unwrap_or_default(),
        });
    }

    inventory
}
