//! C/C++ header generation for the identifier enum and message table

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::models::EntrySet;

/// Renders the header text for `entries`, in identifier order
pub fn render_header(entries: &EntrySet, config: &Config) -> String {
    let prefix = &config.id_prefix;
    let mut out = vec![
        "/* THIS FILE IS GENERATED.  DO NOT EDIT. */".to_string(),
        String::new(),
        "#pragma once".to_string(),
        String::new(),
        "// Disable auto-formatting for generated file".to_string(),
        "// clang-format off".to_string(),
        String::new(),
        "#include <unordered_map>".to_string(),
        String::new(),
        "// Unique validation error codes. Pass one as the messageCode of the debug".to_string(),
        "// report callback; its message is in the table below.".to_string(),
        format!("enum {} {{", config.enum_name),
        format!("    {}UNDEFINED = -1,", prefix),
    ];

    let mut map = vec![format!(
        "static std::unordered_map<int, char const *const> {}{{",
        config.map_name
    )];

    for entry in entries {
        out.push(format!("    {} = {},", entry.id, entry.id.sequence()));
        map.push(format!("    {{{}, \"{}\"}},", entry.id, escape(&entry.message)));
    }

    let max = entries.max_sequence().map_or(0, |seq| seq + 1);
    out.push(format!("    {}MAX_ENUM = {},", prefix, max));
    out.push("};".to_string());
    out.push(String::new());
    out.push("// Spec text and link for each code, to append to the custom error message".to_string());
    out.extend(map);
    out.push("};".to_string());
    out.push(String::new());

    out.join("\n")
}

/// Writes the header file
pub fn write_header<P: AsRef<Path>>(path: P, entries: &EntrySet, config: &Config) -> Result<()> {
    log::info!("Generating header {:?}", path.as_ref());
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&path, render_header(entries, config))
        .with_context(|| format!("Failed to write header {:?}", path.as_ref()))
}

fn escape(message: &str) -> String {
    message.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryId, RequirementEntry};
    use tempfile::TempDir;

    fn entries() -> EntrySet {
        vec![
            RequirementEntry::new(EntryId::new("VALIDATION_ERROR_", 12), "second", "vkB"),
            RequirementEntry::new(EntryId::new("VALIDATION_ERROR_", 3), "say \"hi\"", "vkA"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_render_enum_and_map() {
        let header = render_header(&entries(), &Config::default());

        assert!(header.contains("enum UNIQUE_VALIDATION_ERROR_CODE {\n    VALIDATION_ERROR_UNDEFINED = -1,\n    VALIDATION_ERROR_00003 = 3,\n    VALIDATION_ERROR_00012 = 12,\n    VALIDATION_ERROR_MAX_ENUM = 13,\n};"));
        assert!(header.contains("static std::unordered_map<int, char const *const> validation_error_map{"));
        assert!(header.contains("    {VALIDATION_ERROR_00003, \"say \\\"hi\\\"\"},\n    {VALIDATION_ERROR_00012, \"second\"},\n};"));
    }

    #[test]
    fn test_render_empty() {
        let header = render_header(&EntrySet::new(), &Config::default());
        assert!(header.contains("VALIDATION_ERROR_MAX_ENUM = 0,"));
    }

    #[test]
    fn test_write_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join("messages.h");
        write_header(&path, &entries(), &Config::default()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("/* THIS FILE IS GENERATED."));
        assert!(content.contains("#pragma once"));
    }
}
