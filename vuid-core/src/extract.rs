//! Valid usage extraction from the HTML spec
//!
//! The document is walked element by element in document order while
//! tracking the most recent section heading, link anchor and API function.
//! Inside `div.content` blocks, list items following a "Valid Usage" title
//! become requirement entries.

use scraper::{ElementRef, Html, Node};
use std::collections::HashSet;

use crate::config::Config;
use crate::models::{EntryId, EntrySet, RequirementEntry};

/// Entries pulled from one spec document
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Entries numbered from zero in document order
    pub entries: EntrySet,
    /// Number of entries from implicit valid usage blocks
    pub implicit_count: usize,
    /// Messages seen more than once; only the first occurrence is kept
    pub duplicates: Vec<String>,
}

#[derive(Debug, Default)]
struct Context {
    heading: String,
    link: String,
    api: String,
}

/// Extracts all valid usage entries from spec HTML
pub fn extract(html: &str, config: &Config) -> Extraction {
    log::info!("Parsing spec file...");
    let document = Html::parse_document(html);

    let mut ctx = Context::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut extraction = Extraction::default();
    let mut next_sequence: u32 = 0;

    for element in document.tree.root().descendants().filter_map(ElementRef::wrap) {
        let tag = element.value();
        match tag.name() {
            "h2" | "h3" | "h4" => {
                ctx.heading = spaced_heading(&single_string(element).unwrap_or_default());
                if let Some(id) = tag.attr("id") {
                    ctx.link = id.to_string();
                }
            }
            "a" => {
                if let Some(id) = tag.attr("id") {
                    ctx.link = id.to_string();
                }
            }
            "div" => match first_class(element) {
                Some("listingblock") => {
                    // Newlines are dropped, not turned into spaces
                    let code: String = element.text().collect::<String>().replace('\n', "");
                    match code.split_whitespace().nth(1) {
                        Some(word) if word.starts_with("vk") => {
                            ctx.api = word.trim_matches('(').to_string();
                            ctx.link = ctx.api.clone();
                        }
                        _ => {
                            if let Some(id) = tag.attr("id") {
                                ctx.link = id.to_string();
                            }
                        }
                    }
                }
                Some("content") => {
                    for (text, implicit) in valid_usage_items(element) {
                        let statement = compose_message(config, &ctx.heading, &ctx.link, &text);
                        if !seen.insert(statement.clone()) {
                            log::warn!(
                                "Skipping repeat entry for string. Please review spec and file issue as appropriate. Repeat string is: {}",
                                statement
                            );
                            extraction.duplicates.push(statement);
                            continue;
                        }
                        let message = to_ascii(&statement);

                        let id = EntryId::new(config.id_prefix.clone(), next_sequence);
                        next_sequence += 1;
                        if implicit {
                            extraction.implicit_count += 1;
                        }
                        extraction
                            .entries
                            .insert(RequirementEntry::new(id, message, to_ascii(&ctx.api)).implicit(implicit));
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    log::info!(
        "Validation error set has a total of {} unique errors",
        extraction.entries.len()
    );
    extraction
}

/// List item texts under valid usage titles inside a content block,
/// with their implicit flag
fn valid_usage_items(content: ElementRef<'_>) -> Vec<(String, bool)> {
    let mut items = Vec::new();
    let mut in_valid_usage = false;
    let mut implicit = false;

    for elem in content.descendants().skip(1).filter_map(ElementRef::wrap) {
        match elem.value().name() {
            "div" => {
                if let Some(title) = single_string(elem).filter(|s| s.contains("Valid Usage")) {
                    in_valid_usage = true;
                    implicit = title.contains("(Implicit)");
                }
            }
            "li" if in_valid_usage => {
                let text = elem.text().collect::<String>().replace('\n', " ");
                items.push((text.trim().to_string(), implicit));
            }
            _ => {}
        }
    }

    items
}

/// Builds the stored message for one requirement.
///
/// Whitespace is collapsed before non-ASCII characters are dropped, so a
/// dropped character between two spaces leaves both spaces behind. Existing
/// databases hold messages in that form.
pub fn format_message(config: &Config, heading: &str, link: &str, text: &str) -> String {
    to_ascii(&compose_message(config, heading, link, text))
}

/// Message with whitespace collapsed, before the ASCII pass; duplicates are
/// detected on this form
fn compose_message(config: &Config, heading: &str, link: &str, text: &str) -> String {
    format!(
        "{} '{}' which states '{}' ({}#{})",
        config.message_prefix, heading, text, config.spec_url, link
    )
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

/// Drops non-ASCII characters and turns backslashes into forward slashes
fn to_ascii(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii)
        .map(|c| if c == '\\' { '/' } else { c })
        .collect()
}

/// Inserts a space after the last `.` of a numbered heading
/// (`"1.2.Foo"` becomes `"1.2. Foo"`)
fn spaced_heading(heading: &str) -> String {
    match heading.rsplit_once('.') {
        Some((number, title)) => format!("{}. {}", number, title),
        None => heading.to_string(),
    }
}

fn first_class<'a>(element: ElementRef<'a>) -> Option<&'a str> {
    element
        .value()
        .attr("class")
        .and_then(|classes| classes.split_whitespace().next())
}

/// Text of an element whose only content is a single string, possibly
/// wrapped in nested single-child elements
fn single_string(element: ElementRef<'_>) -> Option<String> {
    let mut children = element.children();
    let only = children.next()?;
    if children.next().is_some() {
        return None;
    }
    match only.value() {
        Node::Text(text) => {
            let text: &str = text;
            Some(text.to_string())
        }
        Node::Element(_) => ElementRef::wrap(only).and_then(single_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            spec_url: "https://example.com/vkspec.html".to_string(),
            id_prefix: "ERR_".to_string(),
            ..Config::default()
        }
    }

    const SPEC: &str = r#"
<html><body>
<h2 id="devsandqueues">4.2.Devices</h2>
<div class="listingblock"><div class="content"><pre>VkResult vkCreateDevice(
    VkPhysicalDevice physicalDevice);</pre></div></div>
<div class="sidebar"><div class="content">
  <div class="title">Valid Usage</div>
  <ul>
    <li>The <code>queueFamilyIndex</code> member
        <span>must</span> be unique</li>
  </ul>
  <div class="title">Valid Usage (Implicit)</div>
  <ul>
    <li><code>physicalDevice</code> must be a valid handle</li>
    <li>path must use C:\dir</li>
  </ul>
</div></div>
<h3 id="sync">6.1.Fences</h3>
<a id="fence-anchor"></a>
<div class="listingblock" id="listing-1"><pre>typedef struct VkFenceCreateInfo {</pre></div>
<div class="content">
  <div>Valid Usage</div>
  <ul><li>flags must be 0</li></ul>
</div>
</body></html>
"#;

    #[test]
    fn test_extracts_entries_with_context() {
        let extraction = extract(SPEC, &config());
        let entries: Vec<&RequirementEntry> = extraction.entries.iter().collect();

        assert_eq!(entries.len(), 4);
        assert_eq!(
            entries[0].message,
            "For more information refer to Vulkan Spec Section '4.2. Devices' which states 'The queueFamilyIndex member must be unique' (https://example.com/vkspec.html#vkCreateDevice)"
        );
        assert_eq!(entries[0].api, "vkCreateDevice");
        assert_eq!(entries[0].id, EntryId::new("ERR_", 0));
        assert!(!entries[0].implicit);

        assert!(entries[1].implicit);
        assert!(entries[1].message.contains("'physicalDevice must be a valid handle'"));
        assert!(entries[2].message.contains("C:/dir"));
        assert_eq!(extraction.implicit_count, 2);
    }

    #[test]
    fn test_listing_without_api_uses_listing_id_as_link() {
        let extraction = extract(SPEC, &config());
        let last = extraction.entries.iter().last().unwrap();

        assert_eq!(last.id.sequence(), 3);
        assert!(last.message.contains("'6.1. Fences'"));
        assert!(last.message.ends_with("(https://example.com/vkspec.html#listing-1)"));
        // API function carries over until the next one is declared
        assert_eq!(last.api, "vkCreateDevice");
    }

    #[test]
    fn test_duplicate_messages_are_skipped() {
        let html = r#"<h2 id="s">1.A</h2>
<div class="content"><div>Valid Usage</div><ul><li>x must be y</li><li>x  must be
y</li></ul></div>"#;
        let extraction = extract(html, &config());
        assert_eq!(extraction.entries.len(), 1);
        assert_eq!(extraction.duplicates.len(), 1);
    }

    #[test]
    fn test_list_items_before_valid_usage_title_are_ignored() {
        let html = r#"<div class="content"><ul><li>not a requirement</li></ul>
<div>Valid Usage</div><ul><li>a requirement</li></ul></div>"#;
        let extraction = extract(html, &config());
        assert_eq!(extraction.entries.len(), 1);
        assert!(extraction.entries.iter().all(|e| e.message.contains("'a requirement'")));
    }

    #[test]
    fn test_non_ascii_is_dropped_after_whitespace_collapse() {
        let message = format_message(&config(), "1. A", "anchor", "x \u{2264} y\tmust  hold");
        assert!(message.contains("'x  y must hold'"));
        assert!(message.is_ascii());
    }

    #[test]
    fn test_statements_differing_only_in_non_ascii_are_both_kept() {
        let html = "<h2 id=\"s\">1.A</h2>\n<div class=\"content\"><div>Valid Usage</div><ul><li>x \u{2264} y</li><li>x \u{2265} y</li></ul></div>";
        let extraction = extract(html, &config());
        assert_eq!(extraction.entries.len(), 2);
        assert!(extraction.duplicates.is_empty());
        assert!(extraction.entries.iter().all(|e| e.message.contains("'x  y'")));
    }

    #[test]
    fn test_spaced_heading() {
        assert_eq!(spaced_heading("4.2.Devices"), "4.2. Devices");
        assert_eq!(spaced_heading("Devices"), "Devices");
    }
}
