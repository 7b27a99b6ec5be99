//! HTML schema mapper.
//!
//! Pulls interactive elements, navigation link texts and top-level headings
//! out of scouted HTML with a handful of regexes. When only markdown is
//! available, headings and `[text](href)` links are read from that instead.

use std::collections::HashMap;
use std::sync::LazyLock;

use coordination::mission::SchemaMapper;
use coordination::model::{InteractiveElement, PageSnapshot, UiSchema};
use regex::Regex;

use crate::scout::html_to_text;

/// Elements kept per page.
pub const MAX_ELEMENTS: usize = 50;

static BUTTON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<button\b([^>]*)>(.*?)</button>").expect("BUTTON_RE regex should compile")
});
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a>").expect("ANCHOR_RE regex should compile")
});
static SELECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<select\b([^>]*)>(.*?)</select>").expect("SELECT_RE regex should compile")
});
static TEXTAREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<textarea\b([^>]*)>(.*?)</textarea>")
        .expect("TEXTAREA_RE regex should compile")
});
static INPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<input\b([^>]*?)/?>").expect("INPUT_RE regex should compile")
});
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z][a-zA-Z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("ATTR_RE regex should compile")
});
static NAV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<nav\b[^>]*>(.*?)</nav>").expect("NAV_RE regex should compile")
});
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h[1-3]\b[^>]*>(.*?)</h[1-3]>").expect("HEADING_RE regex should compile")
});
static MD_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#{1,3}\s+(.+?)\s*$").expect("MD_HEADING_RE regex should compile")
});
static MD_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("MD_LINK_RE regex should compile")
});

fn attributes(raw: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (c[1].to_ascii_lowercase(), value.to_string())
        })
        .collect()
}

fn inner_text(html: &str) -> String {
    html_to_text(html)
        .lines()
        .map(|l| l.trim_start_matches('#').trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn element(tag: &str, attrs: &HashMap<String, String>, text: String) -> InteractiveElement {
    let attr = |k: &str| attrs.get(k).filter(|v| !v.is_empty()).cloned();
    InteractiveElement {
        tag: tag.to_string(),
        text,
        id: attr("id"),
        element_type: attr("type"),
        href: attr("href"),
        aria_label: attr("aria-label"),
        role: attr("role"),
    }
}

/// Regex-based mapper over scouted HTML.
#[derive(Debug, Clone, Default)]
pub struct HtmlSchemaMapper;

impl HtmlSchemaMapper {
    fn map_html(html: &str) -> UiSchema {
        let mut found: Vec<(usize, InteractiveElement)> = Vec::new();
        for (tag, re) in [
            ("button", &*BUTTON_RE),
            ("a", &*ANCHOR_RE),
            ("select", &*SELECT_RE),
            ("textarea", &*TEXTAREA_RE),
        ] {
            for caps in re.captures_iter(html) {
                let start = caps.get(0).map_or(0, |m| m.start());
                let attrs = attributes(&caps[1]);
                let text = if tag == "select" {
                    attrs.get("name").cloned().unwrap_or_default()
                } else {
                    inner_text(&caps[2])
                };
                found.push((start, element(tag, &attrs, text)));
            }
        }
        for caps in INPUT_RE.captures_iter(html) {
            let start = caps.get(0).map_or(0, |m| m.start());
            let attrs = attributes(&caps[1]);
            if attrs.get("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")) {
                continue;
            }
            let text = ["placeholder", "value", "name"]
                .iter()
                .find_map(|k| attrs.get(*k).filter(|v| !v.is_empty()).cloned())
                .unwrap_or_default();
            found.push((start, element("input", &attrs, text)));
        }
        found.sort_by_key(|(start, _)| *start);

        let navigation = NAV_RE
            .captures_iter(html)
            .flat_map(|nav| {
                ANCHOR_RE
                    .captures_iter(&nav[1])
                    .map(|a| inner_text(&a[2]))
                    .collect::<Vec<_>>()
            })
            .filter(|t| !t.is_empty())
            .collect();

        let headings = HEADING_RE
            .captures_iter(html)
            .map(|h| inner_text(&h[1]))
            .filter(|t| !t.is_empty())
            .collect();

        UiSchema {
            interactive_elements: found
                .into_iter()
                .map(|(_, e)| e)
                .take(MAX_ELEMENTS)
                .collect(),
            navigation,
            headings,
        }
    }

    fn map_markdown(markdown: &str) -> UiSchema {
        UiSchema {
            interactive_elements: MD_LINK_RE
                .captures_iter(markdown)
                .take(MAX_ELEMENTS)
                .map(|c| InteractiveElement {
                    tag: "a".into(),
                    text: c[1].trim().to_string(),
                    href: Some(c[2].to_string()),
                    ..InteractiveElement::default()
                })
                .collect(),
            navigation: Vec::new(),
            headings: MD_HEADING_RE
                .captures_iter(markdown)
                .map(|c| c[1].to_string())
                .collect(),
        }
    }
}

impl SchemaMapper for HtmlSchemaMapper {
    fn map(&self, page: &PageSnapshot) -> UiSchema {
        match page.html.as_deref() {
            Some(html) if !html.trim().is_empty() => Self::map_html(html),
            _ if !page.markdown.trim().is_empty() => Self::map_markdown(&page.markdown),
            _ => UiSchema::default(),
        }
    }
}
