//! Minimal reader/writer for the Bulk API v1 XML dialect.
//!
//! Requests are flat documents (`<jobInfo>`, `<sObjects>`), so element
//! extraction is regex based rather than a full XML parser.

use crate::core::{Record, Value};
use lazy_static::lazy_static;
use regex::Regex;

pub const ASYNC_NS: &str = "http://www.force.com/2009/06/asyncapi/dataload";
pub const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

lazy_static! {
    static ref SOBJECT_BLOCK: Regex =
        Regex::new(r"(?is)<sObject(?:\s[^>]*)?>(.*?)</sObject>").expect("static regex");
    static ref FIELD_ELEMENT: Regex = Regex::new(
        r"<([A-Za-z_][A-Za-z0-9_]*)>([^<]*)</([A-Za-z_][A-Za-z0-9_]*)>"
    )
    .expect("static regex");
    static ref TEXT_ELEMENT: Regex = Regex::new(
        r"<(?:[A-Za-z0-9_]+:)?([A-Za-z0-9_]+)(?:\s[^>]*)?>([^<]*)</(?:[A-Za-z0-9_]+:)?([A-Za-z0-9_]+)>"
    )
    .expect("static regex");
    static ref NIL_ELEMENT: Regex =
        Regex::new(r#"<([A-Za-z_][A-Za-z0-9_]*)\s+xsi:nil="true"\s*/>"#).expect("static regex");
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Text of the first `<tag>` element, with or without a namespace prefix.
pub fn element_text(xml: &str, tag: &str) -> Option<String> {
    TEXT_ELEMENT
        .captures_iter(xml)
        .find(|caps| caps[1].eq_ignore_ascii_case(tag) && caps[3].eq_ignore_ascii_case(tag))
        .map(|caps| unescape(caps[2].trim()))
}

/// Parse `<sObjects><sObject>...</sObject></sObjects>` into records of text values.
/// `xsi:nil="true"` elements become nulls; empty `<sObject>` blocks are dropped.
pub fn parse_sobjects(xml: &str) -> Vec<Record> {
    SOBJECT_BLOCK
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|block| {
            let block = block.as_str();
            let mut record = Record::new();
            for caps in FIELD_ELEMENT.captures_iter(block) {
                if caps[1] != caps[3] {
                    continue;
                }
                record.set(&caps[1], Value::Text(unescape(caps[2].trim())));
            }
            for caps in NIL_ELEMENT.captures_iter(block) {
                record.set(&caps[1], Value::Null);
            }
            record
        })
        .filter(|record| !record.is_empty())
        .collect()
}

/// Builder for the flat, indented documents the async API returns.
pub struct XmlDocument {
    root: &'static str,
    body: String,
    depth: usize,
}

impl XmlDocument {
    pub fn new(root: &'static str) -> Self {
        Self {
            root,
            body: String::new(),
            depth: 1,
        }
    }

    pub fn element(mut self, name: &str, value: impl std::fmt::Display) -> Self {
        self.push_element(name, &value.to_string());
        self
    }

    pub fn push_element(&mut self, name: &str, value: &str) {
        self.indent();
        self.body
            .push_str(&format!("<{name}>{}</{name}>\n", escape(value), name = name));
    }

    pub fn push_raw(&mut self, line: &str) {
        self.indent();
        self.body.push_str(line);
        self.body.push('\n');
    }

    pub fn open(&mut self, name: &str) {
        self.indent();
        self.body.push_str(&format!("<{}>\n", name));
        self.depth += 1;
    }

    pub fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.body.push_str(&format!("</{}>\n", name));
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.body.push_str("  ");
        }
    }

    pub fn finish(self) -> String {
        format!(
            "{}\n<{root} xmlns=\"{ns}\">\n{body}</{root}>",
            XML_DECL,
            root = self.root,
            ns = ASYNC_NS,
            body = self.body
        )
    }
}
