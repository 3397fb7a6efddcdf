//! Minimal markup tree and lenient fragment parser
//!
//! Captured message bodies arrive as serialized HTML fragments. This module
//! turns such a fragment into a small owned tree that the converter walks.
//! Parsing never fails: malformed markup produces whatever structure can be
//! recovered, stray end tags are ignored and open elements are closed at end
//! of input.

use regex::Regex;
use std::sync::OnceLock;

/// Elements that never have children or an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is raw text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea"];

/// A node of the markup tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Element(Element),
}

impl Node {
    pub fn text(content: impl Into<String>) -> Self {
        Node::Text(content.into())
    }

    /// Concatenated text of this node, with `br` rendered as a newline
    pub fn text_content(&self) -> String {
        match self {
            Node::Text(text) => text.clone(),
            Node::Element(el) => el.text_content(),
        }
    }
}

/// An element with a lowercase tag name, attributes and children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds an attribute; the name is lowercased like parsed attributes
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Node::Text(text.into()))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }

    pub fn text_content(&self) -> String {
        if self.tag == "br" {
            return "\n".to_string();
        }
        self.children.iter().map(Node::text_content).collect()
    }

    /// Iterates the child elements, skipping text nodes
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// Depth-first search for the first descendant with the given tag
    pub fn find_descendant(&self, tag: &str) -> Option<&Element> {
        for child in self.child_elements() {
            if child.is(tag) {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(tag) {
                return Some(found);
            }
        }
        None
    }

    /// Counts descendants matching any of the given tags
    pub fn count_descendants(&self, tags: &[&str]) -> usize {
        self.child_elements()
            .map(|child| {
                let own = usize::from(tags.contains(&child.tag.as_str()));
                own + child.count_descendants(tags)
            })
            .sum()
    }
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<!--.*?-->|<![^>]*>|<\?[^>]*>|</\s*([a-zA-Z][a-zA-Z0-9:-]*)\s*>|<([a-zA-Z][a-zA-Z0-9:-]*)((?:[^>\x22\x27]|\x22[^\x22]*\x22|\x27[^\x27]*\x27)*?)(/?)>")
            .expect("valid tag regex")
    })
}

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([^\s=/>"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+)))?"#)
            .expect("valid attribute regex")
    })
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("valid entity regex")
    })
}

/// Decodes the character references that chat UIs actually emit
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    entity_regex()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    "mdash" => Some('\u{2014}'),
                    "ndash" => Some('\u{2013}'),
                    "hellip" => Some('\u{2026}'),
                    "laquo" => Some('\u{ab}'),
                    "raquo" => Some('\u{bb}'),
                    "copy" => Some('\u{a9}'),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    attr_regex()
        .captures_iter(raw)
        .map(|caps| {
            let name = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

/// Open-element stack used while building the tree
struct TreeBuilder {
    stack: Vec<Element>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            stack: vec![Element::new("div")],
        }
    }

    fn current(&mut self) -> &mut Element {
        // The synthetic root is never popped.
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn push_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let text = decode_entities(raw);
        let current = self.current();
        if let Some(Node::Text(prev)) = current.children.last_mut() {
            prev.push_str(&text);
        } else {
            current.children.push(Node::Text(text));
        }
    }

    fn pop_one(&mut self) {
        if self.stack.len() > 1 {
            if let Some(el) = self.stack.pop() {
                self.current().children.push(Node::Element(el));
            }
        }
    }

    /// Implicitly closes elements a new sibling of `tag` ends
    fn auto_close_for(&mut self, tag: &str) {
        let closes: &[&str] = match tag {
            "p" => &["p"],
            "li" => &["li", "p"],
            "tr" => &["tr", "td", "th"],
            "td" | "th" => &["td", "th"],
            "thead" | "tbody" | "tfoot" => &["thead", "tbody", "tfoot", "tr", "td", "th"],
            _ => &[],
        };
        while self.stack.len() > 1 {
            let top = self.stack[self.stack.len() - 1].tag.as_str();
            if closes.contains(&top) {
                self.pop_one();
            } else {
                break;
            }
        }
    }

    fn open(&mut self, element: Element, self_closing: bool) {
        self.auto_close_for(&element.tag);
        if self_closing || VOID_ELEMENTS.contains(&element.tag.as_str()) {
            self.current().children.push(Node::Element(element));
        } else {
            self.stack.push(element);
        }
    }

    fn close(&mut self, tag: &str) {
        let Some(pos) = self.stack.iter().skip(1).rposition(|el| el.tag == tag) else {
            return;
        };
        let depth = pos + 1;
        while self.stack.len() > depth {
            self.pop_one();
        }
    }

    fn finish(mut self) -> Element {
        while self.stack.len() > 1 {
            self.pop_one();
        }
        self.stack.pop().unwrap_or_else(|| Element::new("div"))
    }
}

/// Parses an HTML fragment into a tree rooted at a synthetic `div`
///
/// # Examples
///
/// ```
/// use agregllm::convert::dom::{parse_fragment, Node};
///
/// let root = parse_fragment("<p>Hello <b>world</b></p>");
/// assert_eq!(root.tag, "div");
/// assert_eq!(root.text_content(), "Hello world");
/// assert!(matches!(root.children[0], Node::Element(ref p) if p.tag == "p"));
/// ```
pub fn parse_fragment(html: &str) -> Element {
    let mut builder = TreeBuilder::new();
    let re = tag_regex();
    let mut pos = 0;

    while pos < html.len() {
        let Some(caps) = re.captures_at(html, pos) else {
            builder.push_text(&html[pos..]);
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        builder.push_text(&html[pos..whole.start()]);
        pos = whole.end();

        if let Some(end_tag) = caps.get(1) {
            builder.close(&end_tag.as_str().to_ascii_lowercase());
            continue;
        }
        let Some(start_tag) = caps.get(2) else {
            // Comment, doctype or processing instruction.
            continue;
        };

        let tag = start_tag.as_str().to_ascii_lowercase();
        let attrs = caps.get(3).map(|m| parse_attrs(m.as_str())).unwrap_or_default();
        let self_closing = caps.get(4).map(|m| !m.as_str().is_empty()).unwrap_or(false);
        let mut element = Element::new(tag.clone());
        element.attrs = attrs;

        if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) && !self_closing {
            let rest = &html[pos..];
            let closing = format!("</{}", tag);
            let end = rest.to_ascii_lowercase().find(&closing);
            let (raw, advance) = match end {
                Some(idx) => {
                    let after = rest[idx..].find('>').map(|g| idx + g + 1).unwrap_or(rest.len());
                    (&rest[..idx], after)
                }
                None => (rest, rest.len()),
            };
            if !raw.is_empty() {
                element.children.push(Node::Text(raw.to_string()));
            }
            builder.current().children.push(Node::Element(element));
            pos += advance;
            continue;
        }

        builder.open(element, self_closing);
    }

    builder.finish()
}
