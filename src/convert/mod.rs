//! Structured-text converter
//!
//! Turns a captured message subtree into markdown-flavored text. Chat UIs
//! decorate their answers with buttons, icons and hidden screen-reader
//! labels; those are stripped from a private copy before the walk so the
//! caller's tree is never touched.

pub mod dom;

use dom::{Element, Node};
use regex::Regex;
use std::sync::OnceLock;

/// Element names removed before conversion
const NOISE_TAGS: &[&str] = &["button", "mat-icon", "svg", "style", "script"];

/// Class names whose elements are removed before conversion
const NOISE_CLASSES: &[&str] = &["token-count", "sr-only", "feedback-icons"];

/// List context handed down the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    None,
    Unordered,
    Ordered,
}

#[derive(Debug, Clone, Copy)]
struct ListState {
    kind: ListKind,
    index: usize,
}

impl ListState {
    fn empty() -> Self {
        Self {
            kind: ListKind::None,
            index: 0,
        }
    }

    fn fresh(kind: ListKind) -> Self {
        Self { kind, index: 0 }
    }
}

/// Converts an HTML fragment to markdown text
///
/// # Arguments
///
/// * `html` - Serialized markup of one message body
///
/// # Returns
///
/// Returns the converted text, or an empty string for empty input
///
/// # Examples
///
/// ```
/// use agregllm::convert::html_to_markdown;
///
/// let md = html_to_markdown("<p>Use <code>cargo</code> <b>now</b></p>");
/// assert_eq!(md, "Use `cargo` **now**");
/// ```
pub fn html_to_markdown(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    element_to_markdown(&dom::parse_fragment(html))
}

/// Converts an already parsed subtree to markdown text
///
/// The input is cloned before noise removal and is left unchanged.
pub fn element_to_markdown(root: &Element) -> String {
    let mut copy = root.clone();
    strip_noise(&mut copy);

    let mut state = ListState::empty();
    let raw = render_element(&copy, &mut state, None);
    collapse_blank_lines(raw.trim())
}

fn is_noise(el: &Element) -> bool {
    NOISE_TAGS.contains(&el.tag.as_str()) || NOISE_CLASSES.iter().any(|c| el.has_class(c))
}

fn strip_noise(el: &mut Element) {
    el.children.retain(|child| match child {
        Node::Element(child) => !is_noise(child),
        Node::Text(_) => true,
    });
    for child in el.children.iter_mut() {
        if let Node::Element(child) = child {
            strip_noise(child);
        }
    }
}

fn collapse_blank_lines(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\n{3,}").expect("valid newline regex"));
    re.replace_all(text, "\n\n").into_owned()
}

fn render_node(node: &Node, state: &mut ListState, parent: Option<&str>) -> String {
    match node {
        Node::Text(text) => text.clone(),
        Node::Element(el) => render_element(el, state, parent),
    }
}

/// Renders one element; `state` belongs to the enclosing element and is only
/// advanced by list items.
fn render_element(el: &Element, state: &mut ListState, parent: Option<&str>) -> String {
    let tag = el.tag.as_str();

    if tag == "pre" {
        let source = el.find_descendant("code").unwrap_or(el);
        return format!("\n```\n{}\n```\n", source.text_content().trim());
    }

    let mut child_state = match tag {
        "ul" => ListState::fresh(ListKind::Unordered),
        "ol" => ListState::fresh(ListKind::Ordered),
        _ => *state,
    };
    let children: String = el
        .children
        .iter()
        .map(|child| render_node(child, &mut child_state, Some(tag)))
        .collect();

    match tag {
        "p" => format!("\n{}\n", children.trim()),
        "br" => "\n".to_string(),
        "strong" | "b" => format!("**{}**", children.trim()),
        "em" | "i" => format!("*{}*", children.trim()),
        "h1" => format!("\n# {}\n", children.trim()),
        "h2" => format!("\n## {}\n", children.trim()),
        "h3" => format!("\n### {}\n", children.trim()),
        "hr" => "\n\n---\n\n".to_string(),
        "li" => {
            if state.kind == ListKind::Ordered {
                state.index += 1;
                format!("\n{}. {}", state.index, children.trim())
            } else {
                format!("\n- {}", children.trim())
            }
        }
        "code" => format!("`{}`", children.trim()),
        "table" => format!("\n\n{}\n", children),
        "tr" => {
            let mut row = format!("| {}\n", children);
            let is_header = el.find_descendant("th").is_some() || parent == Some("thead");
            if is_header {
                let cells = el.count_descendants(&["th", "td"]);
                let separator = vec!["---"; cells].join(" | ");
                row.push_str(&format!("| {} |\n", separator));
            }
            row
        }
        "td" | "th" => format!("{} | ", children.trim().replace('\n', " ")),
        _ => children,
    }
}
