//! Owned working tree the cleaner mutates.
//!
//! `scraper` trees are read-only once parsed, so the parsed DOM is copied into
//! this simpler shape. Comments, doctypes, processing instructions and the
//! subtrees of removed tags never make it into the copy.

use scraper::{ElementRef, Html};

use super::policy::{is_data_attribute, meaningful_when_empty, AllowListPolicy, CleaningPolicy};
use super::CleanFailure;

/// Nesting deeper than this is treated as hostile input.
pub(crate) const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    /// First descendant named `name`, depth first.
    pub fn find_first(&self, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|child| match child {
            Node::Element(el) if el.name == name => Some(el),
            Node::Element(el) => el.find_first(name),
            Node::Text(_) => None,
        })
    }

    /// All descendants named `name` in document order.
    pub fn find_all<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if let Node::Element(el) = child {
                if el.name == name {
                    found.push(el);
                }
                el.find_all(name, found);
            }
        }
    }
}

/// Parse scope picked from how the input starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseScope {
    /// A full document; the `<body>` element is kept, plus head stylesheets
    /// when the policy keeps presentation.
    Document,
    /// A fragment; its top-level nodes are kept.
    Fragment,
}

impl ParseScope {
    pub fn detect(raw: &str) -> Self {
        let head: String = raw
            .trim_start()
            .chars()
            .take(10)
            .collect::<String>()
            .to_ascii_lowercase();
        if ["<!doctype", "<html", "<head", "<body"]
            .iter()
            .any(|tag| opens_with_tag(&head, tag))
        {
            ParseScope::Document
        } else {
            ParseScope::Fragment
        }
    }
}

/// `<head>` and `<head lang=x>` match `"<head"`, `<header>` does not.
fn opens_with_tag(text: &str, tag: &str) -> bool {
    text.strip_prefix(tag).is_some_and(|rest| {
        rest.chars()
            .next()
            .map_or(true, |c| c == '>' || c == '/' || c.is_ascii_whitespace())
    })
}

/// Parses `raw` leniently and copies the kept part into an owned tree.
pub(crate) fn parse(raw: &str, policy: CleaningPolicy) -> Result<Vec<Node>, CleanFailure> {
    match ParseScope::detect(raw) {
        ParseScope::Document => {
            let html = Html::parse_document(raw);
            let root = html.root_element();
            let Some(body) = child_named(root, "body") else {
                return copy_children(root, policy, 1);
            };
            let mut body = copy_element(body, policy, 1)?;
            if policy.keeps_presentation() {
                if let Some(head) = child_named(root, "head") {
                    let mut children = head_stylesheets(head, policy)?;
                    children.append(&mut body.children);
                    body.children = children;
                }
            }
            Ok(vec![Node::Element(body)])
        }
        ParseScope::Fragment => {
            let html = Html::parse_fragment(raw);
            copy_children(html.root_element(), policy, 1)
        }
    }
}

fn child_named<'a>(parent: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == name)
}

/// `<style>` and stylesheet `<link>` elements of `head`, moved ahead of the body content.
fn head_stylesheets(
    head: ElementRef<'_>,
    policy: CleaningPolicy,
) -> Result<Vec<Node>, CleanFailure> {
    let mut kept = Vec::new();
    for el in head.children().filter_map(ElementRef::wrap) {
        let value = el.value();
        let is_stylesheet = match value.name() {
            "style" => true,
            "link" => value.attr("rel").is_some_and(|rel| {
                rel.split_ascii_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("stylesheet"))
            }),
            _ => false,
        };
        if is_stylesheet && !policy.removes(value.name()) {
            kept.push(Node::Element(copy_element(el, policy, 2)?));
        }
    }
    Ok(kept)
}

fn copy_element(
    el: ElementRef<'_>,
    policy: CleaningPolicy,
    depth: usize,
) -> Result<Element, CleanFailure> {
    let value = el.value();
    Ok(Element {
        name: value.name().to_string(),
        attrs: value
            .attrs()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        children: copy_children(el, policy, depth + 1)?,
    })
}

fn copy_children(
    parent: ElementRef<'_>,
    policy: CleaningPolicy,
    depth: usize,
) -> Result<Vec<Node>, CleanFailure> {
    if depth > MAX_DEPTH {
        return Err(CleanFailure::TooDeep { limit: MAX_DEPTH });
    }
    let mut nodes = Vec::new();
    for child in parent.children() {
        match child.value() {
            scraper::node::Node::Text(text) => push_text(&mut nodes, text),
            scraper::node::Node::Element(element) => {
                if policy.removes(element.name()) {
                    continue;
                }
                if let Some(el) = ElementRef::wrap(child) {
                    nodes.push(Node::Element(copy_element(el, policy, depth)?));
                }
            }
            _ => {}
        }
    }
    Ok(nodes)
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if let Some(Node::Text(last)) = nodes.last_mut() {
        last.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

/// Replaces every `<picture>` with a single `<img>`, or drops it when it has none.
pub(crate) fn flatten_pictures(nodes: Vec<Node>, keep_presentation: bool) -> Vec<Node> {
    let mut flattened = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Element(el) if el.name == "picture" => {
                if let Some(img) = flatten_picture(&el, keep_presentation) {
                    flattened.push(Node::Element(img));
                }
            }
            Node::Element(mut el) => {
                el.children = flatten_pictures(std::mem::take(&mut el.children), keep_presentation);
                flattened.push(Node::Element(el));
            }
            Node::Text(text) => push_text(&mut flattened, &text),
        }
    }
    flattened
}

fn flatten_picture(picture: &Element, keep_presentation: bool) -> Option<Element> {
    let img = picture.find_first("img")?;

    let mut sources = Vec::new();
    picture.find_all("source", &mut sources);
    let mut chosen: Option<&str> = None;
    for source in sources {
        let Some(srcset) = source.attr("srcset") else {
            continue;
        };
        let candidate = first_srcset_url(srcset);
        let is_webp = source
            .attr("type")
            .is_some_and(|kind| kind.to_ascii_lowercase().contains("webp"));
        if is_webp {
            chosen = Some(candidate);
            break;
        }
        if chosen.is_none() {
            chosen = Some(candidate);
        }
    }

    let mut flattened = Element::new("img");
    if let Some(src) = chosen.filter(|src| !src.is_empty()).or_else(|| img.attr("src")) {
        flattened.attrs.push(("src".to_string(), src.to_string()));
    }
    let mut kept: Vec<&str> = vec!["alt"];
    if keep_presentation {
        kept.extend(["class", "style"]);
    }
    for name in kept {
        if let Some(value) = img.attr(name) {
            flattened.attrs.push((name.to_string(), value.to_string()));
        }
    }
    Some(flattened)
}

/// `"a.webp 1x, b.webp 2x"` -> `"a.webp"`.
pub(crate) fn first_srcset_url(srcset: &str) -> &str {
    srcset
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .split(' ')
        .next()
        .unwrap_or_default()
}

/// Drops every attribute the allow-list does not permit, at any depth.
pub(crate) fn filter_attributes(nodes: &mut [Node], allow_list: &AllowListPolicy) {
    for node in nodes {
        if let Node::Element(el) = node {
            let tag = el.name.as_str();
            el.attrs.retain(|(name, value)| {
                !is_data_attribute(name)
                    && allow_list.permits(tag, name)
                    && (!value.is_empty() || meaningful_when_empty(name))
            });
            filter_attributes(&mut el.children, allow_list);
        }
    }
}
