//! Stable pretty printer for the cleaned tree.
//!
//! One node per line, children indented one level deeper. An element whose
//! content is only text is written on a single line. The printer is its own
//! fixed point: parsing its output and printing again yields the same text.

use super::tree::{Element, Node};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Content of these is not parsed as markup and must be written back untouched.
const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script", "xmp", "iframe", "noembed", "noframes"];

pub(crate) struct PrettyPrinter {
    indent: String,
}

impl PrettyPrinter {
    pub fn new(indent_width: usize) -> Self {
        Self {
            indent: " ".repeat(indent_width),
        }
    }

    pub fn print(&self, nodes: &[Node]) -> String {
        let mut out = String::new();
        self.write_nodes(nodes, 0, &mut out);
        let trimmed = out.trim_end_matches('\n').len();
        out.truncate(trimmed);
        out
    }

    fn write_nodes(&self, nodes: &[Node], depth: usize, out: &mut String) {
        for node in nodes {
            match node {
                Node::Element(el) => self.write_element(el, depth, out),
                Node::Text(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        self.pad(depth, out);
                        escape_text(text, out);
                        out.push('\n');
                    }
                }
            }
        }
    }

    fn write_element(&self, el: &Element, depth: usize, out: &mut String) {
        self.pad(depth, out);
        write_open_tag(el, out);

        if VOID_ELEMENTS.contains(&el.name.as_str()) {
            out.push('\n');
            return;
        }

        if RAW_TEXT_ELEMENTS.contains(&el.name.as_str()) {
            for child in &el.children {
                if let Node::Text(text) = child {
                    out.push_str(text);
                }
            }
            write_close_tag(el, out);
            out.push('\n');
            return;
        }

        let text_only = el
            .children
            .iter()
            .all(|child| matches!(child, Node::Text(_)));
        if text_only {
            for child in &el.children {
                if let Node::Text(text) = child {
                    escape_text(text.trim(), out);
                }
            }
            write_close_tag(el, out);
            out.push('\n');
            return;
        }

        out.push('\n');
        self.write_nodes(&el.children, depth + 1, out);
        self.pad(depth, out);
        write_close_tag(el, out);
        out.push('\n');
    }

    fn pad(&self, depth: usize, out: &mut String) {
        for _ in 0..depth {
            out.push_str(&self.indent);
        }
    }
}

fn write_open_tag(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attribute(value, out);
        out.push('"');
    }
    out.push('>');
}

fn write_close_tag(el: &Element, out: &mut String) {
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(name: &str, attrs: &[(&str, &str)], children: Vec<Node>) -> Node {
        Node::Element(Element {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            children,
        })
    }

    fn text(value: &str) -> Node {
        Node::Text(value.to_string())
    }

    #[test]
    fn text_only_elements_print_inline() {
        let printer = PrettyPrinter::new(1);
        let out = printer.print(&[el("p", &[("id", "x")], vec![text("  hi \n")])]);
        assert_eq!(out, r#"<p id="x">hi</p>"#);
    }

    #[test]
    fn nested_elements_are_indented() {
        let printer = PrettyPrinter::new(1);
        let tree = vec![el(
            "div",
            &[],
            vec![
                text("\n  Hello "),
                el("b", &[], vec![text("world")]),
                el("br", &[], vec![]),
                text("   "),
            ],
        )];
        assert_eq!(printer.print(&tree), "<div>\n Hello\n <b>world</b>\n <br>\n</div>");
    }

    #[test]
    fn escapes_text_and_attributes() {
        let printer = PrettyPrinter::new(2);
        let tree = vec![el(
            "a",
            &[("href", "/q?a=1&b=\"2\""), ("title", "x")],
            vec![text("<tom & jerry>")],
        )];
        assert_eq!(
            printer.print(&tree),
            r#"<a href="/q?a=1&amp;b=&quot;2&quot;" title="x">&lt;tom &amp; jerry&gt;</a>"#
        );
    }

    #[test]
    fn raw_text_elements_are_verbatim() {
        let printer = PrettyPrinter::new(1);
        let tree = vec![el("style", &[], vec![text("\na > b { color: red; }\n")])];
        assert_eq!(
            printer.print(&tree),
            "<style>\na > b { color: red; }\n</style>"
        );
    }

    #[test]
    fn empty_elements_keep_their_close_tag() {
        let printer = PrettyPrinter::new(1);
        assert_eq!(printer.print(&[el("div", &[], vec![])]), "<div></div>");
    }
}
