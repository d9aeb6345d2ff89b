//! HTML fragment parsing and serialization.
//!
//! The parser is lenient, the way browsers are: it never fails. Unknown or
//! stray closing tags are dropped, unclosed elements are closed at the end
//! of input, and void elements never take children. Raw-text elements
//! (`script`, `style`, `textarea`, `title`) keep their content as text.

use super::node::{Node, NodeType};

const RAW_TEXT_ELEMENTS: [&str; 4] = ["script", "style", "textarea", "title"];

/// Parse `markup` into a list of top-level nodes.
pub fn parse_fragment(markup: &str) -> Vec<Node> {
    let root = Node::fragment();
    let mut open: Vec<Node> = vec![root.clone()];
    let mut rest = markup;

    while !rest.is_empty() {
        let current = open.last().cloned().unwrap_or_else(|| root.clone());

        if let Some(after) = rest.strip_prefix("<!--") {
            let (data, tail) = match after.find("-->") {
                Some(end) => (&after[..end], &after[end + 3..]),
                None => (after, ""),
            };
            current.append_child(&Node::comment(data));
            rest = tail;
            continue;
        }

        if let Some(after) = rest.strip_prefix("</") {
            let end = after.find('>').unwrap_or(after.len());
            let name = after[..end].trim().to_ascii_lowercase();
            rest = after.get(end + 1..).unwrap_or("");
            if let Some(index) = open.iter().rposition(|n| n.tag_name() == Some(name.as_str())) {
                open.truncate(index);
            }
            continue;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            // Doctype and processing instructions carry nothing we keep.
            let end = rest.find('>').map_or(rest.len(), |i| i + 1);
            rest = &rest[end..];
            continue;
        }

        if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
            let (element, self_closing, tail) = parse_start_tag(&rest[1..]);
            rest = tail;
            current.append_child(&element);
            let tag = element.tag_name().unwrap_or_default().to_string();
            if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                let close = format!("</{tag}");
                let end = find_ignore_case(rest, &close).unwrap_or(rest.len());
                let text = &rest[..end];
                if !text.is_empty() {
                    let text = if tag == "textarea" || tag == "title" {
                        decode_entities(text)
                    } else {
                        text.to_string()
                    };
                    element.append_child(&Node::text(text));
                }
                rest = &rest[end..];
                if let Some(after) = rest.strip_prefix(close.as_str()) {
                    rest = after.find('>').map_or("", |i| &after[i + 1..]);
                }
            } else if !self_closing && !element.is_void() {
                open.push(element);
            }
            continue;
        }

        // Text up to the next tag start (a lone `<` is text).
        let first = rest.chars().next().map_or(1, char::len_utf8);
        let end = rest[first..].find('<').map_or(rest.len(), |i| i + first);
        let text = decode_entities(&rest[..end]);
        match current.children().last() {
            Some(last) if *last.node_type() == NodeType::Text => {
                last.set_text_content(&(last.data() + &text));
            }
            _ => current.append_child(&Node::text(text)),
        }
        rest = &rest[end..];
    }

    let children = root.children();
    root.clear_children();
    children
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(&needle.to_ascii_lowercase())
}

/// Parse `tag attr="v" ...>` (after the `<`). Returns the element, whether
/// it was written self-closing, and the remaining input.
fn parse_start_tag(input: &str) -> (Node, bool, &str) {
    let name_end = input
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(input.len());
    let element = Node::element(&input[..name_end]);
    let mut rest = &input[name_end..];

    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("/>") {
            return (element, true, after);
        }
        if let Some(after) = rest.strip_prefix('>') {
            return (element, false, after);
        }
        if rest.is_empty() {
            return (element, false, rest);
        }
        if let Some(after) = rest.strip_prefix('/') {
            rest = after;
            continue;
        }

        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        rest = rest[name_end..].trim_start();

        let value = if let Some(after) = rest.strip_prefix('=') {
            let after = after.trim_start();
            match after.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after[1..];
                    let end = body.find(quote).unwrap_or(body.len());
                    rest = body.get(end + 1..).unwrap_or("");
                    decode_entities(&body[..end])
                }
                _ => {
                    let end = after
                        .find(|c: char| c.is_whitespace() || c == '>')
                        .unwrap_or(after.len());
                    rest = &after[end..];
                    decode_entities(&after[..end])
                }
            }
        } else {
            String::new()
        };
        if !name.is_empty() && !element.has_attribute(name) {
            element.set_attribute(name, value);
        }
    }
}

/// Decode the named entities we emit plus numeric character references.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let decoded = rest.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            c.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Escape text content.
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Escape a double-quoted attribute value.
pub fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Append the markup of `node` to `out`.
pub fn serialize(node: &Node, out: &mut String) {
    match node.node_type() {
        NodeType::Text => {
            let raw = node
                .parent()
                .and_then(|p| p.tag_name().map(|t| t == "script" || t == "style"))
                .unwrap_or(false);
            if raw {
                out.push_str(&node.data());
            } else {
                out.push_str(&escape_text(&node.data()));
            }
        }
        NodeType::Comment => {
            out.push_str("<!--");
            out.push_str(&node.data());
            out.push_str("-->");
        }
        NodeType::Fragment => {
            for child in node.children() {
                serialize(&child, out);
            }
        }
        NodeType::Element(tag) => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in node.attributes() {
                out.push(' ');
                out.push_str(&name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(&value));
                    out.push('"');
                }
            }
            out.push('>');
            if node.is_void() {
                return;
            }
            for child in node.children() {
                serialize(&child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(markup: &str) -> String {
        Node::parse(markup).inner_html()
    }

    #[test]
    fn parses_nested_elements_and_attributes() {
        let doc = Node::parse(r#"<div data-weave data-state='{"count":0}'><p data-text="count">0</p></div>"#);
        let div = doc.first_child().unwrap();
        assert_eq!(div.tag_name(), Some("div"));
        assert_eq!(div.attribute("data-weave").as_deref(), Some(""));
        assert_eq!(div.attribute("data-state").as_deref(), Some(r#"{"count":0}"#));

        let p = div.first_child().unwrap();
        assert_eq!(p.attribute("data-text").as_deref(), Some("count"));
        assert_eq!(p.text_content(), "0");
    }

    #[test]
    fn void_and_self_closing_elements() {
        let doc = Node::parse(r#"<input type="text" data-model="name"><br/><span>x</span>"#);
        let children = doc.children();
        assert_eq!(children.len(), 3);
        assert!(children[0].children().is_empty());
        assert_eq!(roundtrip("<input type=\"text\"><br>"), "<input type=\"text\"><br>");
    }

    #[test]
    fn entities_are_decoded_and_reescaped() {
        let doc = Node::parse("<p title=\"a &amp; b\">1 &lt; 2 &#169; &#x41;</p>");
        let p = doc.first_child().unwrap();
        assert_eq!(p.attribute("title").as_deref(), Some("a & b"));
        assert_eq!(p.text_content(), "1 < 2 \u{a9} A");
        assert_eq!(p.outer_html(), "<p title=\"a &amp; b\">1 &lt; 2 \u{a9} A</p>");
    }

    #[test]
    fn lenient_recovery() {
        assert_eq!(roundtrip("<div><span>a</div>b"), "<div><span>a</span></div>b");
        assert_eq!(roundtrip("</p>text"), "text");
        assert_eq!(roundtrip("a < b"), "a &lt; b");
        assert_eq!(roundtrip("<ul><li>1<li>2</ul>"), "<ul><li>1<li>2</li></li></ul>");
    }

    #[test]
    fn comments_and_raw_text() {
        let doc = Node::parse("<!-- note --><script>if (a < b) {}</script>");
        let children = doc.children();
        assert_eq!(*children[0].node_type(), NodeType::Comment);
        assert_eq!(children[1].text_content(), "if (a < b) {}");
        assert_eq!(doc.inner_html(), "<!-- note --><script>if (a < b) {}</script>");
    }
}
