//! HTML parser – converts a composed document into a small DOM tree for the
//! native backend.
//!
//! The parser is forgiving rather than conforming: it understands the markup
//! a Markdown renderer and a hand-written template produce (headings,
//! paragraphs, lists, tables, code blocks, images, inline emphasis) and
//! skips what it cannot use. `<script>`, `<style>` and `<title>` bodies are
//! read as raw text.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// The tag name of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Html,
    Head,
    Body,
    Title,
    Style,
    Script,
    Meta,
    Link,
    /// Generic block containers (`div`, `section`, `article`, `main`, ...).
    Div,
    P,
    H(u8),
    Ul,
    Ol,
    Li,
    Dl,
    Dt,
    Dd,
    Blockquote,
    Pre,
    Hr,
    Table,
    Thead,
    Tbody,
    Tfoot,
    Tr,
    Td,
    Th,
    Img,
    Br,
    Input,
    A,
    Em,
    Strong,
    Code,
    Del,
    U,
    Sup,
    Sub,
    Span,
    /// Anything else; laid out inline.
    Unknown(String),
}

impl Tag {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "html" => Tag::Html,
            "head" => Tag::Head,
            "body" => Tag::Body,
            "title" => Tag::Title,
            "style" => Tag::Style,
            "script" => Tag::Script,
            "meta" => Tag::Meta,
            "link" => Tag::Link,
            "div" | "section" | "article" | "main" | "header" | "footer" | "nav" | "aside"
            | "figure" | "figcaption" | "details" | "summary" | "address" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H(1),
            "h2" => Tag::H(2),
            "h3" => Tag::H(3),
            "h4" => Tag::H(4),
            "h5" => Tag::H(5),
            "h6" => Tag::H(6),
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "dl" => Tag::Dl,
            "dt" => Tag::Dt,
            "dd" => Tag::Dd,
            "blockquote" => Tag::Blockquote,
            "pre" => Tag::Pre,
            "hr" => Tag::Hr,
            "table" => Tag::Table,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tfoot" => Tag::Tfoot,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "img" => Tag::Img,
            "br" => Tag::Br,
            "input" => Tag::Input,
            "a" => Tag::A,
            "em" | "i" | "cite" | "var" => Tag::Em,
            "strong" | "b" => Tag::Strong,
            "code" | "kbd" | "samp" | "tt" => Tag::Code,
            "del" | "s" | "strike" => Tag::Del,
            "u" | "ins" => Tag::U,
            "sup" => Tag::Sup,
            "sub" => Tag::Sub,
            "span" => Tag::Span,
            other => Tag::Unknown(other.to_string()),
        }
    }

    /// Elements that never have children or a closing tag.
    pub fn is_void(&self) -> bool {
        matches!(
            self,
            Tag::Img | Tag::Br | Tag::Hr | Tag::Meta | Tag::Link | Tag::Input
        )
    }

    /// Elements whose body is raw text up to the matching close tag.
    fn is_raw_text(&self) -> bool {
        matches!(self, Tag::Script | Tag::Style | Tag::Title)
    }

    pub fn is_table_section(&self) -> bool {
        matches!(self, Tag::Thead | Tag::Tbody | Tag::Tfoot)
    }
}

/// A node in the DOM tree.
#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attr("style")
    }

    pub fn src(&self) -> Option<&str> {
        self.attr("src")
    }

    /// Concatenated text of every descendant.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(t) => out.push_str(t),
            DomNode::Element(e) => collect_text(&e.children, out),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser – recursive descent with a stack of open tag names
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of DOM nodes.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut parser = Parser::new(html);
    parser.parse_nodes(&mut Vec::new())
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Parse siblings until EOF or a closing tag that matches an open
    /// ancestor. Closing tags matching nothing open are dropped.
    fn parse_nodes(&mut self, open: &mut Vec<String>) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        while !self.eof() {
            if self.starts_with("</") {
                let name = self.peek_closing_name();
                if open.iter().any(|o| *o == name) {
                    break;
                }
                self.skip_past('>');
                continue;
            }
            if let Some(node) = self.parse_node(open) {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self, open: &mut Vec<String>) -> Option<DomNode> {
        if self.starts_with("<!--") {
            self.skip_comment();
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            self.skip_past('>');
            return None;
        }
        if self.starts_with("<") && self.next_is_tag_start() {
            Some(self.parse_element(open))
        } else {
            Some(self.parse_text())
        }
    }

    fn next_is_tag_start(&self) -> bool {
        self.input[self.pos + 1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        // A lone '<' that does not open a tag is text.
        if self.starts_with("<") {
            self.advance();
        }
        while !self.eof() && !self.starts_with("<") {
            self.advance();
        }
        DomNode::Text(decode_entities(&self.input[start..self.pos]))
    }

    fn parse_element(&mut self, open: &mut Vec<String>) -> DomNode {
        self.advance(); // '<'
        let name = self.parse_name().to_ascii_lowercase();
        let tag = Tag::parse(&name);
        let mut elem = ElementNode::new(tag.clone());

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let before = self.pos;
            let (key, value) = self.parse_attribute();
            if key.is_empty() && self.pos == before {
                // Unparseable attribute byte; step over it.
                self.advance();
                continue;
            }
            elem.attributes.insert(key.to_ascii_lowercase(), value);
        }

        let self_closed = self.starts_with("/>");
        if self_closed {
            self.pos += 2;
        } else if self.starts_with(">") {
            self.advance();
        }
        if self_closed || tag.is_void() {
            return DomNode::Element(elem);
        }

        if tag.is_raw_text() {
            let body = self.take_raw_text(&name);
            if !body.is_empty() {
                let text = if tag == Tag::Title {
                    decode_entities(&body)
                } else {
                    body
                };
                elem.children.push(DomNode::Text(text));
            }
            return DomNode::Element(elem);
        }

        open.push(name.clone());
        elem.children = self.parse_nodes(open);
        open.pop();

        if self.starts_with("</") && self.peek_closing_name() == name {
            self.skip_past('>');
        }
        DomNode::Element(elem)
    }

    /// Consume everything up to `</name` and the close tag itself.
    fn take_raw_text(&mut self, name: &str) -> String {
        let rest = &self.input[self.pos..];
        let needle = format!("</{name}");
        let end = rest
            .to_ascii_lowercase()
            .find(&needle)
            .unwrap_or(rest.len());
        let body = rest[..end].to_string();
        self.pos += end;
        if !self.eof() {
            self.skip_past('>');
        }
        body
    }

    fn peek_closing_name(&self) -> String {
        self.input[self.pos + 2..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect::<String>()
            .to_ascii_lowercase()
    }

    fn parse_name(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ':' {
                self.advance();
            } else {
                break;
            }
        }
        &self.input[start..self.pos]
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_name().to_string();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.advance();
        self.skip_whitespace();
        (key, self.parse_attr_value())
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ['"', '\''] {
            if self.current_char() == Some(quote) {
                self.advance();
                let start = self.pos;
                while !self.eof() && self.current_char() != Some(quote) {
                    self.advance();
                }
                let value = decode_entities(&self.input[start..self.pos]);
                if !self.eof() {
                    self.advance();
                }
                return value;
            }
        }
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_whitespace() || c == '>' {
                break;
            }
            self.advance();
        }
        decode_entities(&self.input[start..self.pos])
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn skip_comment(&mut self) {
        match self.input[self.pos + 4..].find("-->") {
            Some(end) => self.pos += 4 + end + 3,
            None => self.pos = self.input.len(),
        }
    }

    fn skip_past(&mut self, c: char) {
        match self.input[self.pos..].find(c) {
            Some(i) => self.pos += i + c.len_utf8(),
            None => self.pos = self.input.len(),
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current_char() {
            self.pos += c.len_utf8();
        }
    }
}

/// Decode the named entities a Markdown renderer emits plus numeric
/// references. Unknown entities are left untouched.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "copy" => '\u{00A9}',
        "reg" => '\u{00AE}',
        "euro" => '\u{20AC}',
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Convenience helpers
// ---------------------------------------------------------------------------

/// Find the `<body>` element and return its children, or every node outside
/// `<head>` when no `<body>` is present.
pub fn body_children(nodes: &[DomNode]) -> Vec<DomNode> {
    fn find_body(nodes: &[DomNode]) -> Option<&ElementNode> {
        nodes.iter().find_map(|n| match n {
            DomNode::Element(e) if e.tag == Tag::Body => Some(e),
            DomNode::Element(e) if e.tag == Tag::Html => find_body(&e.children),
            _ => None,
        })
    }
    if let Some(body) = find_body(nodes) {
        return body.children.clone();
    }

    let mut out = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) if e.tag == Tag::Html => out.extend(body_children(&e.children)),
            DomNode::Element(e) if e.tag == Tag::Head => {}
            other => out.push(other.clone()),
        }
    }
    out
}

/// Text of the first `<title>` element, trimmed.
pub fn document_title(nodes: &[DomNode]) -> Option<String> {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::Title {
                let title = e.text_content().trim().to_string();
                return (!title.is_empty()).then_some(title);
            }
            if let Some(found) = document_title(&e.children) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &DomNode) -> &ElementNode {
        match node {
            DomNode::Element(e) => e,
            DomNode::Text(t) => panic!("expected element, got text {t:?}"),
        }
    }

    #[test]
    fn parse_nested_inline() {
        let nodes = parse_html("<p>Hello <strong>world</strong> and <em>you</em>!</p>");
        assert_eq!(nodes.len(), 1);
        let p = element(&nodes[0]);
        assert_eq!(p.tag, Tag::P);
        assert_eq!(p.children.len(), 5);
        assert_eq!(p.text_content(), "Hello world and you!");
    }

    #[test]
    fn whitespace_between_inline_elements_survives() {
        let nodes = parse_html("<p><em>a</em> <strong>b</strong></p>");
        assert_eq!(element(&nodes[0]).text_content(), "a b");
    }

    #[test]
    fn headings_and_code() {
        let nodes = parse_html("<h4>T</h4><pre><code class=\"language-rust\">fn main() {}\n</code></pre>");
        assert_eq!(element(&nodes[0]).tag, Tag::H(4));
        let pre = element(&nodes[1]);
        assert_eq!(pre.tag, Tag::Pre);
        let code = element(&pre.children[0]);
        assert_eq!(code.attr("class"), Some("language-rust"));
        assert_eq!(code.text_content(), "fn main() {}\n");
    }

    #[test]
    fn void_elements_do_not_swallow_siblings() {
        let nodes = parse_html("<p>a<br>b<img src=\"x.png\" alt=\"x\">c</p><hr><p>d</p>");
        assert_eq!(nodes.len(), 3);
        assert_eq!(element(&nodes[0]).children.len(), 5);
        assert_eq!(element(&nodes[1]).tag, Tag::Hr);
    }

    #[test]
    fn raw_text_elements_keep_markup() {
        let nodes = parse_html("<style>p > a { color: red }</style><script>if (a < b) {}</script><p>x</p>");
        assert_eq!(nodes.len(), 3);
        assert_eq!(element(&nodes[0]).text_content(), "p > a { color: red }");
        assert_eq!(element(&nodes[1]).text_content(), "if (a < b) {}");
    }

    #[test]
    fn stray_closing_tags_are_ignored() {
        let nodes = parse_html("</span><p>one</div> two</p><p>three</p>");
        assert_eq!(nodes.len(), 2);
        assert_eq!(element(&nodes[0]).text_content(), "one two");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt; &#169; &#x41; &bogus; &"), "a & b <c> © A &bogus; &");
    }

    #[test]
    fn table_with_sections() {
        let nodes = parse_html(
            "<table><thead><tr><th>Name</th></tr></thead><tbody><tr><td>Alice</td></tr></tbody></table>",
        );
        let table = element(&nodes[0]);
        assert_eq!(table.children.len(), 2);
        assert!(element(&table.children[0]).tag.is_table_section());
    }

    #[test]
    fn title_and_body_are_found() {
        let html = "<!DOCTYPE html><html><head><title>My &amp; Doc</title><meta charset=\"utf-8\"></head><body><p>x</p></body></html>";
        let nodes = parse_html(html);
        assert_eq!(document_title(&nodes).as_deref(), Some("My & Doc"));
        let body = body_children(&nodes);
        assert_eq!(body.len(), 1);
        assert_eq!(element(&body[0]).tag, Tag::P);
    }

    #[test]
    fn fragments_without_body_drop_head() {
        let nodes = parse_html("<head><title>t</title></head><p>x</p>");
        let body = body_children(&nodes);
        assert_eq!(body.len(), 1);
    }
}
