#![forbid(unsafe_code)]

//! String-backed XML writer for building signature structures.
//!
//! The writer does not track namespaces: callers write prefixed names and
//! the matching `xmlns` attributes themselves.

/// A simple streaming XML writer.
#[derive(Debug, Default)]
pub struct XmlWriter {
    out: String,
}

impl XmlWriter {
    /// Create a new XML writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the XML declaration.
    pub fn write_declaration(&mut self) {
        self.out
            .push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>");
    }

    /// Start an element with the given name and attributes.
    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.open(name, attrs);
        self.out.push('>');
    }

    /// Write an empty element (self-closing).
    pub fn empty_element(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.open(name, attrs);
        self.out.push_str("/>");
    }

    /// End the current element.
    pub fn end_element(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    /// Write escaped text content.
    pub fn write_text(&mut self, text: &str) {
        self.out.push_str(&escape_text(text));
    }

    /// `<name attrs>text</name>`
    pub fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) {
        self.start_element(name, attrs);
        self.write_text(text);
        self.end_element(name);
    }

    /// Write an already serialized fragment verbatim.
    pub fn write_raw(&mut self, fragment: &str) {
        self.out.push_str(fragment);
    }

    /// Finish writing and return the XML as a string.
    pub fn into_string(self) -> String {
        self.out
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.out.push('<');
        self.out.push_str(name);
        for (k, v) in attrs {
            self.out.push(' ');
            self.out.push_str(k);
            self.out.push_str("=\"");
            self.out.push_str(&escape_attr(v));
            self.out.push('"');
        }
    }
}

/// Escape character data.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape an attribute value for double quotes.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_nested_elements() {
        let mut w = XmlWriter::new();
        w.start_element("ds:A", &[("xmlns:ds", "urn:d"), ("Id", "a\"b")]);
        w.text_element("ds:B", &[], "x < y & z");
        w.empty_element("ds:C", &[]);
        w.end_element("ds:A");
        assert_eq!(
            w.into_string(),
            r#"<ds:A xmlns:ds="urn:d" Id="a&quot;b"><ds:B>x &lt; y &amp; z</ds:B><ds:C/></ds:A>"#
        );
    }

    #[test]
    fn output_parses() {
        let mut w = XmlWriter::new();
        w.write_declaration();
        w.text_element("r", &[("v", "\t\n")], "]]>");
        let s = w.into_string();
        let doc = roxmltree::Document::parse(&s).unwrap();
        assert_eq!(doc.root_element().attribute("v"), Some("\t\n"));
        assert_eq!(doc.root_element().text(), Some("]]>"));
    }
}
