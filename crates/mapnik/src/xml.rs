//! A minimal XML element tree with indented serialization.

use std::io::{self, Write};

#[derive(Clone, Debug)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
}

/// An element with ordered attributes and children.
#[derive(Clone, Debug)]
pub struct Element {
    pub name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Element {
        Element {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.attrs.push((name.to_string(), value.into()));
    }

    /// Set an attribute when a value is present.
    pub fn set_opt(&mut self, name: &str, value: Option<String>) {
        if let Some(value) = value {
            self.set(name, value);
        }
    }

    pub fn add(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn add_text(&mut self, text: &str) {
        self.children.push(Node::Text(text.to_string()));
    }

    pub fn add_cdata(&mut self, text: &str) {
        self.children.push(Node::CData(text.to_string()));
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn attr_count(&self) -> usize {
        self.attrs.len()
    }

    /// Serialize with two-space indentation.
    pub fn write(&self, out: &mut dyn Write) -> io::Result<()> {
        self.write_indented(out, 0)?;
        writeln!(out)
    }

    fn write_indented(&self, out: &mut dyn Write, depth: usize) -> io::Result<()> {
        let pad = "  ".repeat(depth);
        write!(out, "{pad}<{}", self.name)?;
        for (name, value) in &self.attrs {
            write!(out, " {}=\"{}\"", name, escape_attr(value))?;
        }
        if self.children.is_empty() {
            return write!(out, "/>");
        }
        write!(out, ">")?;

        // text-only content stays on one line
        let inline = self
            .children
            .iter()
            .all(|c| matches!(c, Node::Text(_) | Node::CData(_)));
        if inline {
            for child in &self.children {
                match child {
                    Node::Text(text) => write!(out, "{}", escape_text(text))?,
                    Node::CData(text) => write!(out, "<![CDATA[{text}]]>")?,
                    Node::Element(_) => unreachable!(),
                }
            }
            return write!(out, "</{}>", self.name);
        }

        for child in &self.children {
            writeln!(out)?;
            match child {
                Node::Element(element) => element.write_indented(out, depth + 1)?,
                Node::Text(text) => write!(out, "{pad}  {}", escape_text(text))?,
                Node::CData(text) => write!(out, "{pad}  <![CDATA[{text}]]>")?,
            }
        }
        write!(out, "\n{pad}</{}>", self.name)
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}
