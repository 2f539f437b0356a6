//! Minimal owned XML element tree over `quick-xml`.

use std::str::FromStr;

use basinio_types::{BasinError, BasinResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// One XML element with ordered attributes, children and text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

fn xml_err(e: impl std::fmt::Display) -> BasinError {
    BasinError::Xml(e.to_string())
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// An element holding only text.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::new(name)
        }
    }

    /// Set `key`, replacing an existing value.
    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Self {
        let value = value.to_string();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key.to_string(), value)),
        }
        self
    }

    pub fn attr(mut self, key: &str, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.attrs.iter().position(|(k, _)| k == key)?;
        Some(self.attrs.remove(index).1)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Required attribute parsed as `T`.
    pub fn parse<T: FromStr>(&self, key: &str) -> BasinResult<T> {
        let raw = self
            .get(key)
            .ok_or_else(|| BasinError::Xml(format!("<{}> is missing attribute {key}", self.name)))?;
        parse_value(&self.name, key, raw)
    }

    /// Optional attribute parsed as `T`.
    pub fn parse_opt<T: FromStr>(&self, key: &str) -> BasinResult<Option<T>> {
        self.get(key).map(|raw| parse_value(&self.name, key, raw)).transpose()
    }

    /// Optional boolean attribute; accepts `true`/`false` and `1`/`0`.
    pub fn flag(&self, key: &str) -> BasinResult<bool> {
        match self.get(key) {
            None | Some("false") | Some("0") => Ok(false),
            Some("true") | Some("1") => Ok(true),
            Some(other) => Err(BasinError::Xml(format!("<{}> {key}: '{other}' is not a boolean", self.name))),
        }
    }

    pub fn push(&mut self, child: Element) -> &mut Element {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of child `name`, empty when absent.
    pub fn child_text(&self, name: &str) -> &str {
        self.child(name).map_or("", |c| c.text.as_str())
    }

    /// Visit this element and every descendant, depth first.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Element) -> BasinResult<()>) -> BasinResult<()> {
        f(self)?;
        for child in &mut self.children {
            child.walk_mut(f)?;
        }
        Ok(())
    }

    /// Parse a document and return its root element.
    pub fn parse_document(xml: &str) -> BasinResult<Element> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event().map_err(xml_err)? {
                Event::Start(start) => stack.push(open(&start)?),
                Event::Empty(start) => {
                    let element = open(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| BasinError::Xml("unbalanced closing tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text.unescape().map_err(xml_err)?);
                    }
                }
                Event::CData(data) => {
                    if let Some(top) = stack.last_mut() {
                        let text = std::str::from_utf8(&data)
                            .map_err(|e| BasinError::Xml(format!("CDATA is not UTF-8: {e}")))?;
                        top.text.push_str(text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if !stack.is_empty() {
            return Err(BasinError::Xml(format!("unclosed element <{}>", stack[stack.len() - 1].name)));
        }
        root.ok_or_else(|| BasinError::Xml("document has no root element".into()))
    }

    /// Serialize as an indented document with an XML declaration.
    pub fn to_document(&self) -> BasinResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_err)?;
        self.write(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(xml_err)
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> BasinResult<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() && self.text.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(xml_err);
        }
        writer.write_event(Event::Start(start)).map_err(xml_err)?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(xml_err)?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_err)
    }
}

fn parse_value<T: FromStr>(element: &str, key: &str, raw: &str) -> BasinResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| BasinError::Xml(format!("<{element}> {key}: cannot parse '{raw}'")))
}

fn open(start: &BytesStart<'_>) -> BasinResult<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> BasinResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(BasinError::Xml("document has more than one root element".into())),
    }
    Ok(())
}
