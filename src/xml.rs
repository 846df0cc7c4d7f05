//! Minimal XML tree for the gateway's document dialects.
//!
//! Elements are matched by local name only: the engine and its peers use
//! different prefixes (`eb:`, `eb3:`, `SOAP:`, `S12:`) for the same
//! namespaces, and the dialects are told apart by shape, not by prefix.

use std::borrow::Cow;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error("{0}")]
    Structure(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name, prefix stripped.
    pub name: String,
    /// Qualified attribute name and unescaped value; namespace declarations are dropped.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Unescaped character data directly inside this element.
    pub text: String,
    /// Raw source between the start and end tag.
    pub inner_xml: String,
}

impl Element {
    pub fn parse(src: &str) -> Result<Element, DocumentError> {
        let mut reader = Reader::from_str(src);
        reader.trim_text(false);

        let mut stack: Vec<(Element, usize)> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let before = reader.buffer_position();
            match reader.read_event()? {
                Event::Start(start) => {
                    let element = Element::open(&start)?;
                    stack.push((element, reader.buffer_position()));
                }
                Event::Empty(start) => {
                    let element = Element::open(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let (mut element, inner_start) = stack
                        .pop()
                        .ok_or(DocumentError::Structure("unbalanced end tag"))?;
                    element.inner_xml = src
                        .get(inner_start..before)
                        .unwrap_or_default()
                        .to_string();
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let unescaped = text.unescape()?;
                    match stack.last_mut() {
                        Some((element, _)) => element.text.push_str(&unescaped),
                        None if unescaped.trim().is_empty() => {}
                        None => {
                            return Err(DocumentError::Structure("text outside root element"))
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some((element, _)) = stack.last_mut() {
                        element.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(DocumentError::Structure("unclosed element"));
        }
        root.ok_or(DocumentError::Structure("document has no root element"))
    }

    fn open(start: &BytesStart<'_>) -> Result<Element, DocumentError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Element {
            name,
            attributes,
            ..Element::default()
        })
    }

    pub fn is(&self, local_name: &str) -> bool {
        self.name == local_name
    }

    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| local_part(key) == local_name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(local_name))
    }

    pub fn children_named<'a>(
        &'a self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(local_name))
    }

    pub fn descend(&self, path: &[&str]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |element, name| element.child(name))
    }

    /// First descendant with the given local name, depth-first.
    pub fn find(&self, local_name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.is(local_name) {
                return Some(child);
            }
            if let Some(found) = child.find(local_name) {
                return Some(found);
            }
        }
        None
    }

    /// Trimmed text at `path`, or an empty string when any step is missing.
    pub fn text_at(&self, path: &[&str]) -> String {
        self.descend(path)
            .map(|element| element.text.trim().to_string())
            .unwrap_or_default()
    }

    /// Body content: the raw inner markup when the node holds any markup
    /// (child elements, CDATA sections, comments), its unescaped text otherwise.
    pub fn content(&self) -> String {
        if self.children.is_empty() && !self.inner_xml.contains('<') {
            self.text.clone()
        } else {
            self.inner_xml.clone()
        }
    }
}

fn attach(
    stack: &mut [(Element, usize)],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), DocumentError> {
    match stack.last_mut() {
        Some((parent, _)) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(DocumentError::Structure("multiple root elements")),
    }
    Ok(())
}

fn local_part(qualified: &str) -> &str {
    qualified
        .rsplit_once(':')
        .map(|(_, local)| local)
        .unwrap_or(qualified)
}

/// True when `src` can be embedded verbatim inside an element without
/// breaking well-formedness: balanced tags, valid entity references, and
/// no XML declaration or doctype.
pub fn is_well_formed_fragment(src: &str) -> bool {
    let mut reader = Reader::from_str(src);
    reader.trim_text(false);
    let mut depth: usize = 0;
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if start.name().as_ref().is_empty() || !attributes_valid(&start) {
                    return false;
                }
                depth += 1;
            }
            Ok(Event::End(_)) => match depth.checked_sub(1) {
                Some(next) => depth = next,
                None => return false,
            },
            Ok(Event::Empty(start)) => {
                if start.name().as_ref().is_empty() || !attributes_valid(&start) {
                    return false;
                }
            }
            Ok(Event::Text(text)) => {
                if text.unescape().is_err() {
                    return false;
                }
            }
            Ok(Event::Decl(_)) | Ok(Event::DocType(_)) => return false,
            Ok(Event::Eof) => return depth == 0,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
}

/// Every attribute has a value, appears once and carries only valid
/// entity references.
fn attributes_valid(start: &BytesStart<'_>) -> bool {
    start.attributes().all(|attr| match attr {
        Ok(attr) => attr.unescape_value().is_ok(),
        Err(_) => false,
    })
}

/// Indented document writer emitting an XML declaration first.
pub struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    pub fn new() -> quick_xml::Result<Self> {
        let mut inner = Writer::new_with_indent(Vec::new(), b' ', 2);
        inner.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(Self { inner })
    }

    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> quick_xml::Result<()> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.inner.write_event(Event::Start(start))
    }

    pub fn end(&mut self, name: &str) -> quick_xml::Result<()> {
        self.inner.write_event(Event::End(BytesEnd::new(name)))
    }

    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> quick_xml::Result<()> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.inner.write_event(Event::Empty(start))
    }

    /// `<name>value</name>` with `value` escaped.
    pub fn leaf(&mut self, name: &str, value: &str) -> quick_xml::Result<()> {
        self.inner.write_event(Event::Start(BytesStart::new(name)))?;
        self.inner.write_event(Event::Text(BytesText::new(value)))?;
        self.inner.write_event(Event::End(BytesEnd::new(name)))
    }

    /// `<name>markup</name>` with `markup` copied verbatim.
    pub fn raw_leaf(&mut self, name: &str, markup: &str) -> quick_xml::Result<()> {
        self.inner.write_event(Event::Start(BytesStart::new(name)))?;
        self.inner
            .write_event(Event::Text(BytesText::from_escaped(Cow::Borrowed(markup))))?;
        self.inner.write_event(Event::End(BytesEnd::new(name)))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.inner.into_inner();
        bytes.push(b'\n');
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<S12:Envelope xmlns:S12="http://www.w3.org/2003/05/soap-envelope">
  <S12:Body>
    <ns:Doc xmlns:ns="urn:x" ns:kind="order">a &amp; b<ns:Line n="1"/></ns:Doc>
  </S12:Body>
</S12:Envelope>"#;

    #[test]
    fn parses_local_names_and_attributes() {
        let root = Element::parse(SAMPLE).expect("parse");
        assert!(root.is("Envelope"));
        let doc = root.descend(&["Body", "Doc"]).expect("doc");
        assert_eq!(doc.attr("kind"), Some("order"));
        assert_eq!(doc.text, "a & b");
        assert_eq!(doc.inner_xml, r#"a &amp; b<ns:Line n="1"/>"#);
        assert_eq!(root.find("Line").and_then(|l| l.attr("n")), Some("1"));
    }

    #[test]
    fn content_prefers_markup_when_children_exist() {
        let root = Element::parse("<a><b><c>1</c></b><d>x &lt; y</d></a>").unwrap();
        assert_eq!(root.child("b").unwrap().content(), "<c>1</c>");
        assert_eq!(root.child("d").unwrap().content(), "x < y");
    }

    #[test]
    fn rejects_broken_documents() {
        assert!(Element::parse("<a><b></a>").is_err());
        assert!(Element::parse("<a>").is_err());
        assert!(Element::parse("<a/><b/>").is_err());
        assert!(Element::parse("   ").is_err());
    }

    #[test]
    fn fragment_detection() {
        assert!(is_well_formed_fragment("<order id=\"1\"><line/></order>"));
        assert!(is_well_formed_fragment("plain text"));
        assert!(is_well_formed_fragment(""));
        assert!(!is_well_formed_fragment("fish & chips"));
        assert!(!is_well_formed_fragment("<open>"));
        assert!(!is_well_formed_fragment("</close>"));
        assert!(!is_well_formed_fragment("<?xml version=\"1.0\"?><a/>"));
    }

    #[test]
    fn fragment_attributes_must_be_well_formed() {
        assert!(is_well_formed_fragment("<Doc href=\"a&amp;b\">x</Doc>"));
        assert!(!is_well_formed_fragment("<Doc href=\"a&b\">x</Doc>"));
        assert!(!is_well_formed_fragment("<Doc flag>x</Doc>"));
        assert!(!is_well_formed_fragment("<Doc a=\"1\" a=\"2\"/>"));
    }

    #[test]
    fn content_keeps_cdata_and_comments_verbatim() {
        let root = Element::parse("<a><b><![CDATA[<raw> & stuff]]></b><c><!-- note --></c></a>")
            .unwrap();
        assert_eq!(root.child("b").unwrap().content(), "<![CDATA[<raw> & stuff]]>");
        assert_eq!(root.child("c").unwrap().content(), "<!-- note -->");
    }

    #[test]
    fn writer_keeps_raw_markup_verbatim() {
        let mut writer = XmlWriter::new().unwrap();
        writer.start("root", &[("xmlns:x", "urn:x")]).unwrap();
        writer.leaf("x:Name", "R&D").unwrap();
        writer.raw_leaf("x:Body", "<p>hi</p>").unwrap();
        writer.end("root").unwrap();
        let text = String::from_utf8(writer.into_bytes()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<x:Name>R&amp;D</x:Name>"));
        assert!(text.contains("<x:Body><p>hi</p></x:Body>"));

        let parsed = Element::parse(&text).unwrap();
        assert_eq!(parsed.child("Body").unwrap().content(), "<p>hi</p>");
    }
}
