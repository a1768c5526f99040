//! XML documents as JSON-like trees, so XML responses flatten the same way JSON ones do.

use quick_xml::Reader;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};

const TEXT_KEY: &str = "#text";

#[derive(thiserror::Error, Debug)]
pub(crate) enum XmlTreeError {
    #[error("XML parse error: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attr(#[from] AttrError),

    #[error("XML element <{0}> is never closed")]
    Unclosed(String),
}

#[derive(Debug)]
struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self, XmlTreeError> {
        let mut fields = Map::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
            let value = attr.unescape_value()?.into_owned();
            fields.insert(key, Value::String(value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            fields,
            text: String::new(),
        })
    }

    fn into_value(self) -> (String, Value) {
        let Self {
            name,
            mut fields,
            text,
        } = self;
        let value = if fields.is_empty() {
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text)
            }
        } else {
            if !text.is_empty() {
                fields.insert(TEXT_KEY.to_string(), Value::String(text));
            }
            Value::Object(fields)
        };
        (name, value)
    }
}

fn attach(fields: &mut Map<String, Value>, name: String, value: Value) {
    match fields.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(name, value);
        }
    }
}

/// Converts an XML document into a tree of objects.
///
/// Attributes become `@name` keys, text next to attributes or children becomes
/// `#text`, repeated children become arrays, text-only elements become strings
/// and empty elements become null.
pub(crate) fn xml_to_value(xml: &str) -> Result<Value, XmlTreeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root = Map::new();
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Frame::open(&start)?),
            Event::Empty(start) => {
                let (name, value) = Frame::open(&start)?.into_value();
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.fields, name, value),
                    None => attach(&mut root, name, value),
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    continue;
                };
                let (name, value) = frame.into_value();
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.fields, name, value),
                    None => attach(&mut root, name, value),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlTreeError::Unclosed(open.name));
    }
    Ok(Value::Object(root))
}
