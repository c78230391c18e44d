//! Normalization of response XML into JSON trees.
//!
//! The tree shape is the one of the `xml2js` parser with its default options:
//!
//! - the root element name is the single top-level key
//! - child elements are grouped by name, always as arrays
//! - attributes are stored under `$`, text under `_`
//! - an element with only text collapses to the text string
//! - an empty element is the empty string

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};

mod options;
pub use self::options::{ParserOptions, Processor, strip_prefix};
use self::options::apply;

/// Errors raised while normalizing a response.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[display("malformed XML: {_0}")]
    Xml(quick_xml::Error),

    /// The document has no root element.
    #[display("document has no root element")]
    #[from(skip)]
    NoRoot,

    /// The document ends inside an element.
    #[display("unclosed element '{name}'")]
    #[from(skip)]
    Unclosed {
        /// Name of the innermost open element.
        name: String,
    },

    /// The document has content outside the root element.
    #[display("unexpected content outside the root element")]
    #[from(skip)]
    OutsideRoot,
}

impl From<quick_xml::events::attributes::AttrError> for ParseError {
    fn from(error: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(error.into())
    }
}

/// Parses `xml` into a response tree.
///
/// No partial tree is returned on failure.
///
/// # Errors
///
/// Returns a [`ParseError`] if the document is malformed or has no root element.
pub fn normalize(xml: &str, options: &ParserOptions) -> Result<Value, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                if root.is_some() {
                    return Err(ParseError::OutsideRoot);
                }
                stack.push(Frame::open(&element, options)?);
            }
            Event::Empty(element) => {
                if root.is_some() {
                    return Err(ParseError::OutsideRoot);
                }
                let frame = Frame::open(&element, options)?;
                close(frame, &mut stack, &mut root, options);
            }
            Event::End(_) => {
                if let Some(frame) = stack.pop() {
                    close(frame, &mut stack, &mut root, options);
                }
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                match stack.last_mut() {
                    Some(frame) => frame.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(ParseError::OutsideRoot),
                }
            }
            Event::CData(data) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&data));
                    frame.cdata = true;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(frame) = stack.pop() {
        return Err(ParseError::Unclosed { name: frame.name });
    }
    root.ok_or(ParseError::NoRoot)
}

/// An element being read.
#[derive(Debug)]
struct Frame {
    name: String,
    attributes: Map<String, Value>,
    text: String,
    cdata: bool,
    children: Map<String, Value>,
}

impl Frame {
    fn open(element: &BytesStart<'_>, options: &ParserOptions) -> Result<Self, ParseError> {
        let raw_name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
        let name = apply(&options.tag_name_processors, &raw_name);

        let mut attributes = Map::new();
        for attr in element.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?;
            let value = if is_namespace_declaration(&key) {
                value.into_owned()
            } else {
                apply(&options.attr_value_processors, &value)
            };
            attributes.insert(
                apply(&options.attr_name_processors, &key),
                Value::String(value),
            );
        }

        Ok(Self {
            name,
            attributes,
            text: String::new(),
            cdata: false,
            children: Map::new(),
        })
    }

    fn into_value(self, options: &ParserOptions) -> Value {
        let mut node = Map::new();
        if !self.attributes.is_empty() {
            node.insert(options.attr_key.clone(), Value::Object(self.attributes));
        }

        let mut empty = String::new();
        if self.text.trim().is_empty() && !self.cdata {
            empty = self.text;
        } else {
            let text = if options.trim {
                self.text.trim()
            } else {
                self.text.as_str()
            };
            let text = apply(&options.value_processors, text);
            node.insert(options.char_key.clone(), Value::String(text));
        }

        node.extend(self.children);

        if node.is_empty() {
            return Value::String(empty);
        }
        if node.len() == 1
            && let Some(text) = node.remove(&options.char_key)
        {
            return text;
        }
        Value::Object(node)
    }
}

/// `xmlns` and `xmlns:*` attributes hold namespace URIs, never qualified names.
fn is_namespace_declaration(key: &str) -> bool {
    key == "xmlns" || key.starts_with("xmlns:")
}

fn close(frame: Frame, stack: &mut [Frame], root: &mut Option<Value>, options: &ParserOptions) {
    let name = frame.name.clone();
    let value = frame.into_value(options);

    match stack.last_mut() {
        Some(parent) => push_child(&mut parent.children, name, value, options.explicit_array),
        None if options.explicit_root => {
            let mut wrapper = Map::new();
            wrapper.insert(name, value);
            *root = Some(Value::Object(wrapper));
        }
        None => *root = Some(value),
    }
}

fn push_child(children: &mut Map<String, Value>, name: String, value: Value, explicit_array: bool) {
    match children.get_mut(&name) {
        Some(Value::Array(values)) if explicit_array => values.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = match previous {
                Value::Array(mut values) => {
                    values.push(value);
                    Value::Array(values)
                }
                single => Value::Array(vec![single, value]),
            };
        }
        None if explicit_array => {
            children.insert(name, Value::Array(vec![value]));
        }
        None => {
            children.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(xml: &str) -> Value {
        normalize(xml, &ParserOptions::default()).expect("well-formed XML")
    }

    #[test]
    fn should_normalize_prefixed_items() {
        let tree = parse(r#"<m:Items><m:Item id="1">x</m:Item></m:Items>"#);

        assert_eq!(
            tree,
            json!({ "Items": { "Item": [{ "$": { "id": "1" }, "_": "x" }] } })
        );
    }

    #[test]
    fn should_collapse_text_only_elements() {
        let tree = parse(
            "<t:Message><t:Subject>Hello</t:Subject><t:Size/><t:Body>  </t:Body></t:Message>",
        );

        assert_eq!(
            tree,
            json!({ "Message": { "Subject": ["Hello"], "Size": [""], "Body": ["  "] } })
        );
    }

    #[test]
    fn should_group_repeated_children() {
        let tree = parse("<Folders><Folder>a</Folder><Other/><Folder>b</Folder></Folders>");

        assert_eq!(
            tree,
            json!({ "Folders": { "Folder": ["a", "b"], "Other": [""] } })
        );
    }

    #[test]
    fn should_strip_values_and_attributes() {
        let tree = parse(
            r#"<m:ResponseCode t:Kind="t:Error" xmlns:t="urn:t">m:ErrorItemNotFound</m:ResponseCode>"#,
        );

        assert_eq!(
            tree,
            json!({
                "ResponseCode": {
                    "$": { "Kind": "Error", "xmlns:t": "urn:t" },
                    "_": "ErrorItemNotFound"
                }
            })
        );
    }

    #[test]
    fn should_keep_namespace_declarations_verbatim() {
        let options = ParserOptions::default().with_attr_value_processors([
            Processor::strip_prefix(),
            Processor::new("upper", str::to_uppercase),
        ]);

        let tree = normalize(
            r#"<m:Folder xmlns="urn:default" xmlns:t="urn:t" Kind="t:calendar"/>"#,
            &options,
        )
        .expect("well-formed XML");

        assert_eq!(
            tree["Folder"]["$"],
            json!({ "xmlns": "urn:default", "xmlns:t": "urn:t", "Kind": "CALENDAR" })
        );
    }

    #[test]
    fn should_keep_mixed_text() {
        let tree = parse("<a>x<b>y</b>z</a>");

        assert_eq!(tree, json!({ "a": { "_": "xz", "b": ["y"] } }));
    }

    #[test]
    fn should_unescape_entities_and_cdata() {
        let tree = parse("<a><b>1 &lt; 2 &amp; 3</b><c><![CDATA[<x>]]></c></a>");

        assert_eq!(tree, json!({ "a": { "b": ["1 < 2 & 3"], "c": ["<x>"] } }));
    }

    #[test]
    fn should_honor_options() {
        let options = ParserOptions::verbatim()
            .with_explicit_root(false)
            .with_explicit_array(false)
            .with_attr_key("@")
            .with_char_key("#text")
            .with_trim(true);

        let tree = normalize(
            r#"<m:Items><m:Item id="1"> x </m:Item><m:Item>y</m:Item><m:Total>2</m:Total></m:Items>"#,
            &options,
        )
        .expect("well-formed XML");

        assert_eq!(
            tree,
            json!({
                "m:Item": [{ "@": { "id": "1" }, "#text": "x" }, "y"],
                "m:Total": "2"
            })
        );
    }

    #[test]
    fn should_snapshot_find_item_response() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <m:FindItemResponse xmlns:m="http://schemas.microsoft.com/exchange/services/2006/messages" xmlns:t="http://schemas.microsoft.com/exchange/services/2006/types">
      <m:ResponseMessages>
        <m:FindItemResponseMessage ResponseClass="Success">
          <m:ResponseCode>NoError</m:ResponseCode>
          <m:RootFolder TotalItemsInView="1" IncludesLastItemInRange="true">
            <t:Items>
              <t:Message>
                <t:ItemId Id="AAMkAD" ChangeKey="CQAAAB"/>
                <t:Subject>Quarterly report</t:Subject>
              </t:Message>
            </t:Items>
          </m:RootFolder>
        </m:FindItemResponseMessage>
      </m:ResponseMessages>
    </m:FindItemResponse>
  </s:Body>
</s:Envelope>"#;

        let tree = parse(xml);

        let message = &tree["Envelope"]["Body"][0]["FindItemResponse"][0]["ResponseMessages"][0]
            ["FindItemResponseMessage"][0];
        let item = serde_json::to_string_pretty(&message["RootFolder"][0]["Items"][0]["Message"][0])
            .expect("serializable");
        insta::assert_snapshot!(item, @r#"
        {
          "ItemId": [
            {
              "$": {
                "Id": "AAMkAD",
                "ChangeKey": "CQAAAB"
              }
            }
          ],
          "Subject": [
            "Quarterly report"
          ]
        }
        "#);
        assert_eq!(message["ResponseCode"], json!(["NoError"]));
        assert_eq!(message["$"], json!({ "ResponseClass": "Success" }));
    }

    #[test]
    fn should_reject_malformed_documents() {
        let options = ParserOptions::default();

        assert!(matches!(normalize("", &options), Err(ParseError::NoRoot)));
        assert!(matches!(
            normalize("<a><b></a>", &options),
            Err(ParseError::Xml(_))
        ));
        assert!(matches!(
            normalize("<a>", &options),
            Err(ParseError::Unclosed { .. } | ParseError::Xml(_))
        ));
        assert!(matches!(
            normalize("<a/><b/>", &options),
            Err(ParseError::OutsideRoot)
        ));
    }
}
