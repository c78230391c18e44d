//! SOAP 1.1 envelope serialization from JSON bodies.
//!
//! The body follows the response tree conventions so that a normalized
//! response can be sent back as is:
//!
//! - object keys become child elements, arrays repeat the element
//! - `$` (or `attributes`) holds the attributes
//! - `_` (or `$value`) holds the text content
//! - scalars become text content, `null` an empty element
//!
//! Unprefixed element names take the prefix of the operation element. The
//! schema files are not read, so elements of another namespace, such as the
//! EWS types, must be written with a prefix declared on the WSDL root
//! (`t:BaseShape`); prefixed names are written as given.

use indexmap::IndexMap;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde_json::{Map, Value};

use super::wsdl::Operation;
use super::{InvocationError, SoapHeader};

/// The SOAP 1.1 envelope namespace.
pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

const ENVELOPE_PREFIX: &str = "soap";
const ATTRIBUTE_KEYS: [&str; 2] = ["$", "attributes"];
const TEXT_KEYS: [&str; 2] = ["_", "$value"];

/// Serializes the request envelope of `operation`.
///
/// The namespace declarations of the WSDL root are repeated on the envelope,
/// so that prefixed names like `t:BaseShape` resolve.
pub(crate) fn build_envelope(
    operation: &Operation,
    target_namespace: Option<&str>,
    namespaces: &IndexMap<String, String>,
    headers: &[SoapHeader],
    body: &Value,
) -> Result<String, InvocationError> {
    let mut writer = Writer::new(Vec::new());
    let declaration = BytesDecl::new("1.0", Some("utf-8"), None);
    write(&mut writer, Event::Decl(declaration))?;

    let mut envelope = BytesStart::new("soap:Envelope");
    envelope.push_attribute(("xmlns:soap", SOAP_ENVELOPE_NS));
    for (prefix, uri) in namespaces {
        if prefix.is_empty() || prefix == ENVELOPE_PREFIX {
            continue;
        }
        let key = format!("xmlns:{prefix}");
        envelope.push_attribute((key.as_str(), uri.as_str()));
    }
    write(&mut writer, Event::Start(envelope))?;

    if !headers.is_empty() {
        write(&mut writer, Event::Start(BytesStart::new("soap:Header")))?;
        for header in headers {
            write_header(&mut writer, header)?;
        }
        write(&mut writer, Event::End(BytesEnd::new("soap:Header")))?;
    }

    write(&mut writer, Event::Start(BytesStart::new("soap:Body")))?;
    write_operation(&mut writer, operation, target_namespace, body)?;
    write(&mut writer, Event::End(BytesEnd::new("soap:Body")))?;
    write(&mut writer, Event::End(BytesEnd::new("soap:Envelope")))?;

    String::from_utf8(writer.into_inner()).map_err(|err| InvocationError::Envelope {
        reason: err.to_string(),
    })
}

fn write_header(writer: &mut Writer<Vec<u8>>, header: &SoapHeader) -> Result<(), InvocationError> {
    if header.is_raw() {
        writer
            .get_mut()
            .extend_from_slice(header.name().trim().as_bytes());
        return Ok(());
    }

    let name = format!("{}:{}", header.alias(), header.name());
    let mut start = BytesStart::new(name.as_str());
    let key = format!("xmlns:{}", header.alias());
    start.push_attribute((key.as_str(), header.namespace()));

    if header.value().is_empty() {
        write(writer, Event::Empty(start))
    } else {
        write(writer, Event::Start(start))?;
        write(writer, Event::Text(BytesText::new(header.value())))?;
        write(writer, Event::End(BytesEnd::new(name.as_str())))
    }
}

fn write_operation(
    writer: &mut Writer<Vec<u8>>,
    operation: &Operation,
    target_namespace: Option<&str>,
    body: &Value,
) -> Result<(), InvocationError> {
    let (prefix, local, namespace) = match operation.input() {
        Some(input) => (input.prefix(), input.local(), input.namespace()),
        None => (Some("tns"), operation.name(), target_namespace),
    };
    let name = qualify(prefix, local);

    let mut start = BytesStart::new(name.as_str());
    if let Some(namespace) = namespace {
        let key = prefix.map_or_else(|| "xmlns".to_string(), |prefix| format!("xmlns:{prefix}"));
        start.push_attribute((key.as_str(), namespace));
    }

    match body {
        Value::Object(fields) => write_fields(writer, start, &name, fields, prefix),
        Value::Array(_) => Err(InvocationError::Envelope {
            reason: "the body must be an object, not an array".to_string(),
        }),
        scalar => write_scalar(writer, start, &name, scalar),
    }
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    key: &str,
    value: &Value,
    prefix: Option<&str>,
) -> Result<(), InvocationError> {
    let name = if key.contains(':') {
        key.to_string()
    } else {
        qualify(prefix, key)
    };

    let start = BytesStart::new(name.as_str());
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, key, item, prefix)?;
            }
            Ok(())
        }
        Value::Object(fields) => write_fields(writer, start, &name, fields, prefix),
        scalar => write_scalar(writer, start, &name, scalar),
    }
}

fn write_fields(
    writer: &mut Writer<Vec<u8>>,
    mut start: BytesStart<'_>,
    name: &str,
    fields: &Map<String, Value>,
    prefix: Option<&str>,
) -> Result<(), InvocationError> {
    let attributes = ATTRIBUTE_KEYS
        .iter()
        .find_map(|key| fields.get(*key))
        .and_then(Value::as_object);
    for (key, value) in attributes.into_iter().flatten() {
        start.push_attribute((key.as_str(), scalar_text(value).as_str()));
    }

    let text = TEXT_KEYS
        .iter()
        .find_map(|key| fields.get(*key))
        .map(scalar_text);
    let mut children = fields
        .iter()
        .filter(|(key, _)| !is_reserved(key))
        .peekable();

    if text.is_none() && children.peek().is_none() {
        return write(writer, Event::Empty(start));
    }

    write(writer, Event::Start(start))?;
    if let Some(text) = text {
        write(writer, Event::Text(BytesText::new(&text)))?;
    }
    for (key, value) in children {
        write_element(writer, key, value, prefix)?;
    }
    write(writer, Event::End(BytesEnd::new(name)))
}

fn write_scalar(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    name: &str,
    value: &Value,
) -> Result<(), InvocationError> {
    if value.is_null() {
        return write(writer, Event::Empty(start));
    }
    write(writer, Event::Start(start))?;
    write(writer, Event::Text(BytesText::new(&scalar_text(value))))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn is_reserved(key: &str) -> bool {
    ATTRIBUTE_KEYS.contains(&key) || TEXT_KEYS.contains(&key)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn qualify(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
        _ => local.to_string(),
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), InvocationError> {
    writer
        .write_event(event)
        .map_err(|err| InvocationError::Envelope {
            reason: err.to_string(),
        })
}
