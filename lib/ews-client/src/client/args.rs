use indexmap::IndexMap;
use serde_json::Value;

use crate::soap::SoapHeader;

/// Arguments of a remote operation: the body payload and optional SOAP headers.
///
/// Built either with the builder methods or from a JSON value of the shape
/// `{ "body": ..., "headers": { "<namespace>": ["<header>", ...] } }`.
///
/// When the `body` field is missing or empty (`null`, `false`, `0`, `""`),
/// the whole value is the payload, as is, and no header is attached.
///
/// # Example
///
/// ```rust
/// use ews_client::OperationArgs;
/// use serde_json::json;
///
/// let args = OperationArgs::new(json!({ "Foo": 1 }))
///     .with_header("urn:ns1", "Header1");
///
/// let same = OperationArgs::from(json!({
///     "body": { "Foo": 1 },
///     "headers": { "urn:ns1": ["Header1"] }
/// }));
///
/// assert_eq!(args, same);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationArgs {
    body: Value,
    headers: IndexMap<String, Vec<String>>,
}

impl OperationArgs {
    /// Creates arguments with the given body and no headers.
    pub fn new(body: Value) -> Self {
        Self {
            body,
            headers: IndexMap::new(),
        }
    }

    /// Adds a header name in the given namespace.
    ///
    /// Headers of a namespace keep their insertion order.
    #[must_use]
    pub fn with_header(mut self, namespace: impl Into<String>, header: impl Into<String>) -> Self {
        self.headers
            .entry(namespace.into())
            .or_default()
            .push(header.into());
        self
    }

    /// The payload sent as the operation element.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Header names grouped by namespace.
    pub fn headers(&self) -> &IndexMap<String, Vec<String>> {
        &self.headers
    }

    /// The SOAP headers to attach: one empty-valued header aliased `ns`
    /// for every (namespace, header) pair.
    pub fn soap_headers(&self) -> impl Iterator<Item = SoapHeader> + '_ {
        self.headers.iter().flat_map(|(namespace, names)| {
            names
                .iter()
                .map(move |name| SoapHeader::new(name.clone(), namespace.clone()))
        })
    }
}

impl From<Value> for OperationArgs {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(mut fields) if fields.get("body").is_some_and(is_present) => {
                let body = fields.remove("body").unwrap_or_default();
                let headers = fields.get("headers").map(header_names).unwrap_or_default();
                Self { body, headers }
            }
            other => Self::new(other),
        }
    }
}

/// `null`, `false`, zero and the empty string do not count as a body.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number.abs() > 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn header_names(headers: &Value) -> IndexMap<String, Vec<String>> {
    let Some(namespaces) = headers.as_object() else {
        return IndexMap::new();
    };

    namespaces
        .iter()
        .map(|(namespace, names)| {
            let names = names
                .as_array()
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default();
            (namespace.clone(), names)
        })
        .collect()
}
