//! Minimal WSDL 1.1 reader: operations of the SOAP binding and service address.

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::ClientBuildError;

/// A namespace-qualified element name, as written in the WSDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    prefix: Option<String>,
    local: String,
    namespace: Option<String>,
}

impl QualifiedName {
    fn resolve(qname: &str, namespaces: &IndexMap<String, String>) -> Self {
        let (prefix, local) = match qname.split_once(':') {
            Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
            None => (None, qname.to_string()),
        };
        let namespace = namespaces
            .get(prefix.as_deref().unwrap_or_default())
            .cloned();

        Self {
            prefix,
            local,
            namespace,
        }
    }

    /// The prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// The local name.
    pub fn local(&self) -> &str {
        &self.local
    }

    /// The namespace URI bound to the prefix, if declared.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

/// An operation of the SOAP binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: String,
    soap_action: Option<String>,
    input: Option<QualifiedName>,
}

impl Operation {
    /// The operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `soapAction` of the binding, if declared and not empty.
    pub fn soap_action(&self) -> Option<&str> {
        self.soap_action.as_deref()
    }

    /// The element sent in the SOAP body, if the messages declare it.
    pub fn input(&self) -> Option<&QualifiedName> {
        self.input.as_ref()
    }
}

/// What the SOAP client needs from a WSDL document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescription {
    target_namespace: Option<String>,
    namespaces: IndexMap<String, String>,
    operations: IndexMap<String, Operation>,
    address: Option<String>,
}

#[derive(Debug, Default)]
struct RawBindingOperation {
    soap_action: Option<String>,
    body_part: Option<String>,
}

#[derive(Debug, Default)]
struct RawDocument {
    target_namespace: Option<String>,
    namespaces: IndexMap<String, String>,
    // message name -> (part name, element qname)
    messages: IndexMap<String, Vec<(String, String)>>,
    // port type operation -> input message qname
    inputs: IndexMap<String, String>,
    bindings: IndexMap<String, RawBindingOperation>,
    address: Option<String>,
}

impl ServiceDescription {
    /// Reads the WSDL document.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError::Xml`] if the document is not well-formed.
    pub fn parse(xml: &str) -> Result<Self, ClientBuildError> {
        let raw = RawDocument::read(xml)?;
        Ok(raw.resolve())
    }

    /// The `targetNamespace` of the definitions.
    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// The namespace declarations of the root element, by prefix.
    pub fn namespaces(&self) -> &IndexMap<String, String> {
        &self.namespaces
    }

    /// The operations of the binding, in document order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    /// Looks up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// The `soap:address` location of the service port.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
}

impl RawDocument {
    fn read(xml: &str) -> Result<Self, ClientBuildError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut document = Self::default();
        let mut path: Vec<String> = Vec::new();
        let mut current_message = String::new();
        let mut current_operation = String::new();

        loop {
            match reader.read_event()? {
                Event::Start(element) => {
                    let local = local_name(&element);
                    document.visit(
                        &path,
                        &local,
                        &element,
                        &mut current_message,
                        &mut current_operation,
                    )?;
                    path.push(local);
                }
                Event::Empty(element) => {
                    let local = local_name(&element);
                    document.visit(
                        &path,
                        &local,
                        &element,
                        &mut current_message,
                        &mut current_operation,
                    )?;
                }
                Event::End(_) => {
                    path.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(document)
    }

    fn visit(
        &mut self,
        path: &[String],
        local: &str,
        element: &BytesStart<'_>,
        current_message: &mut String,
        current_operation: &mut String,
    ) -> Result<(), ClientBuildError> {
        let parents: Vec<&str> = path.iter().map(String::as_str).collect();
        match (parents.as_slice(), local) {
            ([], _) => self.read_root(element)?,
            (["definitions"], "message") => {
                *current_message = attribute(element, "name")?.unwrap_or_default();
                self.messages.entry(current_message.clone()).or_default();
            }
            (["definitions", "message"], "part") => {
                let name = attribute(element, "name")?.unwrap_or_default();
                if let Some(qname) = attribute(element, "element")? {
                    self.messages
                        .entry(current_message.clone())
                        .or_default()
                        .push((name, qname));
                }
            }
            (["definitions", "portType"], "operation")
            | (["definitions", "binding"], "operation") => {
                *current_operation = attribute(element, "name")?.unwrap_or_default();
                if parents.get(1) == Some(&"binding") {
                    self.bindings.entry(current_operation.clone()).or_default();
                }
            }
            (["definitions", "portType", "operation"], "input") => {
                if let Some(message) = attribute(element, "message")? {
                    self.inputs.insert(current_operation.clone(), message);
                }
            }
            (["definitions", "binding", "operation"], "operation") => {
                let action = attribute(element, "soapAction")?.filter(|action| !action.is_empty());
                if let Some(binding) = self.bindings.get_mut(current_operation.as_str()) {
                    binding.soap_action = action;
                }
            }
            (["definitions", "binding", "operation", "input"], "body") => {
                let part = attribute(element, "parts")?
                    .and_then(|parts| parts.split_whitespace().next().map(ToString::to_string));
                if let Some(binding) = self.bindings.get_mut(current_operation.as_str()) {
                    binding.body_part = part;
                }
            }
            (["definitions", "service", "port"], "address") => {
                if self.address.is_none() {
                    self.address = attribute(element, "location")?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn read_root(&mut self, element: &BytesStart<'_>) -> Result<(), ClientBuildError> {
        for attr in element.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            if key == "targetNamespace" {
                self.target_namespace = Some(value);
            } else if key == "xmlns" {
                self.namespaces.insert(String::new(), value);
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                self.namespaces.insert(prefix.to_string(), value);
            }
        }
        Ok(())
    }

    fn resolve(self) -> ServiceDescription {
        let operations = self
            .bindings
            .iter()
            .map(|(name, binding)| {
                let input = self
                    .inputs
                    .get(name)
                    .and_then(|message| self.messages.get(strip_prefix(message)))
                    .and_then(|parts| {
                        binding
                            .body_part
                            .as_ref()
                            .and_then(|body| parts.iter().find(|(part, _)| part == body))
                            .or_else(|| parts.first())
                    })
                    .map(|(_, element)| QualifiedName::resolve(element, &self.namespaces));

                let operation = Operation {
                    name: name.clone(),
                    soap_action: binding.soap_action.clone(),
                    input,
                };
                (name.clone(), operation)
            })
            .collect();

        ServiceDescription {
            target_namespace: self.target_namespace,
            namespaces: self.namespaces,
            operations,
            address: self.address,
        }
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, ClientBuildError> {
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn strip_prefix(qname: &str) -> &str {
    qname.split_once(':').map_or(qname, |(_, local)| local)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WSDL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<wsdl:definitions xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/" xmlns:t="http://schemas.microsoft.com/exchange/services/2006/types" xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/" xmlns:tns="http://schemas.microsoft.com/exchange/services/2006/messages" targetNamespace="http://schemas.microsoft.com/exchange/services/2006/messages">
  <wsdl:message name="FindItemSoapIn">
    <wsdl:part name="request" element="tns:FindItem"/>
    <wsdl:part name="RequestVersion" element="t:RequestServerVersion"/>
  </wsdl:message>
  <wsdl:message name="ResolveNamesSoapIn">
    <wsdl:part name="RequestVersion" element="t:RequestServerVersion"/>
    <wsdl:part name="request" element="tns:ResolveNames"/>
  </wsdl:message>
  <wsdl:portType name="ExchangeServicePortType">
    <wsdl:operation name="FindItem">
      <wsdl:input message="tns:FindItemSoapIn"/>
    </wsdl:operation>
    <wsdl:operation name="ResolveNames">
      <wsdl:input message="tns:ResolveNamesSoapIn"/>
    </wsdl:operation>
  </wsdl:portType>
  <wsdl:binding name="ExchangeServiceBinding" type="tns:ExchangeServicePortType">
    <soap:binding style="document" transport="http://schemas.xmlsoap.org/soap/http"/>
    <wsdl:operation name="FindItem">
      <soap:operation soapAction="http://schemas.microsoft.com/exchange/services/2006/messages/FindItem"/>
      <wsdl:input>
        <soap:header message="tns:FindItemSoapIn" part="RequestVersion" use="literal"/>
        <soap:body parts="request" use="literal"/>
      </wsdl:input>
    </wsdl:operation>
    <wsdl:operation name="ResolveNames">
      <soap:operation soapAction=""/>
      <wsdl:input>
        <soap:body parts="request" use="literal"/>
      </wsdl:input>
    </wsdl:operation>
  </wsdl:binding>
<wsdl:service name="ExchangeServices">
<wsdl:port name="ExchangeServicePort" binding="tns:ExchangeServiceBinding">
<soap:address location="https://mail.example.com/EWS/Exchange.asmx"/>
</wsdl:port>
</wsdl:service>
</wsdl:definitions>"#;

    #[test]
    fn should_read_binding_operations() {
        let description = ServiceDescription::parse(WSDL).expect("valid WSDL");

        let names: Vec<_> = description.operations().map(Operation::name).collect();
        assert_eq!(names, vec!["FindItem", "ResolveNames"]);
        assert_eq!(
            description.address(),
            Some("https://mail.example.com/EWS/Exchange.asmx")
        );
        assert_eq!(
            description.target_namespace(),
            Some("http://schemas.microsoft.com/exchange/services/2006/messages")
        );
        assert_eq!(description.namespaces().len(), 4);
    }

    #[test]
    fn should_resolve_input_element_from_body_part() {
        let description = ServiceDescription::parse(WSDL).expect("valid WSDL");

        let find_item = description.operation("FindItem").expect("declared");
        assert_eq!(
            find_item.soap_action(),
            Some("http://schemas.microsoft.com/exchange/services/2006/messages/FindItem")
        );
        let input = find_item.input().expect("resolved input");
        assert_eq!(input.prefix(), Some("tns"));
        assert_eq!(input.local(), "FindItem");
        assert_eq!(
            input.namespace(),
            Some("http://schemas.microsoft.com/exchange/services/2006/messages")
        );

        // the body part is not the first part of the message
        let resolve_names = description.operation("ResolveNames").expect("declared");
        assert_eq!(resolve_names.soap_action(), None);
        assert_eq!(
            resolve_names.input().map(QualifiedName::local),
            Some("ResolveNames")
        );
    }

    #[test]
    fn should_have_no_address_without_service() {
        let unpatched = r#"<wsdl:definitions xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/"></wsdl:definitions>"#;

        let description = ServiceDescription::parse(unpatched).expect("valid WSDL");

        assert_eq!(description.address(), None);
        assert_eq!(description.operations().count(), 0);
    }

    #[test]
    fn should_reject_malformed_wsdl() {
        let result =
            ServiceDescription::parse("<wsdl:definitions><wsdl:message></wsdl:definitions>");

        assert!(matches!(result, Err(ClientBuildError::Xml { .. })));
    }
}
