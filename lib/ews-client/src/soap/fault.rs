use quick_xml::Reader;
use quick_xml::events::Event;

/// A SOAP fault found in a response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SoapFault {
    pub(crate) code: String,
    pub(crate) message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Code,
    Message,
}

impl SoapFault {
    /// Finds the `Fault` element of the envelope body.
    ///
    /// Both SOAP 1.1 (`faultcode`, `faultstring`) and SOAP 1.2 (`Code/Value`,
    /// `Reason/Text`) layouts are recognized. Malformed documents yield `None`,
    /// the caller then decides from the HTTP status.
    pub(crate) fn find(xml: &str) -> Option<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut fault: Option<Self> = None;
        let mut field = None;

        loop {
            match reader.read_event().ok()? {
                Event::Start(element) => {
                    let local = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                    path.push(local);
                    let parents: Vec<&str> = path.iter().map(String::as_str).collect();
                    match parents.as_slice() {
                        [.., "Body", "Fault"] => fault = Some(Self::default()),
                        [.., "Fault", "faultcode"] | [.., "Fault", "Code", "Value"] => {
                            field = Some(Field::Code);
                        }
                        [.., "Fault", "faultstring"] | [.., "Fault", "Reason", "Text"] => {
                            field = Some(Field::Message);
                        }
                        _ => {}
                    }
                }
                Event::Empty(element) if element.local_name().as_ref() == b"Fault" => {
                    if path.last().map(String::as_str) == Some("Body") {
                        return Some(Self::default());
                    }
                }
                Event::Text(text) => {
                    if let (Some(fault), Some(field)) = (fault.as_mut(), field) {
                        let text = text.unescape().ok()?.into_owned();
                        match field {
                            Field::Code => fault.code.push_str(&text),
                            Field::Message => fault.message.push_str(&text),
                        }
                    }
                }
                Event::End(_) => {
                    field = None;
                    if path.pop().as_deref() == Some("Fault") && fault.is_some() {
                        return fault;
                    }
                }
                Event::Eof => return fault,
                _ => {}
            }
        }
    }
}
