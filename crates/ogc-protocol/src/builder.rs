//! Request builder: turns a loose parameter bag, or a posted XML document,
//! into a typed OGC request.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use ogc_common::{ParamMap, ProxyError, ProxyResult};

use crate::request::{OgcRequest, ServiceRequest};
use crate::OgcService;

/// What the root element of an OGC XML request document tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlRequestInfo {
    /// Local name of the root element (`GetFeature`, `Transaction`, ...).
    pub operation: String,
    /// `service` attribute of the root element.
    pub service: Option<String>,
    /// `version` attribute of the root element.
    pub version: Option<String>,
}

/// Parse an XML request document and extract its root element information.
///
/// The whole document is read so that truncated or mismatched documents
/// are rejected, not just a broken root tag.
pub fn parse_request_xml(xml: &str) -> ProxyResult<XmlRequestInfo> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut info: Option<XmlRequestInfo> = None;
    let mut depth: usize = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if info.is_none() {
                    info = Some(root_info(&e)?);
                }
                depth += 1;
            }
            Ok(Event::Empty(e)) => {
                if info.is_none() {
                    info = Some(root_info(&e)?);
                }
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ProxyError::InvalidXml(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if depth != 0 {
        return Err(ProxyError::InvalidXml(format!(
            "{} element(s) left unclosed",
            depth
        )));
    }

    info.ok_or_else(|| ProxyError::InvalidXml("document has no root element".to_string()))
}

fn root_info(element: &BytesStart<'_>) -> ProxyResult<XmlRequestInfo> {
    let operation = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
    let mut service = None;
    let mut version = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ProxyError::InvalidXml(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| ProxyError::InvalidXml(e.to_string()))?
            .into_owned();
        match attr.key.local_name().as_ref() {
            b"service" => service = Some(value),
            b"version" => version = Some(value),
            _ => {}
        }
    }

    Ok(XmlRequestInfo {
        operation,
        service,
        version,
    })
}

/// Build an OGC request from request parameters and an optional XML body.
///
/// The XML body is only considered when, once trimmed, it starts with `<`.
/// An XML body that fails to parse is logged and ignored; the parameter bag
/// is then used instead. Returns `None` when no service can be determined or
/// the service is not one of WMS, WFS or WMTS: such calls are not OGC
/// requests for this proxy.
pub fn build<I, K, V>(params: I, request_xml: Option<&str>) -> Option<OgcRequest>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut params: ParamMap = params
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
        .collect();

    let mut xml = request_xml
        .map(str::trim)
        .filter(|body| body.starts_with('<'));

    let mut service: Option<String> = None;
    let mut operation: Option<String> = None;
    let mut version: Option<String> = None;

    if let Some(body) = xml {
        match parse_request_xml(body) {
            Ok(info) => {
                operation = Some(info.operation.to_lowercase());
                service = info.service.map(|s| s.to_uppercase());
                version = info.version;
            }
            Err(e) => {
                warn!(
                    target: "admin",
                    error = %e,
                    request_xml = body,
                    "An error has been raised when loading the request XML"
                );
                xml = None;
            }
        }
    }

    if xml.is_none() {
        if let Some(s) = params.get("service") {
            service = Some(s.to_uppercase());
            operation = params.get("request").map(|r| r.to_lowercase());
        }
    }

    let service = service?;
    params.insert("service".to_string(), service.clone());
    if let Some(op) = &operation {
        params.insert("request".to_string(), op.clone());
    }
    if let Some(v) = &version {
        params.insert("version".to_string(), v.clone());
    }

    let service = OgcService::parse(&service)?;
    let version = version.or_else(|| params.get("version").cloned());

    Some(OgcRequest::from_service_request(ServiceRequest {
        service,
        operation,
        version,
        params,
        request_xml: xml.map(str::to_string),
    }))
}
