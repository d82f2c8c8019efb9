//! OGC exception documents returned when the proxy itself rejects a request.

use ogc_common::ProxyError;

use crate::OgcService;

/// Generate WMS exception XML.
pub fn wms_exception(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><ServiceExceptionReport version="1.3.0"><ServiceException code="{}">{}</ServiceException></ServiceExceptionReport>"#,
        code,
        escape(message)
    )
}

/// Generate WMTS/WFS (OWS) exception XML.
pub fn wmts_exception(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/1.1" version="1.0.0">
  <ows:Exception exceptionCode="{}">
    <ows:ExceptionText>{}</ows:ExceptionText>
  </ows:Exception>
</ows:ExceptionReport>"#,
        code,
        escape(message)
    )
}

/// Exception document for an error, in the dialect of the given service.
/// Requests without a recognized service get the WMS form.
pub fn ogc_exception(service: Option<OgcService>, err: &ProxyError) -> String {
    let message = err.to_string();
    match service {
        Some(OgcService::Wmts) | Some(OgcService::Wfs) => {
            wmts_exception(err.ogc_exception_code(), &message)
        }
        _ => wms_exception(err.ogc_exception_code(), &message),
    }
}

fn escape(raw: &str) -> String {
    quick_xml::escape::escape(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_escaped() {
        let xml = wms_exception("InvalidParameterValue", "bad <value> & more");
        assert!(xml.contains("bad &lt;value&gt; &amp; more"));
    }

    #[test]
    fn test_dialect_follows_service() {
        let err = ProxyError::MissingParameter("LAYER".into());
        assert!(ogc_exception(Some(OgcService::Wmts), &err).contains("ows:ExceptionReport"));
        assert!(ogc_exception(None, &err).contains("ServiceExceptionReport"));
        assert!(ogc_exception(None, &err).contains("MissingParameterValue"));
    }
}
