//! Tests for building typed OGC requests from inbound parameters.

use ogc_protocol::{build, OgcRequest, OgcService};

fn kvp(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// Parameter bag
// ============================================================================

#[test]
fn test_build_wms_from_params() {
    let req = build(kvp(&[("SERVICE", "wms"), ("REQUEST", "GetMap"), ("LAYERS", "trees")]), None)
        .expect("WMS request");

    assert_eq!(req.service(), OgcService::Wms);
    let inner = req.inner();
    assert_eq!(inner.operation.as_deref(), Some("getmap"));
    assert_eq!(inner.param("service"), Some("WMS"));
    assert_eq!(inner.param("request"), Some("getmap"));
    assert_eq!(inner.param("layers"), Some("trees"));
    assert!(matches!(req, OgcRequest::Wms(_)));
}

#[test]
fn test_build_wmts_and_wfs() {
    let wmts = build(kvp(&[("service", "WMTS"), ("request", "GetTile")]), None).unwrap();
    assert!(matches!(wmts, OgcRequest::Wmts(_)));

    let wfs = build(kvp(&[("service", "wfs"), ("request", "GetFeature")]), None).unwrap();
    assert!(matches!(wfs, OgcRequest::Wfs(_)));
}

#[test]
fn test_missing_service_yields_no_request() {
    assert!(build(kvp(&[("request", "GetMap")]), None).is_none());
    assert!(build(Vec::<(String, String)>::new(), None).is_none());
}

#[test]
fn test_unknown_service_yields_no_request() {
    assert!(build(kvp(&[("service", "WCS"), ("request", "GetCoverage")]), None).is_none());
}

#[test]
fn test_service_without_request() {
    let req = build(kvp(&[("service", "wms")]), None).unwrap();
    assert_eq!(req.inner().operation, None);
    assert_eq!(req.inner().param("request"), None);
}

#[test]
fn test_version_from_params() {
    let req = build(
        kvp(&[("service", "WMS"), ("request", "GetCapabilities"), ("VERSION", "1.3.0")]),
        None,
    )
    .unwrap();
    assert_eq!(req.inner().version.as_deref(), Some("1.3.0"));
}

#[test]
fn test_getmap_forward_params() {
    let req = build(
        kvp(&[
            ("service", "wms"),
            ("request", "GetMap"),
            ("bbox", "1.0000001,2,3,4"),
            ("repository", "demo"),
            ("project", "parks"),
        ]),
        None,
    )
    .unwrap();

    let forwarded = req.inner().forward_params();
    let entries: Vec<(&str, &str)> = forwarded
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    assert_eq!(
        entries,
        vec![("bbox", "1,2,3,4"), ("request", "getmap"), ("service", "WMS")]
    );
}

// ============================================================================
// XML body
// ============================================================================

const GET_FEATURE: &str = r#"
    <wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs" service="wfs" version="1.1.0">
      <wfs:Query typeName="parks"/>
    </wfs:GetFeature>
"#;

#[test]
fn test_build_from_xml() {
    let req = build(kvp(&[("repository", "demo"), ("version", "1.0.0")]), Some(GET_FEATURE))
        .expect("WFS request");

    assert_eq!(req.service(), OgcService::Wfs);
    let inner = req.inner();
    assert_eq!(inner.operation.as_deref(), Some("getfeature"));
    // XML version wins over the parameter bag
    assert_eq!(inner.version.as_deref(), Some("1.1.0"));
    assert_eq!(inner.param("version"), Some("1.1.0"));
    assert_eq!(inner.param("service"), Some("WFS"));
    assert!(inner.request_xml.as_deref().unwrap().starts_with("<wfs:GetFeature"));
}

#[test]
fn test_malformed_xml_falls_back_to_params() {
    let req = build(
        kvp(&[("service", "wms"), ("request", "GetLegendGraphic")]),
        Some("<not-closed"),
    )
    .expect("fallback to parameter bag");

    assert_eq!(req.service(), OgcService::Wms);
    assert_eq!(req.inner().operation.as_deref(), Some("getlegendgraphic"));
    assert_eq!(req.inner().request_xml, None);
}

#[test]
fn test_non_xml_body_is_ignored() {
    let req = build(kvp(&[("service", "wfs")]), Some("SERVICE=WFS&REQUEST=GetFeature")).unwrap();
    assert_eq!(req.inner().request_xml, None);
    assert_eq!(req.service(), OgcService::Wfs);
}

#[test]
fn test_valid_xml_without_service_yields_no_request() {
    let req = build(
        kvp(&[("service", "wfs")]),
        Some(r#"<GetFeature version="1.1.0"></GetFeature>"#),
    );
    assert!(req.is_none());
}
