//! OGC request model for the map server proxy.
//!
//! Supports:
//! - WMS, WFS and WMTS requests in KVP form (query string or form body)
//! - XML request documents posted by WFS clients (GetFeature, Transaction)

pub mod builder;
pub mod exceptions;
pub mod request;
pub mod service;

pub use builder::{build, parse_request_xml, XmlRequestInfo};
pub use exceptions::{ogc_exception, wms_exception, wmts_exception};
pub use request::{OgcRequest, ServiceRequest, WfsRequest, WmsRequest, WmtsRequest};
pub use service::OgcService;
