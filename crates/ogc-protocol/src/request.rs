//! Typed OGC requests.

use ogc_common::{normalize_params, ParamMap};

use crate::OgcService;

/// One inbound OGC call, reduced to its canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    /// Upper-case service type.
    pub service: OgcService,
    /// Lower-cased operation name (`getmap`, `getfeature`, ...).
    pub operation: Option<String>,
    /// Protocol version. A version found in an XML body overrides the KVP one.
    pub version: Option<String>,
    /// All parameters with lower-cased keys, sorted.
    pub params: ParamMap,
    /// Raw XML request document, when the request was posted as XML.
    pub request_xml: Option<String>,
}

impl ServiceRequest {
    /// Look up a parameter by lower-case name.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Check the operation name, case-insensitively.
    pub fn is_operation(&self, name: &str) -> bool {
        self.operation
            .as_deref()
            .map(|op| op.eq_ignore_ascii_case(name))
            .unwrap_or(false)
    }

    /// Parameters as they are forwarded to the map server and hashed into
    /// cache keys.
    pub fn forward_params(&self) -> ParamMap {
        normalize_params(self.params.clone())
    }
}

/// WMS request (GetCapabilities, GetMap, GetFeatureInfo, GetLegendGraphic, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct WmsRequest(pub ServiceRequest);

impl WmsRequest {
    pub fn layers(&self) -> Option<&str> {
        self.0.param("layers")
    }

    /// Requested CRS: `CRS` in WMS 1.3.0, `SRS` in 1.1.1.
    pub fn crs(&self) -> Option<&str> {
        self.0.param("crs").or_else(|| self.0.param("srs"))
    }

    /// GetMap requests flagged as tiled by the web client are cacheable.
    pub fn is_tiled_getmap(&self) -> bool {
        self.0.is_operation("getmap")
            && self
                .0
                .param("tiled")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
    }
}

/// WFS request (GetCapabilities, DescribeFeatureType, GetFeature, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct WfsRequest(pub ServiceRequest);

impl WfsRequest {
    /// Feature type name, `TYPENAME` in WFS 1.x and `TYPENAMES` in 2.0.
    pub fn typename(&self) -> Option<&str> {
        self.0
            .param("typename")
            .or_else(|| self.0.param("typenames"))
    }

    pub fn output_format(&self) -> Option<&str> {
        self.0.param("outputformat")
    }
}

/// WMTS request (GetCapabilities, GetTile, GetFeatureInfo).
#[derive(Debug, Clone, PartialEq)]
pub struct WmtsRequest(pub ServiceRequest);

impl WmtsRequest {
    pub fn layer(&self) -> Option<&str> {
        self.0.param("layer")
    }

    pub fn tile_matrix_set(&self) -> Option<&str> {
        self.0.param("tilematrixset")
    }

    pub fn is_get_tile(&self) -> bool {
        self.0.is_operation("gettile")
    }

    /// Key of the tile inside its layer cache profile.
    pub fn tile_key(&self) -> Option<String> {
        Some(format!(
            "{}/{}/{}/{}",
            self.0.param("tilematrix")?,
            self.0.param("tilerow")?,
            self.0.param("tilecol")?,
            self.0.param("format").unwrap_or("image/png"),
        ))
    }
}

/// A request built for one of the supported services.
#[derive(Debug, Clone, PartialEq)]
pub enum OgcRequest {
    Wms(WmsRequest),
    Wfs(WfsRequest),
    Wmts(WmtsRequest),
}

impl OgcRequest {
    pub(crate) fn from_service_request(request: ServiceRequest) -> Self {
        match request.service {
            OgcService::Wms => OgcRequest::Wms(WmsRequest(request)),
            OgcService::Wfs => OgcRequest::Wfs(WfsRequest(request)),
            OgcService::Wmts => OgcRequest::Wmts(WmtsRequest(request)),
        }
    }

    pub fn service(&self) -> OgcService {
        self.inner().service
    }

    pub fn inner(&self) -> &ServiceRequest {
        match self {
            OgcRequest::Wms(r) => &r.0,
            OgcRequest::Wfs(r) => &r.0,
            OgcRequest::Wmts(r) => &r.0,
        }
    }

    pub fn into_inner(self) -> ServiceRequest {
        match self {
            OgcRequest::Wms(r) => r.0,
            OgcRequest::Wfs(r) => r.0,
            OgcRequest::Wmts(r) => r.0,
        }
    }

    /// The `(layers, crs)` pair naming the cache profile of a cacheable
    /// request, or `None` when responses must not be cached.
    pub fn cache_scope(&self) -> Option<(String, String)> {
        match self {
            OgcRequest::Wmts(r) if r.is_get_tile() => {
                Some((r.layer()?.to_string(), r.tile_matrix_set()?.to_string()))
            }
            OgcRequest::Wms(r) if r.is_tiled_getmap() => {
                Some((r.layers()?.to_string(), r.crs()?.to_string()))
            }
            _ => None,
        }
    }

    /// Key of the response inside its cache profile.
    pub fn cache_entry_key(&self) -> Option<String> {
        match self {
            OgcRequest::Wmts(r) => r.tile_key(),
            _ => {
                let params = self.inner().forward_params();
                Some(
                    params
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect::<Vec<_>>()
                        .join("&"),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(service: OgcService, params: &[(&str, &str)]) -> OgcRequest {
        let params: ParamMap = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OgcRequest::from_service_request(ServiceRequest {
            service,
            operation: params.get("request").cloned(),
            version: None,
            params,
            request_xml: None,
        })
    }

    #[test]
    fn test_wmts_gettile_cache_scope() {
        let req = request(
            OgcService::Wmts,
            &[
                ("request", "gettile"),
                ("layer", "quartiers"),
                ("tilematrixset", "EPSG:3857"),
                ("tilematrix", "12"),
                ("tilerow", "1480"),
                ("tilecol", "2101"),
                ("format", "image/png"),
            ],
        );
        assert_eq!(
            req.cache_scope(),
            Some(("quartiers".to_string(), "EPSG:3857".to_string()))
        );
        assert_eq!(req.cache_entry_key().as_deref(), Some("12/1480/2101/image/png"));
    }

    #[test]
    fn test_wms_getmap_needs_tiled_flag() {
        let plain = request(
            OgcService::Wms,
            &[("request", "getmap"), ("layers", "trees"), ("crs", "EPSG:2154")],
        );
        assert_eq!(plain.cache_scope(), None);

        let tiled = request(
            OgcService::Wms,
            &[
                ("request", "getmap"),
                ("layers", "trees"),
                ("srs", "EPSG:2154"),
                ("tiled", "TRUE"),
            ],
        );
        assert_eq!(
            tiled.cache_scope(),
            Some(("trees".to_string(), "EPSG:2154".to_string()))
        );
    }

    #[test]
    fn test_wfs_is_never_cached() {
        let req = request(OgcService::Wfs, &[("request", "getfeature"), ("typename", "parks")]);
        assert_eq!(req.cache_scope(), None);
        if let OgcRequest::Wfs(wfs) = &req {
            assert_eq!(wfs.typename(), Some("parks"));
        } else {
            panic!("expected a WFS request");
        }
    }
}
