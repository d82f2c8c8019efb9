//! Common test fixtures for ogc-proxy tests.
//!
//! This module provides pre-defined request data that represents common
//! scenarios in map server proxying.

use tempfile::TempDir;

/// Common bounding box strings for testing.
pub mod bbox {
    /// Projected extent around Montpellier, EPSG:3857
    pub const MONTPELLIER: &str = "417006.613738,5394910.3409,447158.048911,5414844.99481";

    /// Same extent with float jitter past the sixth decimal
    pub const MONTPELLIER_JITTER: &str =
        "417006.6137380000001,5394910.34090000002,447158.048911,5414844.99481";

    /// Geographic extent with a 1e-7 offset on the first coordinate
    pub const NEAR_UNIT: &str = "1.0000001,2,3,4";
}

/// Common query parameter bags.
pub mod params {
    /// A WMS GetMap request as a browser client sends it.
    pub fn wms_getmap() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SERVICE", "WMS"),
            ("REQUEST", "GetMap"),
            ("VERSION", "1.3.0"),
            ("LAYERS", "quartiers"),
            ("STYLES", ""),
            ("CRS", "EPSG:3857"),
            ("BBOX", super::bbox::MONTPELLIER),
            ("WIDTH", "256"),
            ("HEIGHT", "256"),
            ("FORMAT", "image/png"),
            ("repository", "montpellier"),
            ("project", "montpellier"),
        ]
    }

    /// A WMTS GetTile request in KVP encoding.
    pub fn wmts_gettile() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SERVICE", "WMTS"),
            ("REQUEST", "GetTile"),
            ("VERSION", "1.0.0"),
            ("LAYER", "quartiers"),
            ("STYLE", "default"),
            ("TILEMATRIXSET", "EPSG:3857"),
            ("TILEMATRIX", "12"),
            ("TILEROW", "1495"),
            ("TILECOL", "2089"),
            ("FORMAT", "image/png"),
        ]
    }

    /// A WFS GetFeature request.
    pub fn wfs_getfeature() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SERVICE", "WFS"),
            ("REQUEST", "GetFeature"),
            ("VERSION", "1.0.0"),
            ("TYPENAME", "quartiers"),
            ("OUTPUTFORMAT", "GeoJSON"),
        ]
    }
}

/// Common XML request bodies.
pub mod xml {
    /// A WFS GetFeature POST body.
    pub const WFS_GETFEATURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs" service="WFS" version="1.1.0" outputFormat="GML2">
  <wfs:Query typeName="quartiers"/>
</wfs:GetFeature>"#;

    /// A WFS Transaction without a `service` attribute.
    pub const WFS_NO_SERVICE: &str = r#"<wfs:Transaction xmlns:wfs="http://www.opengis.net/wfs" version="1.1.0"><wfs:Insert/></wfs:Transaction>"#;

    /// A document missing its closing root tag.
    pub const MALFORMED: &str = r#"<wfs:GetFeature service="WFS" version="1.1.0"><wfs:Query typeName="quartiers"/>"#;
}

/// A fresh, writable cache root that is removed on drop.
pub fn temp_cache_root() -> TempDir {
    tempfile::Builder::new()
        .prefix("ogc-proxy-cache")
        .tempdir()
        .unwrap_or_else(|e| panic!("Failed to create temp cache root: {}", e))
}

/// Create `relative` (with its parents) under `root` as an empty file.
pub fn touch(root: &std::path::Path, relative: &str) -> std::path::PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("mkdir failed: {}", e));
    }
    std::fs::write(&path, b"").unwrap_or_else(|e| panic!("write failed: {}", e));
    path
}
