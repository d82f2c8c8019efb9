//! OGC service identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Services the proxy knows how to forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OgcService {
    Wms,
    Wfs,
    Wmts,
}

impl OgcService {
    /// Parse a service name, case-insensitively.
    ///
    /// Unknown services yield `None`: they are not OGC requests this proxy
    /// handles, which is not an error in itself.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "WMS" => Some(Self::Wms),
            "WFS" => Some(Self::Wfs),
            "WMTS" => Some(Self::Wmts),
            _ => None,
        }
    }

    /// Canonical upper-case name, as QGIS Server expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wms => "WMS",
            Self::Wfs => "WFS",
            Self::Wmts => "WMTS",
        }
    }
}

impl fmt::Display for OgcService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
