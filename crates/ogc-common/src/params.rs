//! OGC request parameter normalization.
//!
//! Incoming parameters arrive as a loose bag of key/value pairs. Before they
//! are used to derive a cache key or forwarded to the map server they are
//! filtered, lower-cased and sorted, and the BBOX is quantized so that
//! client-side floating point jitter does not fragment the cache.

use std::collections::BTreeMap;

/// Normalized parameters: lower-cased keys, sorted by key.
pub type ParamMap = BTreeMap<String, String>;

/// Parameters owned by the web application routing layer. They never change
/// the map server output.
pub const PARAMS_BLOCKLIST: &[&str] = &["module", "action", "c", "repository", "project"];

/// Number of decimals kept for each BBOX coordinate.
const BBOX_PRECISION: i32 = 6;

/// Filter and normalize request parameters.
///
/// Blocklisted keys are dropped, remaining keys are lower-cased (a later
/// duplicate wins) and the BBOX coordinates are rounded to 6 decimals.
pub fn normalize_params<I, K, V>(params: I) -> ParamMap
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut data = ParamMap::new();

    for (key, value) in params {
        let key = key.as_ref().to_lowercase();
        if PARAMS_BLOCKLIST.contains(&key.as_str()) {
            continue;
        }
        data.insert(key, value.into());
    }

    if let Some(bbox) = data.get_mut("bbox") {
        *bbox = normalize_bbox(bbox);
    }

    data
}

/// Round every comma separated BBOX component to 6 decimal places.
///
/// Components that are not numbers are read the lenient way map clients
/// expect: the longest numeric prefix is used, or 0 when there is none.
pub fn normalize_bbox(bbox: &str) -> String {
    let factor = 10f64.powi(BBOX_PRECISION);

    bbox.split(',')
        .map(|component| {
            let value = parse_leading_float(component);
            let rounded = (value * factor).round() / factor;
            rounded.to_string()
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_leading_float(raw: &str) -> f64 {
    let trimmed = raw.trim();
    (1..=trimmed.len())
        .rev()
        .filter(|end| trimmed.is_char_boundary(*end))
        .find_map(|end| trimmed[..end].parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Build a GET URL for the map server from a parameter map.
///
/// A `?` is appended to the base URL when missing. Only ASCII alphanumerics
/// are left unescaped, spaces become `%20`: QGIS Server decodes `+` and the
/// unreserved punctuation inconsistently between versions.
pub fn construct_url(params: &ParamMap, base_url: &str) -> String {
    let mut url = base_url.to_string();
    if !url.ends_with('?') {
        url.push('?');
    }

    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
        .collect::<Vec<_>>()
        .join("&");

    url.push_str(&query);
    url
}

fn encode_component(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace('_', "%5F")
        .replace('.', "%2E")
        .replace('-', "%2D")
        .replace('*', "%2A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocklist_is_case_insensitive() {
        let params = normalize_params(vec![
            ("Module", "lizmap"),
            ("ACTION", "service:index"),
            ("repository", "demo"),
            ("Project", "parks"),
            ("c", "service"),
            ("LAYERS", "trees"),
        ]);
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("layers").map(String::as_str), Some("trees"));
    }

    #[test]
    fn test_bbox_rounding() {
        assert_eq!(normalize_bbox("1.0000001,2,3,4"), "1,2,3,4");
        assert_eq!(normalize_bbox("-125.1234567,24.5,-66.25,50"), "-125.123457,24.5,-66.25,50");
    }

    #[test]
    fn test_bbox_lenient_components() {
        assert_eq!(normalize_bbox("abc, 12 ,3.5xyz,"), "0,12,3.5,0");
    }

    #[test]
    fn test_construct_url_escaping() {
        let mut params = ParamMap::new();
        params.insert("layers".into(), "my_layer.v-2".into());
        params.insert("map".into(), "a b+c".into());

        let url = construct_url(&params, "http://qgis/ows");
        assert_eq!(
            url,
            "http://qgis/ows?layers=my%5Flayer%2Ev%2D2&map=a%20b%2Bc"
        );
    }

    #[test]
    fn test_construct_url_keeps_trailing_question_mark() {
        let mut params = ParamMap::new();
        params.insert("service".into(), "WMS".into());
        assert_eq!(construct_url(&params, "http://qgis/ows?"), "http://qgis/ows?service=WMS");
    }
}
