use std::collections::HashMap;

/// Parse query parameters from a URI string.
///
/// Values are URL-decoded. A repeated key keeps its last value; a key without
/// `=` maps to an empty string.
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let Some((_, query)) = uri.split_once('?') else {
        return HashMap::new();
    };

    query
        .split('&')
        .filter(|param| !param.is_empty())
        .map(|param| match param.split_once('=') {
            Some((key, value)) => (key.to_string(), decode(value)),
            None => (param.to_string(), String::new()),
        })
        .collect()
}

fn decode(value: &str) -> String {
    // `+` is a space in form-encoded query strings.
    let value = value.replace('+', " ");
    match urlencoding::decode(&value) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => value.clone(),
    }
}

/// Get a string parameter from parsed query params with optional default
pub fn get_string(params: &HashMap<String, String>, key: &str, default: Option<&str>) -> Option<String> {
    params
        .get(key)
        .cloned()
        .or_else(|| default.map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_values() {
        let params = parse_query_params("/api/user?search=Jo%C3%A3o+Silva&flag");
        assert_eq!(params.get("search").map(String::as_str), Some("João Silva"));
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
    }

    #[test]
    fn no_query_means_no_params() {
        assert!(parse_query_params("/api/user").is_empty());
        assert_eq!(
            get_string(&parse_query_params("/api/user"), "search", Some("")),
            Some(String::new())
        );
    }
}
