use http::Uri;

/// Joins an upstream base URI with a route's path and query.
///
/// The base supplies scheme and authority plus an optional path prefix; any
/// query on the base is discarded. Exactly one `/` separates the prefix from
/// the appended path.
///
/// # Arguments
///
/// * `base` - The upstream base URI providing scheme, authority and path prefix
/// * `path_and_query` - The route's upstream path, optionally followed by `?query`
///
/// # Returns
///
/// Returns the combined absolute URI, or an `http::Error` if the result is not
/// a valid URI.
///
/// # Examples
///
/// ```
/// use http::Uri;
/// use mbta_relay::utils::upstream_uri;
///
/// let base = "https://api-v3.mbta.com/".parse::<Uri>().unwrap();
/// let uri = upstream_uri(&base, "/stops?filter[route]=Red").unwrap();
/// assert_eq!(uri.to_string(), "https://api-v3.mbta.com/stops?filter[route]=Red");
/// ```
pub fn upstream_uri(base: &Uri, path_and_query: &str) -> Result<Uri, http::Error> {
    let (append_path, append_query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };

    let mut full = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        append_path.trim_start_matches('/')
    );
    if let Some(query) = append_query.filter(|query| !query.is_empty()) {
        full.push('?');
        full.push_str(query);
    }

    let mut parts = base.clone().into_parts();
    parts.path_and_query = Some(full.parse()?);
    Ok(Uri::from_parts(parts)?)
}
