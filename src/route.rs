//! The fixed route table.
//!
//! Each inbound path maps onto exactly one upstream path and query. Nothing
//! from the inbound request other than its method and path is used.

use http::Method;

/// Restricts vehicles and stops to the subway lines.
const SUBWAY_FILTER: &str = "filter[route]=Red,Orange,Green-B,Green-C,Green-D,Green-E,Blue";

pub const EVENT_STREAM: &str = "text/event-stream";
pub const JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Inbound path, matched exactly
    pub path: &'static str,
    /// Upstream path relative to the configured base
    pub upstream_path: &'static str,
    /// Fixed upstream query, if any
    pub upstream_query: Option<&'static str>,
    /// `Accept` sent upstream; omitted when `None`
    pub accept: Option<&'static str>,
    /// `Content-Type` reported to the caller
    pub content_type: &'static str,
}

pub static ROUTES: [Route; 3] = [
    Route {
        path: "/vehicles",
        upstream_path: "/vehicles",
        upstream_query: Some(SUBWAY_FILTER),
        accept: Some(EVENT_STREAM),
        content_type: EVENT_STREAM,
    },
    Route {
        path: "/routes",
        upstream_path: "/routes",
        upstream_query: None,
        accept: None,
        content_type: JSON,
    },
    Route {
        path: "/stops",
        upstream_path: "/stops",
        upstream_query: Some(SUBWAY_FILTER),
        accept: None,
        content_type: JSON,
    },
];

impl Route {
    /// Finds the route serving `method` on `path`. Only `GET` is routed.
    pub fn find(method: &Method, path: &str) -> Option<&'static Route> {
        if *method != Method::GET {
            return None;
        }
        ROUTES.iter().find(|route| route.path == path)
    }

    /// Upstream path with its fixed query appended.
    pub fn upstream_path_and_query(&self) -> String {
        match self.upstream_query {
            Some(query) => format!("{}?{}", self.upstream_path, query),
            None => self.upstream_path.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_each_get_route() {
        for path in ["/vehicles", "/routes", "/stops"] {
            let route = Route::find(&Method::GET, path).unwrap();
            assert_eq!(route.path, path);
        }
    }

    #[test]
    fn other_methods_and_paths_are_not_routed() {
        assert!(Route::find(&Method::POST, "/routes").is_none());
        assert!(Route::find(&Method::GET, "/routes/").is_none());
        assert!(Route::find(&Method::GET, "/trips").is_none());
    }

    #[test]
    fn only_vehicles_streams() {
        let vehicles = Route::find(&Method::GET, "/vehicles").unwrap();
        assert_eq!(vehicles.accept, Some(EVENT_STREAM));
        assert_eq!(vehicles.content_type, EVENT_STREAM);

        for path in ["/routes", "/stops"] {
            let route = Route::find(&Method::GET, path).unwrap();
            assert_eq!(route.accept, None);
            assert_eq!(route.content_type, JSON);
        }
    }

    #[test]
    fn fixed_queries() {
        let stops = Route::find(&Method::GET, "/stops").unwrap();
        assert_eq!(
            stops.upstream_path_and_query(),
            "/stops?filter[route]=Red,Orange,Green-B,Green-C,Green-D,Green-E,Blue"
        );
        let routes = Route::find(&Method::GET, "/routes").unwrap();
        assert_eq!(routes.upstream_path_and_query(), "/routes");
    }
}
