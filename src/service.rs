//! Request dispatch.
//!
//! [`RelayService`] is the hyper service handed to every connection. It answers
//! preflights locally, relays the three fixed routes and rejects everything
//! else with `404 Not Found`. All of its responses carry the allow-all origin
//! header.

use std::{net::SocketAddr, pin::Pin, sync::Arc};

use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt as _, Empty, combinators::BoxBody};
use hyper::{
    body::{Bytes, Incoming},
    service::Service as HyperService,
};
use tracing::{debug, warn};

use crate::{cors, relay::relay, route::Route, upstream::Upstream};

/// Body type of every response the relay produces.
pub type ResponseBody = BoxBody<Bytes, hyper::Error>;

/// Builds a response with `status` and an empty body.
pub fn empty_response(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(
        Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed(),
    );
    *response.status_mut() = status;
    response
}

#[derive(Debug, Clone)]
pub struct RelayService {
    upstream: Arc<Upstream>,

    /// Peer of the connection this copy serves
    pub from: SocketAddr,
}

impl RelayService {
    pub fn new(upstream: Arc<Upstream>) -> Self {
        Self {
            upstream,
            from: SocketAddr::from(([0, 0, 0, 0], 0)),
        }
    }

    /// Copy of this service bound to a connection from `from`.
    pub fn for_peer(&self, from: SocketAddr) -> Self {
        Self {
            upstream: Arc::clone(&self.upstream),
            from,
        }
    }
}

impl HyperService<Request<Incoming>> for RelayService {
    type Response = Response<ResponseBody>;

    type Error = anyhow::Error;

    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    /// Dispatches one request.
    ///
    /// An upstream that cannot be opened resolves the future to an error, which
    /// makes hyper drop the connection instead of answering.
    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let (parts, _body) = req.into_parts();
        debug!("Processing request from {}: {} {}", self.from, parts.method, parts.uri);

        if parts.method == Method::OPTIONS {
            return Box::pin(async move { Ok(cors::preflight(&parts)) });
        }

        let Some(route) = Route::find(&parts.method, parts.uri.path()) else {
            warn!("No route for request: {} {}", parts.method, parts.uri);
            return Box::pin(async {
                Ok(cors::allow_any_origin(empty_response(StatusCode::NOT_FOUND)))
            });
        };

        let upstream = Arc::clone(&self.upstream);
        Box::pin(async move {
            let response = relay(&upstream, route).await?;
            Ok(cors::allow_any_origin(response))
        })
    }
}

#[cfg(test)]
mod tests {
    use http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
    use http_body_util::BodyExt as _;

    use super::*;

    #[tokio::test]
    async fn empty_response_has_status_and_no_body() {
        let response = empty_response(StatusCode::NOT_FOUND);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn for_peer_shares_upstream() {
        let upstream = Arc::new(Upstream::new(&crate::config::Config::default()).unwrap());
        let service = RelayService::new(Arc::clone(&upstream));
        let peer: SocketAddr = "10.0.0.7:51000".parse().unwrap();

        let bound = service.for_peer(peer);
        assert_eq!(bound.from, peer);
        assert!(Arc::ptr_eq(&bound.upstream, &upstream));
    }
}
