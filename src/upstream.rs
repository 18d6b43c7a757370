//! Outbound side of the relay: one pooled HTTPS client aimed at the transit
//! API, carrying the configured credential on every call.

use std::sync::Arc;

use anyhow::Context as _;
use http::{
    HeaderName, HeaderValue, Request, Response, Uri,
    header::{ACCEPT, LOCATION},
};
use http_body_util::Empty;
use hyper::body::{Bytes, Incoming};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tokio_rustls::rustls::crypto::aws_lc_rs;
use tracing::{debug, error, warn};

use crate::{config::Config, route::Route, utils::upstream_uri};

pub static API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 5;

type HttpsClient = Client<HttpsConnector<HttpConnector>, Empty<Bytes>>;

/// The transit API the relay forwards to.
///
/// Immutable after construction and shared between all connections.
#[derive(Debug, Clone)]
pub struct Upstream {
    /// Scheme, authority and optional path prefix of the API
    base: Uri,
    /// Marked sensitive so it never shows up in `Debug` output
    api_key: Option<HeaderValue>,
    client: HttpsClient,
}

impl Upstream {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let base: Uri = config
            .upstream
            .parse()
            .with_context(|| format!("invalid upstream uri: {}", config.upstream))?;
        if base.scheme().is_none() || base.authority().is_none() {
            anyhow::bail!("upstream uri must be absolute: {}", config.upstream);
        }

        let api_key = match config.api_key.as_deref() {
            Some(key) => {
                let mut value =
                    HeaderValue::from_str(key).context("api key is not a valid header value")?;
                value.set_sensitive(true);
                Some(value)
            }
            None => {
                warn!("No API key configured, upstream calls will not be authenticated");
                None
            }
        };

        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(Arc::new(aws_lc_rs::default_provider()))?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            base,
            api_key,
            client,
        })
    }

    pub fn base(&self) -> &Uri {
        &self.base
    }

    /// Builds the outbound request for `route`.
    pub fn request(&self, route: &Route) -> anyhow::Result<Request<Empty<Bytes>>> {
        let uri = upstream_uri(&self.base, &route.upstream_path_and_query())?;
        self.request_to(route, uri)
    }

    fn request_to(&self, route: &Route, uri: Uri) -> anyhow::Result<Request<Empty<Bytes>>> {
        let mut builder = Request::get(uri);
        if let Some(accept) = route.accept {
            builder = builder.header(ACCEPT, accept);
        }
        if let Some(api_key) = &self.api_key {
            builder = builder.header(&API_KEY_HEADER, api_key.clone());
        }
        Ok(builder.body(Empty::new())?)
    }

    /// Sends the request for `route` and waits for the response head.
    ///
    /// Redirects with a usable `Location` are followed, up to
    /// [`MAX_REDIRECTS`] times and never across schemes. Any other non-2xx
    /// status is an error; the body of a failed response is dropped unread.
    pub async fn open(&self, route: &Route) -> anyhow::Result<Response<Incoming>> {
        let mut request = self.request(route)?;

        for _ in 0..=MAX_REDIRECTS {
            let uri = request.uri().clone();
            debug!("Opening upstream {}", uri);
            let response = match self.client.request(request).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Failed to reach upstream {}: {}", uri, e);
                    return Err(anyhow::Error::new(e).context(format!("requesting {uri}")));
                }
            };

            let status = response.status();
            if status.is_success() {
                debug!("Upstream {} answered {}", uri, status);
                return Ok(response);
            }

            let target = if status.is_redirection() {
                response
                    .headers()
                    .get(LOCATION)
                    .and_then(|location| redirect_target(&uri, location))
            } else {
                None
            };
            let Some(target) = target else {
                error!("Upstream {} answered {}", uri, status);
                anyhow::bail!("upstream {uri} answered {status}");
            };

            debug!("Upstream {} redirected to {}", uri, target);
            request = self.request_to(route, target)?;
        }

        error!("Upstream redirected more than {} times", MAX_REDIRECTS);
        anyhow::bail!("upstream redirected more than {MAX_REDIRECTS} times")
    }
}

/// Resolves a `Location` header against the URI that produced it.
///
/// Absolute targets must keep the current scheme; relative targets must be
/// absolute paths. Anything else is not followed.
fn redirect_target(current: &Uri, location: &HeaderValue) -> Option<Uri> {
    let location: Uri = location.to_str().ok()?.parse().ok()?;
    match (location.scheme(), location.authority()) {
        (Some(scheme), Some(_)) => (Some(scheme) == current.scheme()).then_some(location),
        (None, None) => {
            let path_and_query = location.path_and_query()?.clone();
            if !path_and_query.path().starts_with('/') {
                return None;
            }
            let mut parts = current.clone().into_parts();
            parts.path_and_query = Some(path_and_query);
            Uri::from_parts(parts).ok()
        }
        _ => None,
    }
}
