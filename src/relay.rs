//! Turns an open upstream response into the caller's response.

use futures::{StreamExt as _, stream};
use http::{Response, StatusCode, header::CONTENT_TYPE};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Bytes, Frame, Incoming};
use tracing::debug;

use crate::{route::Route, service::ResponseBody, upstream::Upstream};

/// Largest frame forwarded to the caller.
pub const CHUNK_SIZE: usize = 4096;

/// Relays `route`: opens the upstream call and streams its body back.
///
/// The caller always sees `200 OK` and the route's fixed content type once the
/// upstream head has arrived. Failing to open the upstream is returned as an
/// error and left to the connection layer.
pub async fn relay(upstream: &Upstream, route: &Route) -> anyhow::Result<Response<ResponseBody>> {
    let upstream_response = upstream.open(route).await?;
    debug!("Relaying {} as {}", route.path, route.content_type);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, route.content_type)
        .body(rechunk(upstream_response.into_body()))?;
    Ok(response)
}

/// Re-frames `body` so that no data frame exceeds [`CHUNK_SIZE`].
///
/// Order is preserved, trailers are dropped and the first body error ends
/// the stream with that error.
pub fn rechunk(body: Incoming) -> ResponseBody {
    let frames = body.into_data_stream().flat_map(|item| {
        let frames: Vec<Result<Frame<Bytes>, hyper::Error>> = match item {
            Ok(data) => split_chunks(data)
                .into_iter()
                .map(|chunk| Ok(Frame::data(chunk)))
                .collect(),
            Err(e) => vec![Err(e)],
        };
        stream::iter(frames)
    });
    BodyExt::boxed(StreamBody::new(frames))
}

/// Splits `data` into consecutive slices of at most [`CHUNK_SIZE`] bytes
/// without copying.
pub fn split_chunks(mut data: Bytes) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(data.len().div_ceil(CHUNK_SIZE));
    while data.len() > CHUNK_SIZE {
        chunks.push(data.split_to(CHUNK_SIZE));
    }
    if !data.is_empty() {
        chunks.push(data);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_payload_is_one_chunk() {
        let chunks = split_chunks(Bytes::from_static(b"data: {}\n\n"));
        assert_eq!(chunks, vec![Bytes::from_static(b"data: {}\n\n")]);
    }

    #[test]
    fn empty_payload_has_no_chunks() {
        assert!(split_chunks(Bytes::new()).is_empty());
    }

    #[test]
    fn large_payload_is_split_in_order() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let chunks = split_chunks(Bytes::from(payload.clone()));

        let sizes: Vec<usize> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![4096, 4096, 1808]);
        assert_eq!(chunks.concat(), payload);
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_chunk() {
        let chunks = split_chunks(Bytes::from(vec![7u8; CHUNK_SIZE * 2]));
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|chunk| chunk.len() == CHUNK_SIZE));
    }
}
