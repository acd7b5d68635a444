use std::io::Cursor;

use bytes::Bytes;
use rocket::http::{ContentType, Header, Status};
use rocket::serde::json::Json;
use rocket::State;
use rocket::{request::Request, response::{self, Responder, Response}};

use crate::api::ApiError;
use crate::catalog::Catalog;
use crate::config::RoutingConfig;
use crate::models::ListingEntry;
use crate::orchestrator::{CacheStatus, ResizeOrchestrator, ResizedImage};
use crate::routing::{classify, RequestUrl, Route};

const CACHE_CONTROL: &str = "public, max-age=86400";

/// Single entry point: every GET is classified by the router and dispatched
/// to the listing, the resize orchestrator or an empty 404.
#[get("/<_..>")]
pub async fn dispatch(
    url: RequestUrl,
    routing: &State<RoutingConfig>,
    orchestrator: &State<ResizeOrchestrator>,
    catalog: &State<Catalog>,
) -> Result<EdgeResponse, ApiError> {
    let Some(url) = url.0 else {
        return Ok(EdgeResponse::NotFound);
    };
    log::debug!("{}", url);

    match classify(&url, routing) {
        Route::Listing => {
            let entries = catalog.list(routing).await?;
            Ok(EdgeResponse::Listing(Json(entries)))
        }
        Route::Resize { key, request } => {
            let image = orchestrator.serve(key, request).await?;
            Ok(EdgeResponse::Image(image.into()))
        }
        Route::NotFound => {
            log::debug!("Not an image route: {}", url.path());
            Ok(EdgeResponse::NotFound)
        }
    }
}

pub enum EdgeResponse {
    Image(ImageResponse),
    Listing(Json<Vec<ListingEntry>>),
    NotFound,
}

impl<'r> Responder<'r, 'static> for EdgeResponse {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        match self {
            EdgeResponse::Image(image) => image.respond_to(req),
            EdgeResponse::Listing(entries) => entries.respond_to(req),
            // Built directly so the 404 catcher does not add a body
            EdgeResponse::NotFound => Response::build().status(Status::NotFound).ok(),
        }
    }
}

// Responder for image data
pub struct ImageResponse {
    pub data: Bytes,
    pub content_type: &'static str,
    pub cache: CacheStatus,
}

impl From<ResizedImage> for ImageResponse {
    fn from(image: ResizedImage) -> Self {
        Self {
            data: image.bytes,
            content_type: image.content_type,
            cache: image.cache,
        }
    }
}

fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate == etag || candidate.strip_prefix("W/") == Some(etag))
}

impl<'r> Responder<'r, 'static> for ImageResponse {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let content_type = ContentType::parse_flexible(self.content_type).unwrap_or(ContentType::JPEG);
        let etag = format!("\"{:x}\"", md5::compute(&self.data));

        // Check If-None-Match header
        if let Some(if_none_match) = req.headers().get_one("If-None-Match") {
            if etag_matches(if_none_match, &etag) {
                return Response::build()
                    .status(Status::NotModified)
                    .header(Header::new("ETag", etag))
                    .header(Header::new("Cache-Control", CACHE_CONTROL))
                    .ok();
            }
        }

        Response::build()
            .header(content_type)
            .header(Header::new("Cache-Control", CACHE_CONTROL))
            .header(Header::new("ETag", etag))
            .header(Header::new("X-Cache", self.cache.as_str()))
            .sized_body(self.data.len(), Cursor::new(self.data))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_etags() {
        let etag = "\"abc\"";
        assert!(etag_matches("\"abc\"", etag));
        assert!(etag_matches("\"zzz\", \"abc\"", etag));
        assert!(etag_matches("W/\"abc\"", etag));
        assert!(etag_matches("*", etag));
        assert!(!etag_matches("\"abd\"", etag));
    }
}
