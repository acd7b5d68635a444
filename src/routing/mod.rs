use std::convert::Infallible;
use std::net::SocketAddr;

use reqwest::Url;
use rocket::http::uri::Host;
use rocket::http::RawStr;
use rocket::request::{FromRequest, Outcome, Request};

use crate::cache::CacheKey;
use crate::config::RoutingConfig;
use crate::images::{path_extension, ImageFormat, ResizeRequest};

/// What an inbound request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Listing,
    Resize { key: CacheKey, request: ResizeRequest },
    NotFound,
}

/// Classifies a full request URL. Rules apply in order: the listing route,
/// then the extension allow-list, then resize parsing. Malformed `w` / `h`
/// values never reject a request, they fall back to the configured defaults.
pub fn classify(url: &Url, config: &RoutingConfig) -> Route {
    let path = url.path();

    if config.listing_route() == Some(path) {
        return Route::Listing;
    }

    let format = path_extension(path)
        .filter(|ext| config.is_allowed_extension(ext))
        .and_then(ImageFormat::from_extension);
    let Some(format) = format else {
        return Route::NotFound;
    };

    let raw_key = path.strip_prefix('/').unwrap_or(path);
    let object_key = RawStr::new(raw_key).percent_decode_lossy().into_owned();
    if object_key.is_empty() {
        return Route::NotFound;
    }

    Route::Resize {
        key: CacheKey::from_url(url),
        request: ResizeRequest {
            object_key,
            width: dimension(url, "w", config.default_width),
            height: dimension(url, "h", config.default_height),
            format,
        },
    }
}

fn dimension(url: &Url, name: &str, default: u32) -> u32 {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(default)
}

/// The full URL of the inbound request, rebuilt from `X-Forwarded-Proto`, the
/// validated `Host` (or the bound address) and the origin URI's path and
/// query. `None` when the pieces do not form a valid URL.
pub struct RequestUrl(pub Option<Url>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestUrl {
    type Error = Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let scheme = req
            .headers()
            .get_one("X-Forwarded-Proto")
            .and_then(|proto| proto.split(',').next())
            .map(str::trim)
            .filter(|proto| *proto == "http" || *proto == "https")
            .unwrap_or("http");

        // Rocket only parses the Host of the initial request; a header added
        // later is validated here the same way
        let host = req
            .host()
            .map(|host| host.to_string())
            .or_else(|| {
                req.headers()
                    .get_one("Host")
                    .and_then(|raw| Host::parse(raw).ok())
                    .map(|host| host.to_string())
            })
            .unwrap_or_else(|| {
                let config = req.rocket().config();
                SocketAddr::new(config.address, config.port).to_string()
            });

        let mut url = match Url::parse(&format!("{}://{}/", scheme, host)) {
            Ok(url) => url,
            Err(e) => {
                log::debug!("Unusable request host {}: {}", host, e);
                return Outcome::Success(RequestUrl(None));
            }
        };
        url.set_path(req.uri().path().as_str());
        url.set_query(req.uri().query().map(|query| query.as_str()));

        Outcome::Success(RequestUrl(Some(url)))
    }
}
