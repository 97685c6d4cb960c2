//! OAuth provider HTTP service implementing the hyper `Service` trait.
//!
//! Routes:
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | `GET`, `POST` | `/oauth/request_token` | issue a request token |
//! | `POST` | `/oauth/authorize` | record user approval, return the verifier (admin only) |
//! | `GET`, `POST` | `/oauth/access_token` | exchange for an access token |
//! | `GET` | `/api/whoami` | protected resource echoing the caller |
//! | `GET` | `/health` | liveness probe |

use std::convert::Infallible;
use std::fmt::{self, Display};
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use oauth1_auth::encoding::{ParamValue, parse_query_like, percent_encode};
use oauth1_auth::{AuthError, InMemoryDataStore, Request, Server};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::VERSION;
use crate::response::{
    ResponseBody, error_to_response, form_response, json_response, text_response,
};

/// The routes this service knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    RequestToken,
    Authorize,
    AccessToken,
    WhoAmI,
    Health,
}

impl Route {
    /// Resolve a path to a route.
    fn from_path(path: &str) -> Option<Self> {
        match path {
            "/oauth/request_token" => Some(Self::RequestToken),
            "/oauth/authorize" => Some(Self::Authorize),
            "/oauth/access_token" => Some(Self::AccessToken),
            "/api/whoami" => Some(Self::WhoAmI),
            "/health" => Some(Self::Health),
            _ => None,
        }
    }

    fn allows(self, method: &Method) -> bool {
        match self {
            Self::RequestToken | Self::AccessToken => {
                *method == Method::GET || *method == Method::POST
            }
            Self::Authorize => *method == Method::POST,
            Self::WhoAmI | Self::Health => *method == Method::GET,
        }
    }
}

/// Header carrying the admin secret for the approval hook.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Hyper `Service` for the OAuth provider endpoints.
#[derive(Clone)]
pub struct OAuthHttpService {
    server: Arc<Server>,
    store: Arc<InMemoryDataStore>,
    realm: Arc<str>,
    admin_token: Option<Arc<str>>,
    peer: Option<IpAddr>,
}

impl fmt::Debug for OAuthHttpService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthHttpService")
            .field("realm", &self.realm)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl OAuthHttpService {
    /// Create a new service over a verification server and its store.
    pub fn new(server: Arc<Server>, store: Arc<InMemoryDataStore>, realm: &str) -> Self {
        Self {
            server,
            store,
            realm: Arc::from(realm),
            admin_token: None,
            peer: None,
        }
    }

    /// Require `secret` in the [`ADMIN_TOKEN_HEADER`] header of approval
    /// requests. Without one, only loopback peers may approve tokens.
    #[must_use]
    pub fn with_admin_token(mut self, secret: Option<&str>) -> Self {
        self.admin_token = secret.map(Arc::from);
        self
    }

    /// A copy bound to one connection's remote address.
    #[must_use]
    pub fn for_peer(&self, peer: IpAddr) -> Self {
        Self {
            peer: Some(peer),
            ..self.clone()
        }
    }

    /// Route and answer a single request.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<ResponseBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();

        let Some(route) = Route::from_path(parts.uri.path()) else {
            return text_response(StatusCode::NOT_FOUND, "not found");
        };
        if !route.allows(&parts.method) {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }
        if route == Route::Health {
            return json_response(&serde_json::json!({ "status": "running", "version": VERSION }));
        }

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(error = %e, "failed to read request body");
                return text_response(StatusCode::BAD_REQUEST, "unreadable request body");
            }
        };

        if route == Route::Authorize {
            if !self.is_admin(&parts.headers) {
                warn!(peer = ?self.peer, "refused unauthenticated token approval");
                return text_response(StatusCode::UNAUTHORIZED, "admin credentials required");
            }
            return self.authorize(&body);
        }

        let request = match Request::from_http_parts(&parts, &body) {
            Ok(request) => match self.peer {
                Some(peer) => request.with_remote_address(peer.to_string()),
                None => request,
            },
            Err(e) => return error_to_response(&e, &self.realm),
        };

        let result = match route {
            Route::RequestToken => self.server.fetch_request_token(&request).map(|token| {
                form_response(format!(
                    "{}&oauth_callback_confirmed=true",
                    token.to_form_string()
                ))
            }),
            Route::AccessToken => self
                .server
                .fetch_access_token(&request)
                .map(|token| form_response(token.to_form_string())),
            _ => self.server.verify_request(&request).map(|auth| {
                json_response(&serde_json::json!({
                    "consumerKey": auth.consumer.key,
                    "userId": auth.user_id(),
                }))
            }),
        };

        result.unwrap_or_else(|e| error_to_response(&e, &self.realm))
    }

    /// Whether the caller may use the approval hook.
    fn is_admin(&self, headers: &http::HeaderMap) -> bool {
        match &self.admin_token {
            Some(secret) => headers
                .get(ADMIN_TOKEN_HEADER)
                .is_some_and(|v| bool::from(v.as_bytes().ct_eq(secret.as_bytes()))),
            None => self.peer.is_some_and(|peer| peer.is_loopback()),
        }
    }

    /// Record that a user approved a request token.
    ///
    /// This is an administrative hook for a trusted front end, not a consent
    /// page: it takes `oauth_token` and `user_id` from a form body.
    fn authorize(&self, body: &[u8]) -> http::Response<ResponseBody> {
        let params = parse_query_like(&String::from_utf8_lossy(body));
        let field = |name: &'static str| {
            params
                .get(name)
                .and_then(ParamValue::as_single)
                .filter(|v| !v.is_empty())
                .ok_or(AuthError::MissingParameter(name))
        };

        let (token_key, user_id) = match (field("oauth_token"), field("user_id")) {
            (Ok(token_key), Ok(user_id)) => (token_key, user_id),
            (Err(e), _) | (_, Err(e)) => return error_to_response(&e, &self.realm),
        };

        match self.store.authorize_request_token(token_key, user_id) {
            Ok(verifier) => {
                debug!(token = %token_key, "request token approved");
                let mut body = format!(
                    "oauth_token={}&oauth_verifier={}",
                    percent_encode(token_key),
                    percent_encode(&verifier)
                );
                if let Some(callback) = self.store.callback(token_key) {
                    body.push_str("&oauth_callback=");
                    body.push_str(&percent_encode(&callback));
                }
                form_response(body)
            }
            Err(e) => error_to_response(&AuthError::from(e), &self.realm),
        }
    }
}

impl hyper::service::Service<http::Request<Incoming>> for OAuthHttpService {
    type Response = http::Response<ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::Full;
    use oauth1_auth::encoding::Parameters;
    use oauth1_auth::{Consumer, HmacAlgorithm, ServerConfig, SignatureMethod, Token};

    use super::*;

    const ADMIN_SECRET: &str = "admin-secret";

    fn service() -> (OAuthHttpService, Consumer) {
        let store = Arc::new(InMemoryDataStore::new());
        let consumer = Consumer::new("ck", "cs", SignatureMethod::Hmac(HmacAlgorithm::Sha1))
            .with_host("127.0.0.1");
        store.register_consumer(consumer.clone());
        let server = Arc::new(Server::new(store.clone(), ServerConfig::default()));
        let service = OAuthHttpService::new(server, store, "Photos")
            .with_admin_token(Some(ADMIN_SECRET))
            .for_peer(IpAddr::from([127, 0, 0, 1]));
        (service, consumer)
    }

    fn approval(body: &str, secret: Option<&str>) -> http::Request<Full<Bytes>> {
        let mut builder = http::Request::builder().method("POST").uri("/oauth/authorize");
        if let Some(secret) = secret {
            builder = builder.header(ADMIN_TOKEN_HEADER, secret);
        }
        builder.body(Full::new(Bytes::from(body.to_owned()))).unwrap()
    }

    /// Build a signed request carrying its parameters in the query (GET) or
    /// a form body (POST).
    fn signed(
        consumer: &Consumer,
        token: Option<&Token>,
        method: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> http::Request<Full<Bytes>> {
        let params: Parameters = params.iter().copied().collect();
        let url = format!("http://localhost{path}");
        let mut request =
            Request::from_consumer_and_token(consumer, token, method, &url, params).unwrap();
        request.sign(consumer, token).unwrap();

        let builder = http::Request::builder()
            .method(method)
            .header("host", "localhost");
        if method == "GET" {
            builder
                .uri(format!("{path}?{}", request.to_post_data()))
                .body(Full::new(Bytes::new()))
                .unwrap()
        } else {
            builder
                .uri(path)
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Full::new(Bytes::from(request.to_post_data())))
                .unwrap()
        }
    }

    async fn body_string(resp: http::Response<ResponseBody>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn token_from(body: &str) -> Token {
        let params = parse_query_like(body);
        let get = |name: &str| params.get(name).unwrap().as_single().unwrap().to_owned();
        Token::new(get("oauth_token"), get("oauth_token_secret"))
    }

    #[tokio::test]
    async fn test_should_serve_full_token_exchange() {
        let (service, consumer) = service();

        let resp = service
            .handle(signed(&consumer, None, "POST", "/oauth/request_token", &[("oauth_callback", "oob")]))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_string(resp).await;
        assert!(body.ends_with("&oauth_callback_confirmed=true"));
        let request_token = token_from(&body);

        let approve = approval(
            &format!("oauth_token={}&user_id=alice", request_token.key),
            Some(ADMIN_SECRET),
        );
        let resp = service.handle(approve).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_string(resp).await;
        let params = parse_query_like(&body);
        let verifier = params.get("oauth_verifier").unwrap().as_single().unwrap().to_owned();
        assert_eq!(
            params.get("oauth_callback").and_then(|v| v.as_single()),
            Some("oob")
        );

        let resp = service
            .handle(signed(
                &consumer,
                Some(&request_token),
                "POST",
                "/oauth/access_token",
                &[("oauth_verifier", verifier.as_str())],
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let access = token_from(&body_string(resp).await);

        let resp = service
            .handle(signed(&consumer, Some(&access), "GET", "/api/whoami", &[]))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(json["consumerKey"], "ck");
        assert_eq!(json["userId"], "alice");
    }

    #[tokio::test]
    async fn test_should_challenge_unsigned_resource_request() {
        let (service, consumer) = service();
        let req = http::Request::builder()
            .uri("/api/whoami")
            .header("host", "localhost")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = service.handle(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let mut req = signed(&consumer, Some(&Token::new("tk", "ts")), "GET", "/api/whoami", &[]);
        *req.uri_mut() = format!("{}&extra=1", req.uri()).parse().unwrap();
        let resp = service.handle(req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = http::Request::builder()
            .uri("/api/whoami?oauth_consumer_key=unknown")
            .header("host", "localhost")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = service.handle(req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok()),
            Some("OAuth realm=\"Photos\"")
        );
    }

    #[tokio::test]
    async fn test_should_reject_request_token_from_disallowed_peer() {
        let (service, consumer) = service();
        let service = service.for_peer(IpAddr::from([10, 9, 9, 9]));

        let resp = service
            .handle(signed(&consumer, None, "POST", "/oauth/request_token", &[("oauth_callback", "oob")]))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_should_require_authorize_fields() {
        let (service, _) = service();
        let req = approval("user_id=alice", Some(ADMIN_SECRET));
        assert_eq!(service.handle(req).await.status(), StatusCode::BAD_REQUEST);

        let req = approval("oauth_token=nope&user_id=alice", Some(ADMIN_SECRET));
        assert_eq!(service.handle(req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_should_refuse_approval_without_admin_token() {
        let (service, consumer) = service();
        let resp = service
            .handle(signed(&consumer, None, "POST", "/oauth/request_token", &[("oauth_callback", "oob")]))
            .await;
        let request_token = token_from(&body_string(resp).await);
        let body = format!("oauth_token={}&user_id=victim", request_token.key);

        let resp = service.handle(approval(&body, None)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = service.handle(approval(&body, Some("admin-secreT"))).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(service.store.callback(&request_token.key).is_some());
    }

    #[tokio::test]
    async fn test_should_limit_approval_to_loopback_without_admin_token() {
        let (service, _) = service();
        let open = service.clone().with_admin_token(None);

        let remote = open.for_peer(IpAddr::from([203, 0, 113, 7]));
        let resp = remote.handle(approval("oauth_token=nope&user_id=a", None)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(resp).await, "admin credentials required");

        // Loopback callers pass the check and reach field validation.
        let resp = open.handle(approval("user_id=a", None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_should_route_health_and_unknown_paths() {
        let (service, _) = service();

        let req = http::Request::builder()
            .uri("/health")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = service.handle(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("running"));

        let req = http::Request::builder()
            .uri("/nowhere")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(service.handle(req).await.status(), StatusCode::NOT_FOUND);

        let req = http::Request::builder()
            .method("DELETE")
            .uri("/oauth/request_token")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(
            service.handle(req).await.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
