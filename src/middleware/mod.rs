use actix_web::{
    body::EitherBody,
    dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{header, Method},
    web, Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use std::future::{ready, Ready as StdReady};
use url::Url;

use crate::errors::AppError;
use crate::helper::auth_helpers::is_admin;
use crate::helper::language::{Locale, LANG_COOKIE};
use crate::helper::mail_helpers::{error_report, RequestInfo};
use crate::helper::session_helpers::AUTH_COOKIE;
use crate::models::db_operations::users_db_operations;
use crate::models::User;
use crate::{AppState, DbPool};

// --- Extractors ---

/// The logged-in user, if any. Never fails.
pub struct MaybeUser(pub Option<User>);

impl FromRequest for MaybeUser {
    type Error = Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        ready(Ok(MaybeUser(req.extensions().get::<User>().cloned())))
    }
}

/// A logged-in user holding one of the admin roles; 401 otherwise.
pub struct AdminUser(pub User);

impl FromRequest for AdminUser {
    type Error = Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let user = req.extensions().get::<User>().cloned();
        let result = match (req.app_data::<web::Data<AppState>>(), user) {
            (Some(state), Some(user)) if is_admin(&user, &state.admin_roles) => Ok(AdminUser(user)),
            _ => Err(AppError::Unauthorized.into()),
        };
        ready(result)
    }
}

/// The locale of a request: `{lang}` route segment, then the `lang` cookie,
/// then `Accept-Language`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestLocale(pub Locale);

impl FromRequest for RequestLocale {
    type Error = Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let cookie = req.cookie(LANG_COOKIE);
        let accept_language = req
            .headers()
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok());
        let locale = match req.app_data::<web::Data<AppState>>() {
            Some(state) => state.languages.resolve(
                req.match_info().get("lang"),
                cookie.as_ref().map(|c| c.value()),
                accept_language,
            ),
            None => Locale::En,
        };
        ready(Ok(RequestLocale(locale)))
    }
}

// --- Session resolution ---

fn resolve_user(req: &ServiceRequest) -> Option<User> {
    let cookie = req.cookie(AUTH_COOKIE)?;
    let state = req.app_data::<web::Data<AppState>>()?;
    let pool = req.app_data::<web::Data<DbPool>>()?;
    let claims = state.sessions.resolve(cookie.value())?;

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection to resolve session: {}", e);
            return None;
        }
    };
    match users_db_operations::find_user(&conn, &claims.id) {
        Ok(Some(user)) if user.active && user.email == claims.email => Some(user),
        Ok(_) => {
            log::debug!("Session for {} no longer matches an active user", claims.id);
            None
        }
        Err(e) => {
            log::error!("Failed to load session user {}: {}", claims.id, e);
            None
        }
    }
}

/// Resolves the `auth` cookie into a [`User`] stored in request extensions.
/// Requests without a valid session pass through anonymously.
pub struct Authenticate;

impl<S, B> Transform<S, ServiceRequest> for Authenticate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticateMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthenticateMiddleware { service })
    }
}

pub struct AuthenticateMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthenticateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(user) = resolve_user(&req) {
            req.extensions_mut().insert(user);
        }
        let fut = self.service.call(req);
        Box::pin(fut)
    }
}

// --- Admin guard ---

/// Answers 401 before the handler runs unless the resolved user holds an
/// admin role. Must sit inside [`Authenticate`].
pub struct RequireAdmin;

impl<S, B> Transform<S, ServiceRequest> for RequireAdmin
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireAdminMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequireAdminMiddleware { service })
    }
}

pub struct RequireAdminMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequireAdminMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let allowed = {
            let extensions = req.extensions();
            match (req.app_data::<web::Data<AppState>>(), extensions.get::<User>()) {
                (Some(state), Some(user)) => is_admin(user, &state.admin_roles),
                _ => false,
            }
        };

        if allowed {
            let fut = self.service.call(req);
            Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            })
        } else {
            Box::pin(async move {
                log::warn!("Rejected admin request to {}", req.path());
                let (http_req, _payload) = req.into_parts();
                let res = AppError::Unauthorized.error_response().map_into_right_body();
                Ok(ServiceResponse::new(http_req, res))
            })
        }
    }
}

// --- Same-origin guard ---

fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// True when the `Origin` header, or `Referer` without one, points at this
/// host or at the configured site URL. Requests carrying neither fail.
pub fn same_origin(req: &HttpRequest) -> bool {
    let headers = req.headers();
    let source = headers
        .get(header::ORIGIN)
        .or_else(|| headers.get(header::REFERER))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Url::parse(v).ok());
    let Some(source) = source else {
        return false;
    };

    if authority(&source).is_some_and(|a| a.eq_ignore_ascii_case(req.connection_info().host())) {
        return true;
    }
    req.app_data::<web::Data<AppState>>()
        .and_then(|state| Url::parse(&state.config.site_url).ok())
        .is_some_and(|site| site.origin() == source.origin())
}

/// Rejects state-changing requests that come from another site with 403.
/// GET, HEAD and OPTIONS pass untouched.
pub struct SameOrigin;

impl<S, B> Transform<S, ServiceRequest> for SameOrigin
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = SameOriginMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SameOriginMiddleware { service })
    }
}

pub struct SameOriginMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for SameOriginMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let safe = [Method::GET, Method::HEAD, Method::OPTIONS].contains(req.method());
        if safe || same_origin(req.request()) {
            let fut = self.service.call(req);
            Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            })
        } else {
            Box::pin(async move {
                log::warn!("Rejected cross-site {} to {}", req.method(), req.path());
                let (http_req, _payload) = req.into_parts();
                let res = AppError::Forbidden("cross-site request".into())
                    .error_response()
                    .map_into_right_body();
                Ok(ServiceResponse::new(http_req, res))
            })
        }
    }
}

// --- Error reports ---

fn header_value(req: &HttpRequest, name: &str) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn request_info(req: &HttpRequest, status: u16) -> RequestInfo {
    RequestInfo {
        method: req.method().to_string(),
        uri: req.uri().to_string(),
        status,
        user_agent: header_value(req, header::USER_AGENT.as_str()),
        referer: header_value(req, header::REFERER.as_str()),
        peer_addr: req.peer_addr().map(|a| a.to_string()).unwrap_or_default(),
        real_ip: header_value(req, "X-Real-IP"),
    }
}

fn report<B>(res: &ServiceResponse<B>) {
    let req = res.request();
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
        return;
    };
    let recipients = &state.config.mail.error_recipients;
    if recipients.is_empty() {
        log::debug!("No error report recipients configured");
        return;
    }

    let status = res.status();
    let error = res
        .response()
        .error()
        .map(|e| e.to_string())
        .unwrap_or_else(|| status.to_string());
    let mail = error_report(&error, &request_info(req, status.as_u16()), recipients);
    let mailer = state.mailer.clone();

    actix_web::rt::spawn(async move {
        match web::block(move || mailer.send(&mail)).await {
            Ok(Ok(())) => (),
            Ok(Err(e)) => log::error!("Could not send error report: {}", e),
            Err(e) => log::error!("Error report task failed: {}", e),
        }
    });
}

/// Mails every response with a 5xx status to the configured recipients.
/// Sending happens off the request path.
pub struct ReportErrors;

impl<S, B> Transform<S, ServiceRequest> for ReportErrors
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ReportErrorsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ReportErrorsMiddleware { service })
    }
}

pub struct ReportErrorsMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for ReportErrorsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            if res.status().is_server_error() {
                report(&res);
            }
            Ok(res)
        })
    }
}
