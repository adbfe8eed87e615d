use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use actix_web::{
    Error,
    body::MessageBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
};
use tracing::{Instrument, info, warn};
use uuid::Uuid;

/// Header carrying the correlation id of an HTTP request.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Middleware wrapping every request in a span and logging its start and completion.
///
/// The span carries the caller's `x-request-id` when present, otherwise a fresh one, and the
/// same id is echoed in the response. Request bodies are never logged since they carry SQL.
pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggingMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();

        let request_id = header_str(req.headers(), REQUEST_ID_HEADER)
            .filter(|id| !id.is_empty() && id.len() <= 128)
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let user_agent = header_str(req.headers(), "user-agent")
            .unwrap_or("unknown")
            .to_owned();
        let remote_addr = req
            .connection_info()
            .peer_addr()
            .unwrap_or("unknown")
            .to_owned();

        let span = tracing::info_span!(
            "HTTP request",
            method = %req.method(),
            path = %req.path(),
            user_agent = %user_agent,
            remote_addr = %remote_addr,
            request_id = %request_id,
        );

        {
            let _enter = span.enter();
            info!("HTTP request received");
        }

        let fut = self.service.call(req);

        Box::pin(
            async move {
                let res = fut.await;
                let duration = start_time.elapsed();

                match res {
                    Ok(mut response) => {
                        info!(
                            status_code = response.status().as_u16(),
                            duration_ms = duration.as_millis() as u64,
                            "HTTP request completed"
                        );

                        if let Ok(value) = HeaderValue::from_str(&request_id) {
                            response
                                .headers_mut()
                                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                        }

                        Ok(response)
                    }
                    Err(error) => {
                        warn!(
                            error = %error,
                            duration_ms = duration.as_millis() as u64,
                            "HTTP request failed"
                        );

                        Err(error)
                    }
                }
            }
            .instrument(span),
        )
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
