//! Admission middleware - charges every request against the default plans.

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    Error, HttpResponse, HttpResponseBuilder, ResponseError,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue, RETRY_AFTER},
};

use tollgate_core::Decision;
use tollgate_core::ports::{KeyResolver, RateLimiter};
use tollgate_shared::ErrorResponse;

use super::error::AppError;
use crate::request::request_metadata;
use crate::state::AppState;

pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    limiter: Arc<dyn RateLimiter>,
    resolver: Arc<dyn KeyResolver>,
    plans: Arc<Vec<String>>,
}

impl RateLimitMiddleware {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        resolver: Arc<dyn KeyResolver>,
        plans: Arc<Vec<String>>,
    ) -> Self {
        Self {
            limiter,
            resolver,
            plans,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.limiter.clone(),
            state.key_resolver.clone(),
            state.default_plans.clone(),
        )
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            resolver: self.resolver.clone(),
            plans: self.plans.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<dyn RateLimiter>,
    resolver: Arc<dyn KeyResolver>,
    plans: Arc<Vec<String>>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();
        let plans = self.plans.clone();
        let key = self.resolver.resolve(&request_metadata(req.request()));

        Box::pin(async move {
            let plan_names: Vec<&str> = plans.iter().map(String::as_str).collect();

            let decision = match limiter.allow(&key, &plan_names, 1).await {
                Ok(decision) => decision,
                Err(e) => {
                    // The configured default plans are broken, not the caller's request.
                    let response =
                        AppError::Internal(format!("admission plans misconfigured: {e}"))
                            .error_response();
                    return Ok(req.into_response(response).map_into_right_body());
                }
            };

            if !decision.allowed {
                tracing::warn!(key = %key, reason = %decision.reason, "Request rejected");
                let retry_after = decision.retry_after_secs();
                let response = too_many_requests(&decision).json(
                    ErrorResponse::too_many_requests(retry_after).with_detail(format!(
                        "{}. Try again in {retry_after} seconds.",
                        decision.reason
                    )),
                );
                return Ok(req.into_response(response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            if decision.remaining_known() {
                res.headers_mut()
                    .insert(REMAINING_HEADER, remaining_header(&decision));
            }
            Ok(res.map_into_left_body())
        })
    }
}

fn remaining_header(decision: &Decision) -> HeaderValue {
    HeaderValue::from(decision.remaining.max(0.0).floor() as u64)
}

/// Start a 429 response carrying `Retry-After` and the remaining budget.
pub fn too_many_requests(decision: &Decision) -> HttpResponseBuilder {
    let mut builder = HttpResponse::TooManyRequests();
    builder
        .insert_header((RETRY_AFTER, decision.retry_after_secs().to_string()))
        .insert_header((REMAINING_HEADER, remaining_header(decision)));
    builder
}
