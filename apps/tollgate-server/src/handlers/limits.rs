//! Rate limit check and inspection endpoints.

use actix_web::{HttpResponse, web};

use tollgate_core::Decision;
use tollgate_core::ports::{BucketStore, RateLimiter};
use tollgate_shared::{BucketStateResponse, CheckRequest, DecisionResponse};

use crate::middleware::error::{AppError, AppResult};
use crate::middleware::rate_limit::too_many_requests;
use crate::state::AppState;

fn to_response(decision: &Decision) -> DecisionResponse {
    DecisionResponse {
        allowed: decision.allowed,
        remaining: decision.remaining,
        retry_after_ms: decision.wait.as_millis() as u64,
        reason: decision.reason.clone(),
    }
}

/// Charge `cost` tokens of `key` against the requested plans.
///
/// POST /api/limits/check
pub async fn check(
    state: web::Data<AppState>,
    body: web::Json<CheckRequest>,
) -> AppResult<HttpResponse> {
    let plan_names: Vec<&str> = body.plans.iter().map(String::as_str).collect();
    let decision = state
        .limiter
        .allow(&body.key, &plan_names, body.cost())
        .await?;

    if decision.allowed {
        Ok(HttpResponse::Ok().json(to_response(&decision)))
    } else {
        Ok(too_many_requests(&decision).json(to_response(&decision)))
    }
}

/// Stored state of one bucket; 404 until the bucket has been charged.
///
/// GET /api/limits/{key}/{plan}
pub async fn bucket_state(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (key, plan) = path.into_inner();

    let bucket = state
        .limiter
        .store()
        .get_state(&key, &plan)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no bucket for key [{key}] and plan [{plan}]")))?;

    Ok(HttpResponse::Ok().json(BucketStateResponse {
        tokens: bucket.tokens(),
        last_refill_ms: bucket.last_refill_ms(),
        key,
        plan,
    }))
}
