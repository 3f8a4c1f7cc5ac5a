use {
    crate::marketplace::Marketplace,
    axum::{
        Router,
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    rate_confirmation::{DecisionError, RateConfirmations},
    serde::{Deserialize, Serialize},
    std::{borrow::Cow, sync::Arc},
    tower_http::trace::TraceLayer,
};

mod accept_bid;
mod driver_accept;
mod driver_reject;
mod get_rate_confirmation;

/// Application state shared across all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub marketplace: Arc<Marketplace>,
    pub confirmations: Arc<RateConfirmations>,
}

pub fn handle_all_routes(
    marketplace: Arc<Marketplace>,
    confirmations: Arc<RateConfirmations>,
) -> Router {
    let state = Arc::new(AppState {
        marketplace,
        confirmations,
    });

    Router::new()
        .route(
            "/v1/loads/{load_id}/bids/{bid_id}/accept",
            axum::routing::post(accept_bid::accept_bid_handler),
        )
        .route(
            "/v1/rate-confirmations/{id}",
            axum::routing::get(get_rate_confirmation::get_rate_confirmation_handler),
        )
        .route(
            "/v1/rate-confirmations/{id}/accept",
            axum::routing::post(driver_accept::driver_accept_handler),
        )
        .route(
            "/v1/rate-confirmations/{id}/reject",
            axum::routing::post(driver_reject::driver_reject_handler),
        )
        .route("/metrics", axum::routing::get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn metrics_handler() -> String {
    observe::metrics::encode(observe::metrics::get_registry())
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    pub error_type: Cow<'static, str>,
    pub description: Cow<'static, str>,
}

pub fn error(error_type: &'static str, description: impl AsRef<str>) -> Json<Error> {
    Json(Error {
        error_type: error_type.into(),
        description: Cow::Owned(description.as_ref().to_owned()),
    })
}

pub fn internal_error_reply() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error("InternalServerError", ""),
    )
        .into_response()
}

/// Shared mapping for failed driver decisions.
pub(crate) fn decision_error_response(err: DecisionError) -> Response {
    match err {
        DecisionError::NotFound => (
            StatusCode::NOT_FOUND,
            error("NotFound", "Rate confirmation was not found"),
        )
            .into_response(),
        DecisionError::DeadlineExpired => (
            StatusCode::GONE,
            error(
                "DeadlineExpired",
                "The offer expired, the load is back on the marketplace",
            ),
        )
            .into_response(),
        DecisionError::WorkflowClosed => (
            StatusCode::CONFLICT,
            error(
                "WorkflowClosed",
                "Rate confirmation already reached a terminal state",
            ),
        )
            .into_response(),
        DecisionError::Other(err) => {
            tracing::error!(?err, "rate confirmation decision failed");
            internal_error_reply()
        }
    }
}

#[cfg(test)]
pub async fn response_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}
