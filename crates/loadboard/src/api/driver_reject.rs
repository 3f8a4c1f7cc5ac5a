use {
    crate::api::AppState,
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    model::WorkflowId,
    rate_confirmation::DecisionError,
    serde::Deserialize,
    std::sync::Arc,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRejectRequest {
    pub driver_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn driver_reject_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<WorkflowId>,
    Json(request): Json<DriverRejectRequest>,
) -> Response {
    let result = state
        .confirmations
        .driver_reject(id, &request.driver_id, request.reason.as_deref())
        .await;
    driver_reject_response(result)
}

pub fn driver_reject_response(result: Result<(), DecisionError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => super::decision_error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn driver_reject_response_ok() {
        let response = driver_reject_response(Ok(()));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn driver_reject_response_non_existent() {
        let response = driver_reject_response(Err(DecisionError::NotFound));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
