use {
    crate::api::AppState,
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    model::{RateConfirmation, WorkflowId},
    rate_confirmation::DecisionError,
    serde::Deserialize,
    std::sync::Arc,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverAcceptRequest {
    pub driver_id: String,
}

pub async fn driver_accept_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<WorkflowId>,
    Json(request): Json<DriverAcceptRequest>,
) -> Response {
    let result = state
        .confirmations
        .driver_accept(id, &request.driver_id)
        .await;
    driver_accept_response(result)
}

pub fn driver_accept_response(result: Result<RateConfirmation, DecisionError>) -> Response {
    match result {
        Ok(workflow) => (StatusCode::OK, Json(workflow)).into_response(),
        Err(err) => super::decision_error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::api::response_body,
        chrono::Utc,
        model::{BidId, LoadId, RateConfirmationStatus},
    };

    fn accepted_workflow() -> RateConfirmation {
        RateConfirmation {
            id: WorkflowId(5),
            load_id: LoadId(1),
            bid_id: BidId(2),
            carrier_id: "carrier-9".to_string(),
            status: RateConfirmationStatus::DriverAccepted,
            dispatch_signed_at: Some(Utc::now()),
            driver_acceptance_deadline: Some(Utc::now()),
            driver_accepted_at: Some(Utc::now()),
            document_reference: "ratecon-1-2-0".to_string(),
        }
    }

    #[tokio::test]
    async fn driver_accept_response_ok() {
        let workflow = accepted_workflow();
        let response = driver_accept_response(Ok(workflow.clone()));
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_body(response).await;
        let payload: RateConfirmation = serde_json::from_slice(body.as_slice()).unwrap();
        assert_eq!(payload, workflow);
    }

    #[tokio::test]
    async fn driver_accept_response_after_deadline() {
        let response = driver_accept_response(Err(DecisionError::DeadlineExpired));
        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[tokio::test]
    async fn driver_accept_response_already_decided() {
        let response = driver_accept_response(Err(DecisionError::WorkflowClosed));
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
