use {
    crate::api::AppState,
    anyhow::Result,
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    model::{RateConfirmation, WorkflowId},
    std::sync::Arc,
};

pub async fn get_rate_confirmation_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<WorkflowId>,
) -> Response {
    let result = state.confirmations.get(id).await;
    get_rate_confirmation_response(result)
}

pub fn get_rate_confirmation_response(result: Result<Option<RateConfirmation>>) -> Response {
    let workflow = match result {
        Ok(workflow) => workflow,
        Err(err) => {
            tracing::error!(?err, "get_rate_confirmation_response");
            return crate::api::internal_error_reply();
        }
    };
    match workflow {
        Some(workflow) => (StatusCode::OK, Json(workflow)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            super::error("NotFound", "Rate confirmation was not found"),
        )
            .into_response(),
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

    #[tokio::test]
    async fn get_rate_confirmation_response_ok() {
        let workflow = RateConfirmation {
            id: WorkflowId(5),
            load_id: LoadId(1),
            bid_id: BidId(2),
            carrier_id: "carrier-9".to_string(),
            status: RateConfirmationStatus::DispatchSigned,
            dispatch_signed_at: Some(Utc::now()),
            driver_acceptance_deadline: Some(Utc::now() + chrono::Duration::minutes(30)),
            driver_accepted_at: None,
            document_reference: "ratecon-1-2-0".to_string(),
        };
        let response = get_rate_confirmation_response(Ok(Some(workflow.clone())));
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_body(response).await;
        let payload: RateConfirmation = serde_json::from_slice(body.as_slice()).unwrap();
        assert_eq!(payload, workflow);
    }

    #[tokio::test]
    async fn get_rate_confirmation_response_non_existent() {
        let response = get_rate_confirmation_response(Ok(None));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
