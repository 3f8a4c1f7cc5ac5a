use {
    crate::api::AppState,
    acceptance::{AcceptError, Acceptance},
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    chrono::{DateTime, Utc},
    model::{BidId, LoadId},
    serde::{Deserialize, Serialize},
    std::sync::Arc,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBidRequest {
    /// Shipper-side user performing the accept.
    pub actor_id: String,
}

#[derive(Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBidResponse {
    pub load_id: LoadId,
    pub bid_id: BidId,
    pub accepted_at: DateTime<Utc>,
}

pub async fn accept_bid_handler(
    State(state): State<Arc<AppState>>,
    Path((load_id, bid_id)): Path<(LoadId, BidId)>,
    Json(request): Json<AcceptBidRequest>,
) -> Response {
    let result = state
        .marketplace
        .accept_bid(load_id, bid_id, &request.actor_id)
        .await;
    accept_bid_response(result)
}

pub fn accept_bid_response(result: Result<Acceptance, AcceptError>) -> Response {
    match result {
        Ok(acceptance) => (
            StatusCode::OK,
            Json(AcceptBidResponse {
                load_id: acceptance.load_id,
                bid_id: acceptance.bid_id,
                accepted_at: acceptance.accepted_at,
            }),
        )
            .into_response(),
        Err(AcceptError::LockContention) => (
            StatusCode::CONFLICT,
            super::error(
                "LockContention",
                "Another accept for this load is in flight, try again",
            ),
        )
            .into_response(),
        Err(AcceptError::AlreadyAssigned) => (
            StatusCode::CONFLICT,
            super::error("AlreadyAssigned", "Load already has a winning bid"),
        )
            .into_response(),
        Err(AcceptError::Other(err)) => {
            tracing::error!(?err, "accept_bid_response");
            crate::api::internal_error_reply()
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::api::response_body};

    #[tokio::test]
    async fn accept_bid_response_ok() {
        let acceptance = Acceptance {
            load_id: LoadId(7),
            bid_id: BidId(3),
            actor_id: "shipper-1".to_string(),
            accepted_at: Utc::now(),
        };
        let response = accept_bid_response(Ok(acceptance.clone()));
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_body(response).await;
        let payload: AcceptBidResponse = serde_json::from_slice(body.as_slice()).unwrap();
        assert_eq!(payload.load_id, acceptance.load_id);
        assert_eq!(payload.bid_id, acceptance.bid_id);
    }

    #[tokio::test]
    async fn accept_bid_response_conflicts() {
        let response = accept_bid_response(Err(AcceptError::LockContention));
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = accept_bid_response(Err(AcceptError::AlreadyAssigned));
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn accept_bid_response_internal_error() {
        let response = accept_bid_response(Err(AcceptError::Other(anyhow::anyhow!("boom"))));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
