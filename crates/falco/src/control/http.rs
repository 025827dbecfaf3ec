//! HTTP endpoints for the control surface.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::ControlSurface;
use crate::controller::MotionOutcome;
use crate::error::FalcoError;
use crate::policy::PolicyDecision;

pub fn router(surface: ControlSurface) -> Router {
    Router::new()
        .route("/move", post(move_))
        .route("/play", post(play))
        .route("/reinit", post(reinit))
        .route("/volume", get(get_volume).put(set_volume))
        .with_state(surface)
}

#[derive(Debug, Serialize)]
struct OutcomeReply {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<PolicyDecision>,
}

impl OutcomeReply {
    fn plain(outcome: &'static str) -> Self {
        Self {
            outcome,
            reason: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Volume {
    pub volume: f64,
}

/// Error body: `{"error": kind, "message": text}`.
struct ControlError(FalcoError);

impl From<FalcoError> for ControlError {
    fn from(err: FalcoError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FalcoError::NotReady(_) => StatusCode::CONFLICT,
            FalcoError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            FalcoError::ResourceNotFound(_)
            | FalcoError::UnsupportedFormat { .. }
            | FalcoError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = serde_json::json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

async fn move_(State(surface): State<ControlSurface>) -> Result<Json<OutcomeReply>, ControlError> {
    let reply = match surface.move_()? {
        MotionOutcome::Fired => OutcomeReply::plain("fired"),
        MotionOutcome::Suppressed(reason) => OutcomeReply {
            outcome: "suppressed",
            reason: Some(reason),
        },
    };
    Ok(Json(reply))
}

async fn play(State(surface): State<ControlSurface>) -> Result<Json<OutcomeReply>, ControlError> {
    surface.play()?;
    Ok(Json(OutcomeReply::plain("played")))
}

async fn reinit(State(surface): State<ControlSurface>) -> Result<Json<OutcomeReply>, ControlError> {
    // Unsubscribing a GPIO sensor joins its interrupt thread.
    let result = tokio::task::spawn_blocking(move || surface.reinit()).await;
    match result {
        Ok(outcome) => outcome?,
        Err(e) => {
            return Err(ControlError(FalcoError::DeviceUnavailable(format!(
                "reinit task failed: {}",
                e
            ))))
        }
    }
    Ok(Json(OutcomeReply::plain("reinitialized")))
}

async fn get_volume(State(surface): State<ControlSurface>) -> Result<Json<Volume>, ControlError> {
    Ok(Json(Volume {
        volume: surface.get_volume()?,
    }))
}

async fn set_volume(
    State(surface): State<ControlSurface>,
    Json(body): Json<Volume>,
) -> Result<Json<Volume>, ControlError> {
    surface.set_volume(body.volume)?;
    Ok(Json(Volume {
        volume: surface.get_volume()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_error_mapping() {
        let cases = [
            (FalcoError::NotReady("move()"), StatusCode::CONFLICT, "not_ready"),
            (
                FalcoError::InvalidArgument("volume".to_string()),
                StatusCode::BAD_REQUEST,
                "invalid_argument",
            ),
            (
                FalcoError::DeviceUnavailable("gone".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
                "device_unavailable",
            ),
        ];
        for (err, status, kind) in cases {
            let response = ControlError(err).into_response();
            assert_eq!(response.status(), status);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["error"], kind);
        }
    }

    #[tokio::test]
    async fn test_dropped_controller_is_not_ready() {
        use crate::device::RecordingDevice;
        use crate::player::ClipPlayer;
        use crate::resource::MemoryResourceLoader;
        use crate::controller::MotionController;
        use std::sync::Arc;

        let player = ClipPlayer::new(
            "deterrent",
            Arc::new(RecordingDevice::new()),
            Arc::new(MemoryResourceLoader::new()),
        );
        let controller = MotionController::builder(player, "hawk.wav").build();
        let app = router(ControlSurface::new(&controller));
        drop(controller);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/move")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
