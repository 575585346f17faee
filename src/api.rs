//! HTTP facade (§4.4, §6): the two endpoints an external collaborator uses
//! to request a file and to poll download state.

use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppState> {
    Router::new().route("/downloads", get(list_downloads).post(request_download))
}

#[derive(Debug, Deserialize)]
pub struct RequestDownloadBody {
    #[serde(rename = "botNick", default)]
    pub bot_nick: String,
    #[serde(rename = "packageNumber", default)]
    pub package_number: u32,
    #[serde(rename = "fileName", default)]
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `POST /downloads`: 400 on missing/zero field, 201 once RequestFile has
/// joined channels and fired the XDCC SEND.
pub async fn request_download(
    State(state): State<AppState>,
    Json(body): Json<RequestDownloadBody>,
) -> impl IntoResponse {
    if body.bot_nick.is_empty() || body.package_number == 0 || body.file_name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "botNick, packageNumber, and fileName are required".to_string(),
            }),
        )
            .into_response();
    }

    state
        .xdcc
        .request_file(&body.bot_nick, body.package_number, &body.file_name)
        .await;

    StatusCode::CREATED.into_response()
}

/// `GET /downloads`: snapshot of the downloads table.
pub async fn list_downloads(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.xdcc.downloads().snapshot().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irc::IrcEngine;
    use crate::xdcc::{FileWriteOpener, TcpDialer, XdccEngine};
    use axum::body::Body;
    use axum::http::Request;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let (client, _server) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(client);
        let irc = IrcEngine::start(read_half, write_half, CancellationToken::new());
        let tmp = tempfile::tempdir().unwrap();
        let xdcc = XdccEngine::start(
            irc,
            Box::new(TcpDialer),
            Box::new(FileWriteOpener::new(tmp.path())),
            false,
        );
        AppState { xdcc }
    }

    #[tokio::test]
    async fn rejects_missing_fields_with_400() {
        let app = routes().with_state(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/downloads")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"botNick":"","packageNumber":0,"fileName":""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_body_with_an_absent_field_as_400() {
        let app = routes().with_state(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/downloads")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"botNick":"b0t","packageNumber":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_non_json_body_with_400() {
        let app = routes().with_state(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/downloads")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_downloads_returns_empty_array_initially() {
        let app = routes().with_state(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/downloads").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"[]");
    }
}
