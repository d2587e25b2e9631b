use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{routing::get, routing::post, Json, Router};
use serde::Deserialize;
use textlabel_core::{AnnotateError, Annotator, PageView, Stats, Submission, Summary};
use thiserror::Error;
use tokio::task;
use tracing::{error, info};

pub type SharedAnnotator = Arc<Annotator>;

pub fn router(annotator: SharedAnnotator) -> Router {
    Router::new()
        .route("/", get(redirect_to_first))
        .route("/label/:ordinal", get(serve_ui))
        .route("/api/items/:ordinal", get(handle_view))
        .route("/api/items/:ordinal/labels/:label", post(handle_submit))
        .route("/api/stats", get(handle_stats))
        .with_state(annotator)
}

pub async fn serve(annotator: SharedAnnotator, bind: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, router(annotator)).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    values: Vec<String>,
}

async fn redirect_to_first() -> Redirect {
    Redirect::to("/label/0")
}

async fn serve_ui(AxumPath(_ordinal): AxumPath<usize>) -> Html<&'static str> {
    Html(include_str!("../../../ui/index.html"))
}

async fn handle_view(
    State(annotator): State<SharedAnnotator>,
    AxumPath(ordinal): AxumPath<usize>,
) -> Result<Json<PageView>, AppError> {
    let view = task::spawn_blocking(move || annotator.view(ordinal))
        .await
        .map_err(AppError::internal)?;
    match view {
        Ok(view) => Ok(Json(view)),
        Err(err @ AnnotateError::OutOfRange { .. }) => Err(AppError::NotFound(err.to_string())),
        Err(err) => Err(err.into()),
    }
}

async fn handle_submit(
    State(annotator): State<SharedAnnotator>,
    AxumPath((ordinal, label)): AxumPath<(usize, String)>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<Stats>, AppError> {
    let submission = Submission {
        ordinal,
        label,
        values: body.values,
    };
    let stats = task::spawn_blocking(move || annotator.submit(&submission))
        .await
        .map_err(AppError::internal)??;
    Ok(Json(stats))
}

async fn handle_stats(
    State(annotator): State<SharedAnnotator>,
) -> Result<Json<Summary>, AppError> {
    let summary = task::spawn_blocking(move || annotator.summary())
        .await
        .map_err(AppError::internal)?;
    Ok(Json(summary))
}

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("annotation kept in memory but not saved: {0}")]
    Unsaved(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }
}

impl From<AnnotateError> for AppError {
    fn from(err: AnnotateError) -> Self {
        match err {
            AnnotateError::Persist { .. } => AppError::Unsaved(err.to_string()),
            err if err.is_client_error() => AppError::BadRequest(err.to_string()),
            other => AppError::internal(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            AppError::Unsaved(_) => {
                let msg = self.to_string();
                error!("persist_error" = %msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
            AppError::Internal(err) => {
                error!("internal_error" = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use textlabel_core::ItemSource;

    fn annotator(root: &Path) -> SharedAnnotator {
        let files = root.join("files");
        fs::create_dir_all(&files).unwrap();
        fs::write(files.join("a.txt"), "alpha").unwrap();
        fs::write(files.join("b.txt"), "beta").unwrap();
        let labels = root.join("labels.json");
        fs::write(
            &labels,
            r#"{"sentiment": {"options": ["pos", "neg"]}, "topics": {"options": ["x", "y"], "type": "multiple"}}"#,
        )
        .unwrap();
        let source = ItemSource::Directory {
            path: files,
            patterns: "*.txt".into(),
            max_bytes: 1024,
        };
        Arc::new(Annotator::open(&source, &labels, &root.join("results.csv")).unwrap())
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn view_returns_item_json() {
        let dir = tempfile::tempdir().unwrap();
        let state = annotator(dir.path());
        let Json(view) = handle_view(State(state), AxumPath(1)).await.unwrap();
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["status"], "item");
        assert_eq!(value["identifier"], "b.txt");
        assert_eq!(value["navigation"]["previous"], 0);
        assert!(value["navigation"]["next"].is_null());
        assert_eq!(value["labels"][1]["kind"], "multiple");
        assert_eq!(value["labels"][1]["options"][0]["shortcut_key"], "3");
    }

    #[tokio::test]
    async fn view_out_of_range_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = annotator(dir.path());
        let err = handle_view(State(state), AxumPath(7)).await.unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("out of range"));
    }

    #[tokio::test]
    async fn submit_updates_stats() {
        let dir = tempfile::tempdir().unwrap();
        let state = annotator(dir.path());
        let Json(stats) = handle_submit(
            State(state.clone()),
            AxumPath((0, "topics".to_string())),
            Json(SubmitRequest {
                values: vec!["y".into(), "x".into()],
            }),
        )
        .await
        .unwrap();
        assert_eq!(stats.position, 1);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.annotated, 1);
        assert_eq!(
            state.ledger().value("a.txt", "topics").as_deref(),
            Some("x, y")
        );
    }

    #[tokio::test]
    async fn submit_rejects_unknown_value() {
        let dir = tempfile::tempdir().unwrap();
        let state = annotator(dir.path());
        let err = handle_submit(
            State(state.clone()),
            AxumPath((0, "sentiment".to_string())),
            Json(SubmitRequest {
                values: vec!["meh".into()],
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert!(state.ledger().is_empty());
    }

    #[tokio::test]
    async fn submit_reports_unsaved_annotations() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let state = annotator(&data);
        fs::remove_dir_all(&data).unwrap();
        fs::write(&data, "blocker").unwrap();
        let err = handle_submit(
            State(state.clone()),
            AxumPath((0, "sentiment".to_string())),
            Json(SubmitRequest {
                values: vec!["pos".into()],
            }),
        )
        .await
        .unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("not saved"));
        assert_eq!(state.ledger().value("a.txt", "sentiment").as_deref(), Some("pos"));
    }

    #[tokio::test]
    async fn stats_summarise_progress() {
        let dir = tempfile::tempdir().unwrap();
        let state = annotator(dir.path());
        state
            .submit(&Submission {
                ordinal: 1,
                label: "sentiment".into(),
                values: vec!["neg".into()],
            })
            .unwrap();
        let Json(summary) = handle_stats(State(state)).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.annotated, 1);
        assert_eq!(summary.label_counts.get("sentiment"), Some(&1));
    }

    #[tokio::test]
    async fn view_waits_for_an_in_flight_write() {
        let dir = tempfile::tempdir().unwrap();
        let state = annotator(dir.path());
        let writer = {
            let state = state.clone();
            task::spawn_blocking(move || {
                state.submit(&Submission {
                    ordinal: 0,
                    label: "sentiment".into(),
                    values: vec!["pos".into()],
                })
            })
        };
        let (viewed, written) = tokio::join!(handle_view(State(state.clone()), AxumPath(0)), writer);
        written.unwrap().unwrap();
        assert!(viewed.is_ok());
        let Json(summary) = handle_stats(State(state)).await.unwrap();
        assert_eq!(summary.annotated, 1);
    }

    #[tokio::test]
    async fn ui_shortcuts_never_clear_a_radio_choice() {
        let Html(page) = serve_ui(AxumPath(0)).await;
        assert!(page.contains("target.input.click()"));
        assert!(!page.contains("submit(label.name, [])"));
    }

    #[test]
    fn router_builds() {
        let dir = tempfile::tempdir().unwrap();
        let _ = router(annotator(dir.path()));
    }
}
