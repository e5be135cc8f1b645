use crate::bridge::state::AppState;
use crate::stream::request::{StreamQuery, StreamRequest};
use crate::stream::session::{Session, MAX_MESSAGE_SIZE};
use log::{debug, warn};
use sandcore::detection::DetectionSettings;
use sandcore::device::{indicate, FrameKind, LedState};
use sandcore::prelude::{SandError, SandResult};
use sandcore::stream::PayloadRenderer;
use serde_json::json;
use std::convert::Infallible;
use warp::http::{header, StatusCode};
use warp::hyper::body::Bytes;
use warp::path::Tail;
use warp::ws::Ws;
use warp::{Filter, Rejection, Reply};

const CONTROL_BODY_LIMIT: u64 = 16 * 1024;

#[derive(Debug)]
struct RouteError(SandError);

impl warp::reject::Reject for RouteError {}

fn reject(err: SandError) -> Rejection {
    warp::reject::custom(RouteError(err))
}

/// Full route table of the sandbox server.
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let state_filter = warp::any().map(move || state.clone());
    let control_body =
        warp::body::content_length_limit(CONTROL_BODY_LIMIT).and(warp::body::bytes());

    let stream_route = warp::path("stream")
        .and(warp::path::tail())
        .and(warp::query::<StreamQuery>())
        .and(warp::ws())
        .and(state_filter.clone())
        .and_then(open_stream);

    let data_route = warp::path!("data")
        .and(warp::get())
        .and(warp::query::<StreamQuery>())
        .and(state_filter.clone())
        .and_then(|query: StreamQuery, state: AppState| async move {
            let detection = query.detection_enabled();
            let payload =
                capture(&state, move |renderer| renderer.payload(detection)).await?;
            Ok::<_, Rejection>(warp::reply::json(&payload))
        });

    let depth_route = warp::path!("deptharray")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(|state: AppState| async move {
            capture(&state, |renderer| renderer.depth_text()).await
        });

    let frame_route = warp::path!("frame" / String)
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(|name: String, state: AppState| async move {
            let kind = name.parse::<FrameKind>().map_err(|err| {
                debug!("frame request rejected: {}", err);
                warp::reject::not_found()
            })?;
            let jpeg = capture(&state, move |renderer| renderer.jpeg(kind)).await?;
            Ok::<_, Rejection>(warp::reply::with_header(
                jpeg,
                header::CONTENT_TYPE,
                "image/jpeg",
            ))
        });

    let circles_route = warp::path!("circles")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(|state: AppState| async move {
            let settings = *state.store.get();
            let circles =
                capture(&state, move |renderer| Ok(renderer.circles(&settings))).await?;
            Ok::<_, Rejection>(warp::reply::json(&circles))
        });

    let circles_once_route = warp::path!("circles")
        .and(warp::post())
        .and(control_body.clone())
        .and(state_filter.clone())
        .and_then(|body: Bytes, state: AppState| async move {
            let settings = DetectionSettings::parse(&body).map_err(reject)?;
            let circles =
                capture(&state, move |renderer| Ok(renderer.circles(&settings))).await?;
            Ok::<_, Rejection>(warp::reply::json(&circles))
        });

    let config_update_route = warp::path!("circledetectionconfig")
        .and(warp::post())
        .and(control_body)
        .and(state_filter.clone())
        .and_then(|body: Bytes, state: AppState| async move {
            state.store.apply_json(&body).map_err(reject)?;
            Ok::<_, Rejection>(warp::reply::with_status(
                "detection config updated",
                StatusCode::OK,
            ))
        });

    let config_read_route = warp::path!("circledetectionconfig")
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: AppState| {
            let settings = state.store.get();
            warp::reply::json(&settings.custom())
        });

    let status_route = warp::path!("status")
        .and(warp::get())
        .and(state_filter)
        .map(|state: AppState| {
            let metrics = state.metrics.snapshot();
            warp::reply::json(&json!({
                "sessions": metrics,
                "active_sessions": metrics.active_sessions(),
                "detection": state.store.get().custom(),
            }))
        });

    stream_route
        .or(data_route)
        .or(depth_route)
        .or(frame_route)
        .or(circles_route)
        .or(circles_once_route)
        .or(config_update_route)
        .or(config_read_route)
        .or(status_route)
        .recover(handle_rejection)
}

async fn open_stream(
    tail: Tail,
    query: StreamQuery,
    ws: Ws,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let request = StreamRequest::from_path(
        tail.as_str(),
        query.detection_enabled(),
        state.default_interval,
    )
    .map_err(|err| {
        debug!("stream request rejected: {}", err);
        warp::reject::not_found()
    })?;

    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            Session::new(request, state.renderer, state.metrics)
                .with_timings(state.timings)
                .run(socket)
                .await;
        }))
}

/// Runs a blocking capture job with the indicator lit for its duration.
async fn capture<T, F>(state: &AppState, job: F) -> Result<T, Rejection>
where
    T: Send + 'static,
    F: FnOnce(&PayloadRenderer) -> SandResult<T> + Send + 'static,
{
    let renderer = state.renderer.clone();
    tokio::task::spawn_blocking(move || {
        indicate(renderer.camera(), LedState::Green);
        let outcome = job(&renderer);
        indicate(renderer.camera(), LedState::Off);
        outcome
    })
    .await
    .map_err(|err| SandError::Capture(format!("capture task failed: {}", err)))
    .and_then(|outcome| outcome)
    .map_err(reject)
}

async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(RouteError(err)) = rejection.find::<RouteError>() {
        let status = match err {
            SandError::ConfigParse(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("request failed: {}", err);
        }
        (status, err.to_string())
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "body too large".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        (StatusCode::BAD_REQUEST, format!("{:?}", rejection))
    };
    Ok(warp::reply::with_status(message, status))
}
