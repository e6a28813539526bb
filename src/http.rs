use crate::{
    aggregation::{Aggregation, Intensity, ParticipantFilter},
    backend::{AvailabilityBackend, StoreError},
    scheduling::{self, CreateError},
    slot_grid::{date_label, time_label, DateLabel, SlotGrid},
    types::{hh_mm, NewEvent, Participant, ParticipantRef, SlotCoordinate},
};
use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, convert::Infallible};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error};
use uuid::Uuid;

pub const EVENT_PASSWORD_HEADER: &str = "x-event-password";

type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct AppState<B: AvailabilityBackend> {
    pub backend: B,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CreateEventRequest {
    user_name: String,
    name: String,
    password: Option<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    #[serde(with = "hh_mm")]
    start_time: NaiveTime,
    #[serde(with = "hh_mm")]
    end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CreatedEvent {
    event_id: Uuid,
    participant_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventSummary {
    id: Uuid,
    name: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    #[serde(with = "hh_mm")]
    start_time: NaiveTime,
    #[serde(with = "hh_mm")]
    end_time: NaiveTime,
    password_protected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PasswordRequest {
    password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PasswordVerdict {
    verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JoinRequest {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Roster {
    count: usize,
    participants: Vec<Participant>,
}

#[derive(Debug, Clone, Serialize)]
struct GridResponse {
    dates: Vec<NaiveDate>,
    date_labels: Vec<DateLabel>,
    times: Vec<String>,
    time_labels: Vec<String>,
    trailing_time: String,
    trailing_label: String,
    cell_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct AggregateQuery {
    /// Comma separated participant ids
    users: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlotSummary {
    key: String,
    date: NaiveDate,
    #[serde(with = "hh_mm")]
    time: NaiveTime,
    count: usize,
    intensity: Intensity,
    contributors: Vec<ParticipantRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AggregateResponse {
    heading: String,
    summary: String,
    total_participants: usize,
    max_count: usize,
    slots: Vec<SlotSummary>,
}

pub fn create_app<B: AvailabilityBackend>(backend: B) -> Router {
    let state = AppState { backend };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/events", post(create_event::<B>))
        .route("/events/:event_id", get(get_event::<B>))
        .route(
            "/events/:event_id/verify_password",
            post(verify_password::<B>),
        );

    let gated = Router::new()
        .route("/events/:event_id/grid", get(get_grid::<B>))
        .route(
            "/events/:event_id/participants",
            get(get_participants::<B>).post(add_participant::<B>),
        )
        .route(
            "/events/:event_id/participants/:participant_id/availability",
            get(get_availability::<B>)
                .post(record_presence::<B>)
                .delete(clear_presence::<B>),
        )
        .route("/events/:event_id/aggregate", get(get_aggregate::<B>))
        .route("/events/:event_id/updates", get(get_updates::<B>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            event_password::<B>,
        ));

    Router::new()
        .merge(public)
        .merge(gated)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::EventNotFound(_) | StoreError::ParticipantNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        StoreError::Storage(_) => {
            error!(%err, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn create_error(err: CreateError) -> ApiError {
    match err {
        CreateError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
        CreateError::Store(err) => store_error(err),
    }
}

async fn event_password<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let event_id = params
        .get("event_id")
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or((StatusCode::BAD_REQUEST, "Invalid event id".to_string()))?;
    let candidate = request
        .headers()
        .get(EVENT_PASSWORD_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let verified = state
        .backend
        .verify_password(event_id, &candidate)
        .await
        .map_err(store_error)?;
    if !verified {
        debug!(%event_id, "Rejected request with incorrect event password");
        return Err((StatusCode::UNAUTHORIZED, "Incorrect password".to_string()));
    }
    Ok(next.run(request).await)
}

async fn create_event<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<CreatedEvent>), ApiError> {
    let new_event = NewEvent {
        name: request.name,
        password: request.password,
        start_date: request.start_date,
        end_date: request.end_date,
        start_time: request.start_time,
        end_time: request.end_time,
    };
    let (event, creator) = scheduling::create_event(&state.backend, &request.user_name, new_event)
        .await
        .map_err(create_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedEvent {
            event_id: event.id,
            participant_id: creator.id,
        }),
    ))
}

async fn get_event<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventSummary>, ApiError> {
    let event = state.backend.event(event_id).await.map_err(store_error)?;
    Ok(Json(EventSummary {
        id: event.id,
        password_protected: event.password_protected(),
        name: event.name,
        start_date: event.start_date,
        end_date: event.end_date,
        start_time: event.start_time,
        end_time: event.end_time,
    }))
}

async fn verify_password<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<PasswordRequest>,
) -> Result<Json<PasswordVerdict>, ApiError> {
    let verified = state
        .backend
        .verify_password(event_id, &request.password)
        .await
        .map_err(store_error)?;
    Ok(Json(PasswordVerdict { verified }))
}

async fn get_grid<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<GridResponse>, ApiError> {
    let event = state.backend.event(event_id).await.map_err(store_error)?;
    let grid = SlotGrid::for_event(&event);

    Ok(Json(GridResponse {
        date_labels: grid.dates.iter().copied().map(date_label).collect(),
        times: grid
            .times
            .iter()
            .map(|time| time.format("%H:%M").to_string())
            .collect(),
        time_labels: grid.times.iter().copied().map(time_label).collect(),
        trailing_time: grid.trailing_time.format("%H:%M").to_string(),
        trailing_label: time_label(grid.trailing_time),
        cell_count: grid.cell_count(),
        dates: grid.dates,
    }))
}

async fn get_participants<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Roster>, ApiError> {
    let participants = state
        .backend
        .participants(event_id)
        .await
        .map_err(store_error)?;
    Ok(Json(Roster {
        count: participants.len(),
        participants,
    }))
}

async fn add_participant<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<JoinRequest>,
) -> Result<(StatusCode, Json<Participant>), ApiError> {
    let participant = scheduling::join_event(&state.backend, event_id, &request.name)
        .await
        .map_err(create_error)?;
    Ok((StatusCode::CREATED, Json(participant)))
}

async fn get_availability<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Path((event_id, participant_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<SlotCoordinate>>, ApiError> {
    let mut selected: Vec<SlotCoordinate> = state
        .backend
        .presence_for_participant(event_id, participant_id)
        .await
        .map_err(store_error)?
        .into_iter()
        .collect();
    selected.sort_unstable();
    Ok(Json(selected))
}

async fn check_on_grid<B: AvailabilityBackend>(
    backend: &B,
    event_id: Uuid,
    coordinate: &SlotCoordinate,
) -> Result<(), ApiError> {
    let event = backend.event(event_id).await.map_err(store_error)?;
    if !SlotGrid::for_event(&event).contains(coordinate) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Slot {coordinate} is outside of the event's time window"),
        ));
    }
    Ok(())
}

async fn record_presence<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Path((event_id, participant_id)): Path<(Uuid, Uuid)>,
    Json(coordinate): Json<SlotCoordinate>,
) -> Result<impl IntoResponse, ApiError> {
    check_on_grid(&state.backend, event_id, &coordinate).await?;
    state
        .backend
        .record_presence(event_id, participant_id, coordinate)
        .await
        .map_err(store_error)?;
    Ok((StatusCode::OK, "Availability saved".to_string()))
}

async fn clear_presence<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Path((event_id, participant_id)): Path<(Uuid, Uuid)>,
    Json(coordinate): Json<SlotCoordinate>,
) -> Result<impl IntoResponse, ApiError> {
    check_on_grid(&state.backend, event_id, &coordinate).await?;
    state
        .backend
        .clear_presence(event_id, participant_id, coordinate)
        .await
        .map_err(store_error)?;
    Ok((StatusCode::OK, "Availability removed".to_string()))
}

fn parse_filter(users: Option<&str>) -> Result<ParticipantFilter, ApiError> {
    users
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            Uuid::parse_str(id)
                .map_err(|_| (StatusCode::BAD_REQUEST, format!("Invalid participant id {id}")))
        })
        .collect()
}

async fn get_aggregate<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<AggregateQuery>,
) -> Result<Json<AggregateResponse>, ApiError> {
    let filter = parse_filter(query.users.as_deref())?;
    let aggregation = Aggregation::fetch(&state.backend, event_id)
        .await
        .map_err(store_error)?;
    let max_count = aggregation.max_count(&filter);

    let slots = aggregation
        .tallies(&filter)
        .into_iter()
        .map(|(coordinate, tally)| SlotSummary {
            key: coordinate.key(),
            date: coordinate.date,
            time: coordinate.time,
            intensity: Intensity::of(tally.count, max_count),
            count: tally.count,
            contributors: tally.contributors,
        })
        .collect();

    Ok(Json(AggregateResponse {
        heading: aggregation.heading(&filter),
        summary: aggregation.summary(&filter),
        total_participants: aggregation.total_participants(),
        max_count,
        slots,
    }))
}

/// Server-sent "changed" signals. The subscription ends with the connection.
async fn get_updates<B: AvailabilityBackend>(
    State(state): State<AppState<B>>,
    Path(event_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let signals = state
        .backend
        .subscribe(event_id)
        .map(|_| Ok(SseEvent::default().event("availability").data("changed")));
    Sse::new(signals).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{local_availability::LocalAvailability, testutils::MockAvailabilityBackend};
    use reqwest::Client;
    use serde_json::json;
    use std::time::Duration;
    use tokio::{task::JoinHandle, time::timeout};

    async fn init<B: AvailabilityBackend>(backend: B) -> (JoinHandle<()>, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        let app = create_app(backend);
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (server, address)
    }

    fn create_request(password: Option<&str>) -> serde_json::Value {
        json!({
            "user_name": "Stefan",
            "name": "Team Offsite",
            "password": password,
            "start_date": "2024-01-01",
            "end_date": "2024-01-03",
            "start_time": "09:00",
            "end_time": "12:00",
        })
    }

    async fn create(client: &Client, address: &str, password: Option<&str>) -> CreatedEvent {
        let response = client
            .post(format!("{address}/events"))
            .json(&create_request(password))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED.as_u16());
        response.json().await.unwrap()
    }

    async fn join(client: &Client, address: &str, event_id: Uuid, name: &str) -> Participant {
        let response = client
            .post(format!("{address}/events/{event_id}/participants"))
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED.as_u16());
        response.json().await.unwrap()
    }

    async fn mark(client: &Client, address: &str, event_id: Uuid, participant_id: Uuid) {
        let response = client
            .post(format!(
                "{address}/events/{event_id}/participants/{participant_id}/availability"
            ))
            .json(&json!({ "date": "2024-01-01", "time": "09:00" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16());
    }

    #[tokio::test]
    async fn test_create_and_get_event() {
        let (server, address) = init(LocalAvailability::default()).await;
        let client = Client::new();

        let created = create(&client, &address, None).await;
        let summary: EventSummary = client
            .get(format!("{address}/events/{}", created.event_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(summary.name, "Team Offsite");
        assert!(!summary.password_protected);

        let roster: Roster = client
            .get(format!("{address}/events/{}/participants", created.event_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(roster.count, 1);
        assert_eq!(roster.participants[0].id, created.participant_id);
        assert!(roster.participants[0].creator);

        server.abort();
    }

    #[test_case::test_case ("user_name", "  ", "Your name is required" ; "blank creator")]
    #[test_case::test_case ("name", "", "Event name is required" ; "blank event name")]
    #[test_case::test_case ("end_date", "2024-01-20", "at most 7 days" ; "too long")]
    #[test_case::test_case ("end_time", "08:00", "End time must be after" ; "reversed times")]
    #[tokio::test]
    async fn test_create_event_validation(field: &str, value: &str, message: &str) {
        let (server, address) = init(LocalAvailability::default()).await;
        let mut request = create_request(None);
        request[field] = json!(value);

        let response = Client::new()
            .post(format!("{address}/events"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST.as_u16());
        assert!(response.text().await.unwrap().contains(message));

        server.abort();
    }

    #[test_case::test_case ("get", "grid", None, StatusCode::UNAUTHORIZED)]
    #[test_case::test_case ("get", "grid", Some("wrong"), StatusCode::UNAUTHORIZED)]
    #[test_case::test_case ("get", "grid", Some("123"), StatusCode::OK)]
    #[test_case::test_case ("get", "participants", None, StatusCode::UNAUTHORIZED)]
    #[test_case::test_case ("get", "participants", Some("123"), StatusCode::OK)]
    #[test_case::test_case ("get", "aggregate", None, StatusCode::UNAUTHORIZED)]
    #[test_case::test_case ("get", "aggregate", Some("123"), StatusCode::OK)]
    #[test_case::test_case ("post", "participants", None, StatusCode::UNAUTHORIZED)]
    #[test_case::test_case ("post", "participants", Some("123"), StatusCode::CREATED)]
    #[tokio::test]
    async fn test_password_gate(
        method: &str,
        path: &str,
        password: Option<&str>,
        status_code: StatusCode,
    ) {
        let (server, address) = init(LocalAvailability::default()).await;
        let client = Client::new();
        let created = create(&client, &address, Some("123")).await;

        let url = format!("{address}/events/{}/{path}", created.event_id);
        let mut request_builder = match method {
            "get" => client.get(url),
            "post" => client.post(url).json(&json!({ "name": "Peter" })),
            _ => panic!("Unsupported HTTP method: {}", method),
        };
        if let Some(password) = password {
            request_builder = request_builder.header(EVENT_PASSWORD_HEADER, password);
        }
        let response = request_builder.send().await.unwrap();
        assert_eq!(response.status(), status_code.as_u16());

        server.abort();
    }

    #[tokio::test]
    async fn test_verify_password() {
        let (server, address) = init(LocalAvailability::default()).await;
        let client = Client::new();
        let created = create(&client, &address, Some("123")).await;

        let summary: EventSummary = client
            .get(format!("{address}/events/{}", created.event_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(summary.password_protected);

        for (password, expected) in [("123", true), ("12", false), ("", false)] {
            let verdict: PasswordVerdict = client
                .post(format!("{address}/events/{}/verify_password", created.event_id))
                .json(&json!({ "password": password }))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(verdict.verified, expected, "{password}");
        }

        server.abort();
    }

    #[tokio::test]
    async fn test_grid() {
        let (server, address) = init(LocalAvailability::default()).await;
        let client = Client::new();
        let created = create(&client, &address, None).await;

        let grid: serde_json::Value = client
            .get(format!("{address}/events/{}/grid", created.event_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(grid["cell_count"], 18);
        assert_eq!(grid["dates"].as_array().unwrap().len(), 3);
        assert_eq!(grid["times"][1], "09:30");
        assert_eq!(grid["trailing_time"], "12:00");
        assert_eq!(grid["trailing_label"], "12:00 PM");
        assert_eq!(grid["date_labels"][0]["weekday"], "Mon");

        server.abort();
    }

    #[tokio::test]
    async fn test_record_and_clear_presence() {
        let (server, address) = init(LocalAvailability::default()).await;
        let client = Client::new();
        let created = create(&client, &address, None).await;
        let url = format!(
            "{address}/events/{}/participants/{}/availability",
            created.event_id, created.participant_id
        );

        mark(&client, &address, created.event_id, created.participant_id).await;
        mark(&client, &address, created.event_id, created.participant_id).await;

        let selected: Vec<SlotCoordinate> =
            client.get(&url).send().await.unwrap().json().await.unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].key(), "2024-01-01-09:00");

        let response = client
            .delete(&url)
            .json(&json!({ "date": "2024-01-01", "time": "09:00" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16());

        let selected: Vec<SlotCoordinate> =
            client.get(&url).send().await.unwrap().json().await.unwrap();
        assert!(selected.is_empty());

        server.abort();
    }

    #[test_case::test_case ("2024-01-04", "09:00" ; "day after the event")]
    #[test_case::test_case ("2024-01-01", "12:00" ; "trailing label")]
    #[test_case::test_case ("2024-01-01", "09:15" ; "off the half hour")]
    #[tokio::test]
    async fn test_presence_outside_grid_is_rejected(date: &str, time: &str) {
        let (server, address) = init(LocalAvailability::default()).await;
        let client = Client::new();
        let created = create(&client, &address, None).await;

        let response = client
            .post(format!(
                "{address}/events/{}/participants/{}/availability",
                created.event_id, created.participant_id
            ))
            .json(&json!({ "date": date, "time": time }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST.as_u16());

        server.abort();
    }

    #[tokio::test]
    async fn test_unknown_records() {
        let (server, address) = init(LocalAvailability::default()).await;
        let client = Client::new();

        let response = client
            .get(format!("{address}/events/{}", Uuid::new_v4()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND.as_u16());

        let response = client
            .get(format!("{address}/events/{}/aggregate", Uuid::new_v4()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND.as_u16());

        let created = create(&client, &address, None).await;
        let response = client
            .post(format!(
                "{address}/events/{}/participants/{}/availability",
                created.event_id,
                Uuid::new_v4()
            ))
            .json(&json!({ "date": "2024-01-01", "time": "09:00" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND.as_u16());

        server.abort();
    }

    #[tokio::test]
    async fn test_aggregate_with_filter() {
        let (server, address) = init(LocalAvailability::default()).await;
        let client = Client::new();
        let created = create(&client, &address, None).await;
        let event_id = created.event_id;
        let a = created.participant_id;
        let b = join(&client, &address, event_id, "Peter").await.id;
        let c = join(&client, &address, event_id, "Anna").await.id;
        mark(&client, &address, event_id, a).await;
        mark(&client, &address, event_id, b).await;

        let all: AggregateResponse = client
            .get(format!("{address}/events/{event_id}/aggregate"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(all.heading, "Group Availability");
        assert_eq!(all.summary, "3 people responded");
        assert_eq!(all.max_count, 3);
        assert_eq!(all.slots.len(), 1);
        assert_eq!(all.slots[0].key, "2024-01-01-09:00");
        assert_eq!(all.slots[0].count, 2);
        assert_eq!(all.slots[0].intensity, Intensity::High);

        let filtered: AggregateResponse = client
            .get(format!("{address}/events/{event_id}/aggregate?users={b},{c}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(filtered.heading, "2 Users' Availability");
        assert_eq!(filtered.max_count, 2);
        assert_eq!(filtered.slots[0].count, 1);
        assert_eq!(filtered.slots[0].contributors[0].id, b);
        assert_eq!(filtered.slots[0].contributors[0].name, "Peter");

        let only_c: AggregateResponse = client
            .get(format!("{address}/events/{event_id}/aggregate?users={c}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(only_c.heading, "Anna's Availability");
        assert!(only_c.slots.is_empty());

        let response = client
            .get(format!("{address}/events/{event_id}/aggregate?users=nobody"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST.as_u16());

        server.abort();
    }

    async fn read_signals(response: &mut reqwest::Response, received: &mut String, expected: usize) {
        timeout(Duration::from_secs(2), async {
            while received.matches("data: changed").count() < expected {
                let chunk = response.chunk().await.unwrap().unwrap();
                received.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_updates_stream() {
        let (server, address) = init(LocalAvailability::default()).await;
        let client = Client::new();
        let created = create(&client, &address, None).await;

        let mut response = client
            .get(format!("{address}/events/{}/updates", created.event_id))
            .send()
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .unwrap()
                .to_str()
                .unwrap(),
            "text/event-stream"
        );

        let mut received = String::new();
        read_signals(&mut response, &mut received, 1).await;
        mark(&client, &address, created.event_id, created.participant_id).await;
        read_signals(&mut response, &mut received, 2).await;

        server.abort();
    }

    #[tokio::test]
    async fn test_store_failure() {
        let backend = MockAvailabilityBackend::new();
        backend.fail(true);
        let (server, address) = init(backend).await;

        let response = Client::new()
            .post(format!("{address}/events"))
            .json(&create_request(None))
            .send()
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::INTERNAL_SERVER_ERROR.as_u16()
        );

        server.abort();
    }
}
