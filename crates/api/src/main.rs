use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cardman_core::domain::card::CardRecord;
use cardman_core::domain::recommendation::Recommendation;
use cardman_core::extract::CardExtractor;
use cardman_core::llm::error::ServiceError;
use cardman_core::llm::openai::OpenAiClient;
use cardman_core::llm::{CompletionClient, ImagePayload};
use cardman_core::recommend::Recommender;
use cardman_core::store::{CardStoreClient, StoredCard, UserCard};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = cardman_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let llm: Arc<dyn CompletionClient> = Arc::new(OpenAiClient::from_settings(&settings)?);
    tracing::info!(provider = ?llm.provider(), "model client ready");

    let store = match CardStoreClient::from_settings(&settings) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::error!(error = %e, "card store unconfigured; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        extractor: CardExtractor::new(llm.clone(), &settings),
        recommender: Recommender::new(llm, &settings),
        store,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/cards", get(list_cards).post(create_card))
        .route("/cards/extract", post(extract_card))
        .route("/cards/extract-image", post(extract_card_image))
        .route(
            "/cards/:card_id",
            get(get_card).delete(delete_card),
        )
        .route("/users/:user_id/cards", get(get_user_cards).post(add_user_card))
        .route(
            "/users/:user_id/cards/:card_id",
            axum::routing::delete(remove_user_card),
        )
        .route("/recommendations", post(recommend))
        .route("/recommendations/image", post(recommend_image))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    extractor: CardExtractor,
    recommender: Recommender,
    store: Option<Arc<CardStoreClient>>,
}

#[derive(Debug, Deserialize)]
struct ExtractBody {
    card_name: String,
}

#[derive(Debug, Deserialize)]
struct ImageBody {
    media_type: String,
    data_base64: String,
}

#[derive(Debug, Deserialize)]
struct AddCardBody {
    card_id: String,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecommendBody {
    description: String,
    #[serde(default)]
    cards: Option<Vec<CardRecord>>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecommendImageBody {
    media_type: String,
    data_base64: String,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    cards: Option<Vec<CardRecord>>,
    #[serde(default)]
    user_id: Option<String>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

async fn extract_card(
    State(state): State<AppState>,
    Json(body): Json<ExtractBody>,
) -> Result<Json<CardRecord>, ApiError> {
    let record = state
        .extractor
        .extract_from_name(&body.card_name)
        .await
        .map_err(into_response)?;
    Ok(Json(record))
}

async fn extract_card_image(
    State(state): State<AppState>,
    Json(body): Json<ImageBody>,
) -> Result<Json<CardRecord>, ApiError> {
    let image = ImagePayload {
        media_type: body.media_type,
        data_base64: body.data_base64,
    };
    let record = state
        .extractor
        .extract_from_image(image)
        .await
        .map_err(into_response)?;
    Ok(Json(record))
}

async fn list_cards(State(state): State<AppState>) -> Result<Json<Vec<StoredCard>>, ApiError> {
    let store = require_store(&state)?;
    let cards = store.list_cards().await.map_err(into_response)?;
    Ok(Json(cards))
}

async fn get_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> Result<Json<StoredCard>, ApiError> {
    let store = require_store(&state)?;
    let card = store.get_card(&card_id).await.map_err(into_response)?;
    Ok(Json(card))
}

async fn delete_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let store = require_store(&state)?;
    store.delete_card(&card_id).await.map_err(into_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_card(
    State(state): State<AppState>,
    Json(record): Json<CardRecord>,
) -> Result<Json<StoredCard>, ApiError> {
    let store = require_store(&state)?;
    let card = store.create_card(&record).await.map_err(into_response)?;
    Ok(Json(card))
}

async fn add_user_card(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<AddCardBody>,
) -> Result<StatusCode, ApiError> {
    let store = require_store(&state)?;
    store
        .add_card_to_user(&user_id, &body.card_id, body.notes.as_deref())
        .await
        .map_err(into_response)?;
    Ok(StatusCode::CREATED)
}

async fn remove_user_card(
    State(state): State<AppState>,
    Path((user_id, card_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let store = require_store(&state)?;
    store
        .remove_card_from_user(&user_id, &card_id)
        .await
        .map_err(into_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_user_cards(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<UserCard>>, ApiError> {
    let store = require_store(&state)?;
    let cards = store.user_cards(&user_id).await.map_err(into_response)?;
    Ok(Json(cards))
}

async fn recommend(
    State(state): State<AppState>,
    Json(body): Json<RecommendBody>,
) -> Result<Json<Recommendation>, ApiError> {
    let cards = resolve_cards(&state, body.cards, body.user_id.as_deref()).await?;
    let rec = state
        .recommender
        .recommend(&cards, &body.description)
        .await
        .map_err(into_response)?;
    Ok(Json(rec))
}

async fn recommend_image(
    State(state): State<AppState>,
    Json(body): Json<RecommendImageBody>,
) -> Result<Json<Recommendation>, ApiError> {
    let cards = resolve_cards(&state, body.cards, body.user_id.as_deref()).await?;
    let image = ImagePayload {
        media_type: body.media_type,
        data_base64: body.data_base64,
    };
    let rec = state
        .recommender
        .recommend_from_image(&cards, image, body.note.as_deref())
        .await
        .map_err(into_response)?;
    Ok(Json(rec))
}

/// Explicitly supplied cards win; otherwise the user's stored wallet is
/// fetched from the card store.
async fn resolve_cards(
    state: &AppState,
    cards: Option<Vec<CardRecord>>,
    user_id: Option<&str>,
) -> Result<Vec<CardRecord>, ApiError> {
    if let Some(cards) = cards.filter(|c| !c.is_empty()) {
        return Ok(cards);
    }

    let Some(user_id) = user_id else {
        return Err(into_response(ServiceError::missing_field("cards").into()));
    };

    let store = require_store(state)?;
    let user_cards = store.user_cards(user_id).await.map_err(into_response)?;
    Ok(user_cards
        .into_iter()
        .map(|uc| uc.card.into_record())
        .collect())
}

fn require_store(state: &AppState) -> Result<&Arc<CardStoreClient>, ApiError> {
    state.store.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({"error": "card store is not configured"})),
    ))
}

fn into_response(err: anyhow::Error) -> ApiError {
    let status = match err.downcast_ref::<ServiceError>() {
        Some(ServiceError::Validation { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(ServiceError::ExternalService { .. }) | Some(ServiceError::Parse { .. }) => {
            StatusCode::BAD_GATEWAY
        }
        None => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "request failed");
    } else {
        tracing::warn!(error = %err, "request rejected");
    }

    (status, Json(serde_json::json!({"error": err.to_string()})))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &cardman_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
