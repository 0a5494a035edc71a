use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::{
    extract::{Multipart, Query, State, WebSocketUpgrade},
    http::{Response, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use cards::CardDatabase;
use clap::Parser;
use draft::{
    paper::{decode_paper_sets, PaperSet},
    server::SessionRegistry,
    CardData, SessionId,
};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod cards;
mod draft;
mod error;

/// Collation data file, looked up in the data directory.
const PAPER_SETS_FILE: &str = "sealed_extended_data.json";

#[derive(Parser)]
#[command(about = "Booster draft server")]
struct Args {
    /// Directory of static files to serve.
    #[arg(env = "DRAFT_STATIC")]
    content: PathBuf,

    /// Directory holding downloaded card data.
    #[arg(env = "DRAFT_DATA")]
    data: PathBuf,

    #[arg(short, long, env = "DRAFT_PORT", default_value_t = 8080)]
    port: u16,
}

#[derive(serde::Serialize)]
struct Resp {
    message: String,
    success: bool,
}

impl Resp {
    fn axum<S: ToString>(message: S, status: StatusCode) -> Response<String> {
        match serde_json::ser::to_string(&Self {
            message: message.to_string(),
            success: status == StatusCode::OK,
        }) {
            Ok(body) => {
                let mut resp = Response::new(body);
                *resp.status_mut() = status;
                resp
            }
            Err(e) => {
                let mut resp = Response::new(format!("Failed to JSON encode response: {e}"));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                resp
            }
        }
    }

    fn ok<S: ToString>(message: S) -> Response<String> {
        Self::axum(message, StatusCode::OK)
    }

    fn e404<S: ToString>(message: S) -> Response<String> {
        Self::axum(message, StatusCode::NOT_FOUND)
    }

    fn e500<S: ToString>(message: S) -> Response<String> {
        Self::axum(message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn e422<S: ToString>(message: S) -> Response<String> {
        Self::axum(message, StatusCode::UNPROCESSABLE_ENTITY)
    }
}

#[derive(Clone)]
struct AppState {
    cards: Arc<CardData>,
    registry: SessionRegistry,
}

#[derive(serde::Deserialize)]
struct ConnectParams {
    session: SessionId,
    user: Option<Uuid>,
    #[serde(default)]
    name: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> axum::response::Response {
    let Some(session) = state.registry.get(params.session) else {
        return Resp::e404(format!("No session {}.", params.session)).into_response();
    };
    let user = params.user.unwrap_or_else(Uuid::new_v4);
    ws.on_upgrade(move |socket| draft::handlers::handle_socket(socket, session, user, params.name))
}

async fn create_handler(State(state): State<AppState>, data: Multipart) -> Response<String> {
    draft::handlers::handle_create_request(state.cards, state.registry, data).await
}

async fn load_card_database(data: &Path) -> Result<CardDatabase, String> {
    let scryfall_cards = cards::scryfall::load_cards(data).await?;
    tracing::debug!("Inserting scryfall data to card database.");
    let mut database = CardDatabase::new();
    for card in scryfall_cards {
        database.add(card);
    }
    tracing::debug!(
        "Succesfully populated card database with {} cards.",
        database.size()
    );
    Ok(database)
}

/// Collation data is optional: without it paper boosters are unavailable.
fn load_paper_sets(data: &Path) -> HashMap<String, PaperSet> {
    let path = data.join(PAPER_SETS_FILE);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("No collation data at {}: {e}", path.display());
            return HashMap::new();
        }
    };
    match decode_paper_sets(&bytes) {
        Ok(sets) => {
            tracing::debug!("Loaded collation data for {} sets.", sets.len());
            sets
        }
        Err(e) => {
            tracing::error!("Failed to decode collation data: {e}");
            HashMap::new()
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging();

    let database = match load_card_database(&args.data).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to load scryfall card list: {e}");
            std::process::exit(1);
        }
    };
    let state = AppState {
        cards: Arc::new(CardData {
            database,
            paper_sets: load_paper_sets(&args.data),
        }),
        registry: SessionRegistry::new(),
    };

    let app = Router::new()
        .fallback_service(ServeDir::new(&args.content).append_index_html_on_directories(true))
        .route("/ws", get(ws_handler))
        .route("/api/sessions", post(create_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port = args.port;
    let listener = match TcpListener::bind(format!("0.0.0.0:{port}")).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to open port {port}: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on port {port}.");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Closed due to error: {e}");
    }
}
