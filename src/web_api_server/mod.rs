//! Thin HTTP/Socket.IO adapter around the engine. Commands translate to
//! engine calls; queries are read-only and lock-free; events are forwarded
//! to subscribers best-effort. Authentication, rate limiting, and admin
//! token checks live upstream of this layer.

use crate::catalog::{
    self, BoosterId, BuildingId, DefenseId, OfficerId, PoolId, ResourceKind, ShipId, TechId,
};
use crate::config::CONFIG;
use crate::database::DbClient;
use crate::engine::commands::QueuedAction;
use crate::engine::premium::SpeedupTarget;
use crate::engine::{Engine, FleetView};
use crate::errors::{ErrorKind, GameError};
use crate::models::{Mission, PlanetId, Resources, SystemId};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use socketioxide::{SocketIo, TransportType};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator as _;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

pub struct WebApiServer {
    engine: Arc<Engine>,
    db_client: DbClient,
}

struct AppState {
    engine: Arc<Engine>,
    db_client: DbClient,
}

struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Precondition | ErrorKind::Insufficient => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Corruption | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.0.to_string();
        (status, Json(json!({ "error": self.0, "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_planet_id(raw: &str) -> Result<PlanetId, ApiError> {
    raw.parse().map_err(|_| {
        ApiError(GameError::InvalidCoordinates {
            coords: raw.to_string(),
        })
    })
}

// ---- command payloads ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterPayload {
    wallet: String,
    display_name: String,
    #[serde(default)]
    ip: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildPayload {
    agent_id: String,
    planet_id: PlanetId,
    building: BuildingId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanetOnlyPayload {
    agent_id: String,
    planet_id: PlanetId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResearchPayload {
    agent_id: String,
    planet_id: PlanetId,
    tech: TechId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentOnlyPayload {
    agent_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildShipPayload {
    agent_id: String,
    planet_id: PlanetId,
    ship: ShipId,
    count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildDefensePayload {
    agent_id: String,
    planet_id: PlanetId,
    defense: DefenseId,
    count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendFleetPayload {
    agent_id: String,
    from: PlanetId,
    to: PlanetId,
    ships: BTreeMap<ShipId, u32>,
    mission: Mission,
    #[serde(default)]
    cargo: Option<Resources>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecallPayload {
    agent_id: String,
    fleet_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueActionsPayload {
    agent_id: String,
    planet_id: PlanetId,
    actions: Vec<QueuedAction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameSystemPayload {
    agent_id: String,
    galaxy: i32,
    system: i32,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulateCombatPayload {
    agent_id: String,
    defender_planet: PlanetId,
    ships: BTreeMap<ShipId, u32>,
    #[serde(default)]
    trials: Option<u32>,
    seed: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfficerPayload {
    agent_id: String,
    officer: OfficerId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoosterPayload {
    agent_id: String,
    booster: BoosterId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeedupPayload {
    agent_id: String,
    #[serde(flatten)]
    target: SpeedupTarget,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuyResourcesPayload {
    agent_id: String,
    planet_id: PlanetId,
    resource: ResourceKind,
    amount: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantPayload {
    agent_id: String,
    amount: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StakePayload {
    agent_id: String,
    pool_id: PoolId,
    amount: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StakeRefPayload {
    agent_id: String,
    stake_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessagePayload {
    sender_id: String,
    recipient_id: String,
    body: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessagePayload {
    sender_id: String,
    channel: String,
    body: String,
}

fn validate_message_body(body: &str) -> Result<&str, ApiError> {
    let body = body.trim();
    if body.is_empty() || body.len() > 2000 {
        return Err(ApiError(GameError::InvalidArgument {
            detail: "message body must be 1-2000 characters".to_string(),
        }));
    }
    Ok(body)
}

fn internal(err: diesel::result::Error) -> ApiError {
    ApiError(GameError::Internal {
        detail: err.to_string(),
    })
}

// ---- command handlers ----

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPayload>,
) -> ApiResult<serde_json::Value> {
    let ip = payload.ip.as_deref().unwrap_or("0.0.0.0");
    let agent = state
        .engine
        .register(&payload.wallet, &payload.display_name, ip)?;
    Ok(Json(json!({ "agent": agent })))
}

async fn build_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BuildPayload>,
) -> ApiResult<serde_json::Value> {
    let job = state
        .engine
        .build(&payload.agent_id, payload.planet_id, payload.building)
        .await?;
    Ok(Json(json!({ "job": job })))
}

async fn cancel_build_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PlanetOnlyPayload>,
) -> ApiResult<serde_json::Value> {
    let refund = state
        .engine
        .cancel_build(&payload.agent_id, payload.planet_id)
        .await?;
    Ok(Json(json!({ "refund": refund })))
}

async fn research_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResearchPayload>,
) -> ApiResult<serde_json::Value> {
    let job = state
        .engine
        .research(&payload.agent_id, payload.planet_id, payload.tech)
        .await?;
    Ok(Json(json!({ "job": job })))
}

async fn cancel_research_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AgentOnlyPayload>,
) -> ApiResult<serde_json::Value> {
    let refund = state.engine.cancel_research(&payload.agent_id).await?;
    Ok(Json(json!({ "refund": refund })))
}

async fn build_ship_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BuildShipPayload>,
) -> ApiResult<serde_json::Value> {
    let job = state
        .engine
        .build_ship(&payload.agent_id, payload.planet_id, payload.ship, payload.count)
        .await?;
    Ok(Json(json!({ "job": job })))
}

async fn build_defense_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BuildDefensePayload>,
) -> ApiResult<serde_json::Value> {
    let job = state
        .engine
        .build_defense(
            &payload.agent_id,
            payload.planet_id,
            payload.defense,
            payload.count,
        )
        .await?;
    Ok(Json(json!({ "job": job })))
}

async fn send_fleet_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SendFleetPayload>,
) -> ApiResult<serde_json::Value> {
    let fleet = state
        .engine
        .send_fleet(
            &payload.agent_id,
            payload.from,
            payload.to,
            payload.ships,
            payload.mission,
            payload.cargo.unwrap_or_default(),
        )
        .await?;
    Ok(Json(json!({ "fleet": FleetView::from(&fleet) })))
}

async fn recall_fleet_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RecallPayload>,
) -> ApiResult<serde_json::Value> {
    let fleet = state
        .engine
        .recall_fleet(&payload.agent_id, payload.fleet_id)
        .await?;
    Ok(Json(json!({ "fleet": FleetView::from(&fleet) })))
}

async fn queue_actions_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueueActionsPayload>,
) -> ApiResult<serde_json::Value> {
    let outcomes = state
        .engine
        .queue_actions(&payload.agent_id, payload.planet_id, payload.actions)
        .await?;
    Ok(Json(json!({ "results": outcomes })))
}

async fn name_system_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NameSystemPayload>,
) -> ApiResult<serde_json::Value> {
    let name = state
        .engine
        .name_system(
            &payload.agent_id,
            SystemId::new(payload.galaxy, payload.system),
            &payload.name,
        )
        .await?;
    Ok(Json(json!({ "name": name })))
}

async fn simulate_combat_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SimulateCombatPayload>,
) -> ApiResult<serde_json::Value> {
    let summary = state.engine.simulate_combat(
        &payload.agent_id,
        payload.defender_planet,
        payload.ships,
        payload.trials.unwrap_or(25),
        payload.seed,
    )?;
    Ok(Json(json!({ "summary": summary })))
}

async fn hire_officer_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OfficerPayload>,
) -> ApiResult<serde_json::Value> {
    let status = state.engine.hire_officer(&payload.agent_id, payload.officer)?;
    Ok(Json(json!({ "officer": payload.officer, "status": status })))
}

async fn activate_booster_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BoosterPayload>,
) -> ApiResult<serde_json::Value> {
    let status = state
        .engine
        .activate_booster(&payload.agent_id, payload.booster)?;
    Ok(Json(json!({ "booster": payload.booster, "status": status })))
}

async fn speedup_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SpeedupPayload>,
) -> ApiResult<serde_json::Value> {
    let cost = state.engine.speedup(&payload.agent_id, payload.target).await?;
    Ok(Json(json!({ "cost": cost })))
}

async fn buy_resources_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BuyResourcesPayload>,
) -> ApiResult<serde_json::Value> {
    let cost = state
        .engine
        .buy_resources(
            &payload.agent_id,
            payload.planet_id,
            payload.resource,
            payload.amount,
        )
        .await?;
    Ok(Json(json!({ "cost": cost })))
}

async fn grant_currency_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GrantPayload>,
) -> ApiResult<serde_json::Value> {
    let balance = state.engine.grant_currency(&payload.agent_id, payload.amount)?;
    Ok(Json(json!({ "balance": balance })))
}

async fn stake_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StakePayload>,
) -> ApiResult<serde_json::Value> {
    let stake = state
        .engine
        .stake(&payload.agent_id, payload.pool_id, payload.amount)?;
    Ok(Json(json!({ "stake": stake })))
}

async fn claim_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StakeRefPayload>,
) -> ApiResult<serde_json::Value> {
    let reward = state
        .engine
        .claim_stake(&payload.agent_id, payload.stake_id)?;
    Ok(Json(json!({ "reward": reward })))
}

async fn unstake_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StakeRefPayload>,
) -> ApiResult<serde_json::Value> {
    let payout = state.engine.unstake(&payload.agent_id, payload.stake_id)?;
    Ok(Json(json!({ "payout": payout })))
}

async fn compound_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StakeRefPayload>,
) -> ApiResult<serde_json::Value> {
    let stake = state
        .engine
        .compound_stake(&payload.agent_id, payload.stake_id)?;
    Ok(Json(json!({ "stake": stake })))
}

/// Private messages persist straight through the store (append-only table)
/// and surface to the recipient as a `newMessage` event.
async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SendMessagePayload>,
) -> ApiResult<serde_json::Value> {
    let body = validate_message_body(&payload.body)?;
    state.engine.universe.get_agent(&payload.sender_id)?;
    state.engine.universe.get_agent(&payload.recipient_id)?;
    let id = state
        .db_client
        .append_message(&payload.sender_id, &payload.recipient_id, body)
        .await
        .map_err(internal)?;
    state.engine.publish_new_message(&payload.recipient_id);
    Ok(Json(json!({ "id": id })))
}

async fn messages_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<serde_json::Value> {
    state.engine.universe.get_agent(&agent_id)?;
    let messages: Vec<serde_json::Value> = state
        .db_client
        .list_messages(&agent_id, query.limit.clamp(1, 200))
        .await
        .into_iter()
        .map(|row| {
            json!({
                "id": row.id,
                "senderId": row.sender_id,
                "body": row.body,
                "at": row.created_at,
            })
        })
        .collect();
    Ok(Json(json!({ "messages": messages })))
}

async fn post_chat_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatMessagePayload>,
) -> ApiResult<serde_json::Value> {
    let body = validate_message_body(&payload.body)?;
    let channel = payload.channel.trim();
    if channel.is_empty() || channel.len() > 32 {
        return Err(ApiError(GameError::InvalidArgument {
            detail: "channel must be 1-32 characters".to_string(),
        }));
    }
    state.engine.universe.get_agent(&payload.sender_id)?;
    state
        .db_client
        .append_chat_message(&payload.sender_id, channel, body)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "ok": true })))
}

async fn chat_history_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<serde_json::Value> {
    let messages: Vec<serde_json::Value> = state
        .db_client
        .list_chat_messages(&channel, query.limit.clamp(1, 200))
        .await
        .into_iter()
        .map(|row| {
            json!({
                "id": row.id,
                "senderId": row.sender_id,
                "body": row.body,
                "at": row.created_at,
            })
        })
        .collect();
    Ok(Json(json!({ "channel": channel, "messages": messages })))
}

// ---- queries ----

async fn agent_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let agent = state.engine.universe.get_agent(&agent_id)?;
    let fleets: Vec<FleetView> = state
        .engine
        .universe
        .fleets_by_owner(&agent_id)
        .iter()
        .map(FleetView::from)
        .collect();
    Ok(Json(json!({ "agent": agent, "fleets": fleets })))
}

async fn planet_handler(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> ApiResult<serde_json::Value> {
    let planet_id = parse_planet_id(&raw)?;
    let planet = state.engine.universe.get_planet(planet_id)?;
    let owner = planet
        .owner
        .as_deref()
        .and_then(|id| state.engine.universe.get_agent(id).ok());
    let rates = catalog::production(&planet, owner.as_ref(), chrono::Utc::now(), CONFIG.game_speed);
    let caps = catalog::storage_caps(&planet);
    Ok(Json(json!({
        "planet": planet,
        "production": {
            "metalPerHour": rates.metal_per_sec * 3600.0,
            "crystalPerHour": rates.crystal_per_sec * 3600.0,
            "deuteriumPerHour": (rates.deuterium_per_sec - rates.fusion_burn_per_sec) * 3600.0,
            "energyProduced": rates.energy_produced,
            "energyConsumed": rates.energy_consumed,
            "efficiency": rates.efficiency,
        },
        "storage": caps,
    })))
}

/// Per-building next level, cost, time, and whether prerequisites are met.
async fn planet_actions_handler(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> ApiResult<serde_json::Value> {
    let planet_id = parse_planet_id(&raw)?;
    let planet = state.engine.universe.get_planet(planet_id)?;
    let owner_id = planet.owner.clone().ok_or(GameError::PlanetNotFound {
        id: raw.clone(),
    })?;
    let agent = state.engine.universe.get_agent(&owner_id)?;

    let buildings: Vec<serde_json::Value> = BuildingId::iter()
        .map(|building| {
            let level = planet.building_level(building);
            let cost = catalog::building_cost(building, planet.pending_level(building));
            let stats = &catalog::BUILDINGS[&building];
            let unmet = catalog::unmet_requirements(&stats.requirements, &planet, &agent);
            json!({
                "building": building,
                "level": level,
                "nextCost": cost,
                "buildSecs": catalog::build_time(
                    &cost,
                    planet.building_level(BuildingId::RoboticsFactory),
                    planet.building_level(BuildingId::NaniteFactory),
                    CONFIG.game_speed,
                ),
                "affordable": planet.resources.covers(&cost),
                "requirementsMet": unmet.is_empty(),
            })
        })
        .collect();
    let techs: Vec<serde_json::Value> = TechId::iter()
        .map(|tech| {
            let level = agent.tech_level(tech);
            let cost = catalog::research_cost(tech, level);
            json!({ "tech": tech, "level": level, "nextCost": cost })
        })
        .collect();
    Ok(Json(json!({ "buildings": buildings, "technologies": techs })))
}

#[derive(Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

async fn battle_reports_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<serde_json::Value> {
    let reports: Vec<serde_json::Value> = state
        .db_client
        .list_battle_reports(&agent_id, query.limit.clamp(1, 200))
        .await
        .into_iter()
        .map(|row| row.report)
        .collect();
    Ok(Json(json!({ "reports": reports })))
}

async fn fleet_reports_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<serde_json::Value> {
    let reports: Vec<serde_json::Value> = state
        .db_client
        .list_fleet_reports(&agent_id, query.limit.clamp(1, 200))
        .await
        .into_iter()
        .map(|row| row.report)
        .collect();
    Ok(Json(json!({ "reports": reports })))
}

async fn spy_reports_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let agent = state.engine.universe.get_agent(&agent_id)?;
    Ok(Json(json!({ "reports": agent.spy_reports })))
}

async fn score_history_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<serde_json::Value> {
    let rows = state
        .db_client
        .list_score_history(&agent_id, query.limit.clamp(1, 500))
        .await;
    let history: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|row| {
            json!({
                "tick": row.tick,
                "score": row.score,
                "planetCount": row.planet_count,
                "at": row.created_at,
            })
        })
        .collect();
    Ok(Json(json!({ "history": history })))
}

async fn leaderboard_handler(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let mut entries: Vec<(String, String, f64, usize)> = state
        .engine
        .universe
        .agents
        .iter()
        .map(|entry| {
            let agent = entry.value();
            (agent.id.clone(), agent.name.clone(), agent.score, agent.planets.len())
        })
        .collect();
    entries.sort_by(|a, b| b.2.total_cmp(&a.2));
    entries.truncate(100);
    let rows: Vec<serde_json::Value> = entries
        .into_iter()
        .enumerate()
        .map(|(rank, (id, name, score, planets))| {
            json!({
                "rank": rank + 1,
                "id": id,
                "name": name,
                "score": score,
                "planets": planets,
            })
        })
        .collect();
    Ok(Json(json!({ "leaderboard": rows })))
}

async fn system_view_handler(
    State(state): State<Arc<AppState>>,
    Path((galaxy, system)): Path<(i32, i32)>,
) -> ApiResult<serde_json::Value> {
    let system_id = SystemId::new(galaxy, system);
    let planets: Vec<serde_json::Value> = state
        .engine
        .universe
        .system_planets(system_id)
        .into_iter()
        .map(|planet| {
            let debris = state.engine.universe.get_debris(planet.id);
            json!({
                "id": planet.id,
                "position": planet.id.position,
                "owner": planet.owner,
                "name": planet.name,
                "debris": debris,
            })
        })
        .collect();
    Ok(Json(json!({
        "system": system_id,
        "name": state.engine.universe.system_name(system_id),
        "planets": planets,
    })))
}

async fn staking_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let agent = state.engine.universe.get_agent(&agent_id)?;
    let now = chrono::Utc::now();
    let stakes: Vec<serde_json::Value> = agent
        .stakes
        .iter()
        .map(|stake| {
            let pool = &catalog::POOLS[&stake.pool_id];
            let elapsed = (now - stake.last_claim_at).num_seconds().max(0) as f64;
            let pending = stake.amount * pool.apr * elapsed / (365.0 * 86400.0);
            json!({
                "stake": stake,
                "pendingReward": pending,
                "unlocksAt": stake.staked_at + chrono::Duration::seconds(pool.lock_secs),
            })
        })
        .collect();
    Ok(Json(json!({ "currency": agent.currency, "stakes": stakes })))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "tick": state.engine.universe.tick(),
        "agents": state.engine.universe.agents.len(),
        "planets": state.engine.universe.planets.len(),
        "fleets": state.engine.universe.fleets.len(),
    }))
}

async fn events_placeholder() {}

/// Forward engine events to connected sockets; slow consumers simply miss
/// batches (the broadcast channel drops for laggards).
async fn forward_events(io: SocketIo, engine: Arc<Engine>) {
    let mut rx = engine.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(ns) = io.of("/") {
                    let _ = ns.emit("event", &event);
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("event forwarder lagged, skipped {}", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

impl WebApiServer {
    pub fn new(engine: &Arc<Engine>, db_client: &DbClient) -> Self {
        Self {
            engine: engine.clone(),
            db_client: db_client.clone(),
        }
    }

    pub async fn run(&self) {
        info!("Starting server");

        let (socketio_layer, io) = SocketIo::builder()
            .req_path("/api/events")
            .transports([TransportType::Websocket])
            .ping_interval(Duration::from_secs(1))
            .ping_timeout(Duration::from_secs(5))
            .build_layer();

        let online = Arc::new(AtomicUsize::new(0));
        {
            let engine = self.engine.clone();
            let online = online.clone();
            io.ns("/", move |socket: socketioxide::extract::SocketRef| async move {
                let count = online.fetch_add(1, Ordering::SeqCst) + 1;
                engine.publish_online_count(count);
                let engine = engine.clone();
                let online = online.clone();
                socket.on_disconnect(move |_s: socketioxide::extract::SocketRef| async move {
                    let count = online.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
                    engine.publish_online_count(count);
                });
            });
        }

        let forwarder = tokio::spawn(forward_events(io.clone(), self.engine.clone()));

        let shared_state = Arc::new(AppState {
            engine: self.engine.clone(),
            db_client: self.db_client.clone(),
        });

        let app = axum::Router::new()
            .route("/api/status", get(status_handler))
            .route("/api/register", post(register_handler))
            .route("/api/build", post(build_handler))
            .route("/api/cancel-build", post(cancel_build_handler))
            .route("/api/research", post(research_handler))
            .route("/api/cancel-research", post(cancel_research_handler))
            .route("/api/build-ship", post(build_ship_handler))
            .route("/api/build-defense", post(build_defense_handler))
            .route("/api/send-fleet", post(send_fleet_handler))
            .route("/api/recall-fleet", post(recall_fleet_handler))
            .route("/api/queue-actions", post(queue_actions_handler))
            .route("/api/name-system", post(name_system_handler))
            .route("/api/simulate-combat", post(simulate_combat_handler))
            .route("/api/premium/hire-officer", post(hire_officer_handler))
            .route("/api/premium/activate-booster", post(activate_booster_handler))
            .route("/api/premium/speedup", post(speedup_handler))
            .route("/api/premium/buy-resources", post(buy_resources_handler))
            .route("/api/premium/grant", post(grant_currency_handler))
            .route("/api/premium/stake", post(stake_handler))
            .route("/api/premium/claim", post(claim_handler))
            .route("/api/premium/unstake", post(unstake_handler))
            .route("/api/premium/compound", post(compound_handler))
            .route("/api/messages", post(send_message_handler))
            .route("/api/chat", post(post_chat_handler))
            .route("/api/chat/{channel}", get(chat_history_handler))
            .route("/api/agents/{id}", get(agent_handler))
            .route("/api/agents/{id}/messages", get(messages_handler))
            .route("/api/agents/{id}/battle-reports", get(battle_reports_handler))
            .route("/api/agents/{id}/fleet-reports", get(fleet_reports_handler))
            .route("/api/agents/{id}/spy-reports", get(spy_reports_handler))
            .route("/api/agents/{id}/score-history", get(score_history_handler))
            .route("/api/agents/{id}/staking", get(staking_handler))
            .route("/api/planets/{id}", get(planet_handler))
            .route("/api/planets/{id}/actions", get(planet_actions_handler))
            .route("/api/leaderboard", get(leaderboard_handler))
            .route("/api/galaxy/{galaxy}/{system}", get(system_view_handler))
            .route("/api/events", get(events_placeholder).layer(socketio_layer))
            .with_state(shared_state)
            .layer(CorsLayer::permissive());

        let listener = tokio::net::TcpListener::bind(&CONFIG.http_addr).await.unwrap();
        info!("Listening on {}", listener.local_addr().unwrap());
        axum::serve(listener, app).await.unwrap();
        forwarder.abort();
    }
}
