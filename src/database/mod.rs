pub mod db_models;

use crate::models::{
    Agent, BattleReport, DebrisField, Fleet, FleetReport, Planet, StarSystem,
};
use crate::schema::*;
use crate::universe::UniverseSnapshot;
use chrono::Utc;
use diesel::upsert::excluded;
use diesel::BoolExpressionMethods as _;
use diesel::ExpressionMethods as _;
use diesel::OptionalExtension as _;
use diesel::QueryDsl as _;
use diesel::QueryableByName;
use diesel::SelectableHelper as _;
use diesel_async::pooled_connection::deadpool::Object;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::AsyncConnection as _;
use diesel_async::AsyncPgConnection;
use diesel_async::RunQueryDsl as _;
use diesel_async::SimpleAsyncConnection as _;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

type DbResult<T> = Result<T, diesel::result::Error>;

#[derive(Clone)]
pub struct DbClient {
    db: Pool<AsyncPgConnection>,
}

impl DbClient {
    pub async fn new() -> DbClient {
        let database_url = std::env::var("POSTGRES_URI").expect("POSTGRES_URI must be set");
        let schema_name = std::env::var("POSTGRES_SCHEMA").unwrap_or_else(|_| "voidwar".to_string());
        info!("Using schema: {}", schema_name);
        let db = {
            let database_url = format!(
                "{}?options=-c%20search_path%3D{}",
                database_url, schema_name
            );
            let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
            Pool::builder(manager).max_size(5).build().unwrap()
        };
        // Check the connection
        {
            let mut conn = db.get().await.unwrap();
            #[derive(QueryableByName)]
            struct Ret {
                #[diesel(sql_type = diesel::sql_types::Integer)]
                value: i32,
            }
            let result: Vec<Ret> = diesel::sql_query("SELECT 1 as value")
                .load(&mut conn)
                .await
                .unwrap();
            assert_eq!(result.len(), 1);
            assert_eq!(result[0].value, 1);
            info!("Successfully connected to database");
        }
        let db = DbClient { db };
        db.create_schema(&schema_name).await;
        db
    }

    async fn create_schema(&self, schema_name: &str) {
        let sql = include_str!("../../schema.sql.template").replace("___SCHEMA___", schema_name);
        let mut conn = self.conn().await;
        conn.batch_execute(&sql).await.unwrap();
    }

    pub async fn conn(&self) -> Object<AsyncPgConnection> {
        self.db
            .get()
            .await
            .expect("Timed out waiting for a database connection")
    }

    pub async fn get_value<T>(&self, key: &str) -> Option<T>
    where
        T: Sized + serde::de::DeserializeOwned,
    {
        debug!("db get: {}", key);
        let value_opt: Option<Value> = globals::table
            .select(globals::value)
            .filter(globals::key.eq(key))
            .first(&mut self.conn().await)
            .await
            .optional()
            .expect("DB Query error");
        value_opt.map(|data| serde_json::from_value(data).unwrap())
    }

    /// Read the whole world at boot. Any failure here is fatal; the process
    /// must not start against a store it cannot read.
    pub async fn load_universe(&self) -> UniverseSnapshot {
        let query_start = std::time::Instant::now();
        let mut conn = self.conn().await;

        let agent_rows: Vec<Value> = agents::table
            .select(agents::data)
            .load(&mut conn)
            .await
            .expect("DB Query error");
        let agents_list: Vec<Agent> = agent_rows
            .into_iter()
            .map(|value| {
                let value = migrate_agent_value(value);
                serde_json::from_value(value).expect("Invalid agent data")
            })
            .collect();

        let planet_rows: Vec<Value> = planets::table
            .select(planets::data)
            .load(&mut conn)
            .await
            .expect("DB Query error");
        let planets_list: Vec<Planet> = planet_rows
            .into_iter()
            .map(|value| serde_json::from_value(value).expect("Invalid planet data"))
            .collect();

        let fleet_rows: Vec<Value> = fleets::table
            .select(fleets::data)
            .load(&mut conn)
            .await
            .expect("DB Query error");
        let fleets_list: Vec<Fleet> = fleet_rows
            .into_iter()
            .map(|value| serde_json::from_value(value).expect("Invalid fleet data"))
            .collect();

        let debris_rows: Vec<Value> = debris_fields::table
            .select(debris_fields::data)
            .load(&mut conn)
            .await
            .expect("DB Query error");
        let debris_list: Vec<DebrisField> = debris_rows
            .into_iter()
            .map(|value| serde_json::from_value(value).expect("Invalid debris data"))
            .collect();

        let system_rows: Vec<Value> = star_systems::table
            .select(star_systems::data)
            .load(&mut conn)
            .await
            .expect("DB Query error");
        let systems_list: Vec<StarSystem> = system_rows
            .into_iter()
            .map(|value| serde_json::from_value(value).expect("Invalid system data"))
            .collect();
        drop(conn);

        let tick: u64 = self.get_value("tick").await.unwrap_or(0);
        let wallets_by_ip = self.get_value("walletsByIp").await.unwrap_or_default();

        let duration = query_start.elapsed().as_millis() as f64 / 1000.0;
        info!(
            "Loaded {} agents, {} planets, {} fleets, {} systems in {:.3}s",
            agents_list.len(),
            planets_list.len(),
            fleets_list.len(),
            systems_list.len(),
            duration
        );
        UniverseSnapshot {
            agents: agents_list,
            planets: planets_list,
            fleets: fleets_list,
            debris: debris_list,
            systems: systems_list,
            tick,
            wallets_by_ip,
        }
    }

    /// Persist the whole mutable world in one transaction. Agents, planets,
    /// and systems upsert; fleets and debris fully reconcile (rows absent
    /// from the live set are deleted).
    pub async fn save_universe(&self, snapshot: &UniverseSnapshot) -> DbResult<()> {
        let now = Utc::now();
        let mut conn = self.conn().await;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                for agent in &snapshot.agents {
                    let data = serde_json::to_value(agent).expect("Failed to serialize agent");
                    diesel::insert_into(agents::table)
                        .values((
                            agents::id.eq(&agent.id),
                            agents::data.eq(&data),
                            agents::updated_at.eq(now),
                        ))
                        .on_conflict(agents::id)
                        .do_update()
                        .set((
                            agents::data.eq(excluded(agents::data)),
                            agents::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;
                }
                for planet in &snapshot.planets {
                    let data = serde_json::to_value(planet).expect("Failed to serialize planet");
                    diesel::insert_into(planets::table)
                        .values((
                            planets::id.eq(planet.id.to_string()),
                            planets::data.eq(&data),
                            planets::updated_at.eq(now),
                        ))
                        .on_conflict(planets::id)
                        .do_update()
                        .set((
                            planets::data.eq(excluded(planets::data)),
                            planets::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;
                }
                for system in &snapshot.systems {
                    let data = serde_json::to_value(system).expect("Failed to serialize system");
                    diesel::insert_into(star_systems::table)
                        .values((
                            star_systems::id.eq(system.id.to_string()),
                            star_systems::data.eq(&data),
                            star_systems::updated_at.eq(now),
                        ))
                        .on_conflict(star_systems::id)
                        .do_update()
                        .set((
                            star_systems::data.eq(excluded(star_systems::data)),
                            star_systems::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;
                }

                let live_fleet_ids: Vec<Uuid> =
                    snapshot.fleets.iter().map(|fleet| fleet.id).collect();
                diesel::delete(fleets::table.filter(fleets::id.ne_all(&live_fleet_ids)))
                    .execute(conn)
                    .await?;
                for fleet in &snapshot.fleets {
                    let data = serde_json::to_value(fleet).expect("Failed to serialize fleet");
                    diesel::insert_into(fleets::table)
                        .values((
                            fleets::id.eq(fleet.id),
                            fleets::data.eq(&data),
                            fleets::updated_at.eq(now),
                        ))
                        .on_conflict(fleets::id)
                        .do_update()
                        .set((
                            fleets::data.eq(excluded(fleets::data)),
                            fleets::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;
                }

                let live_debris_ids: Vec<String> = snapshot
                    .debris
                    .iter()
                    .map(|field| field.coords.to_string())
                    .collect();
                diesel::delete(
                    debris_fields::table.filter(debris_fields::id.ne_all(&live_debris_ids)),
                )
                .execute(conn)
                .await?;
                for field in &snapshot.debris {
                    let data = serde_json::to_value(field).expect("Failed to serialize debris");
                    diesel::insert_into(debris_fields::table)
                        .values((
                            debris_fields::id.eq(field.coords.to_string()),
                            debris_fields::data.eq(&data),
                            debris_fields::updated_at.eq(now),
                        ))
                        .on_conflict(debris_fields::id)
                        .do_update()
                        .set((
                            debris_fields::data.eq(excluded(debris_fields::data)),
                            debris_fields::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;
                }

                for (key, value) in [
                    ("tick", serde_json::json!(snapshot.tick)),
                    (
                        "walletsByIp",
                        serde_json::to_value(&snapshot.wallets_by_ip).unwrap(),
                    ),
                ] {
                    diesel::insert_into(globals::table)
                        .values((
                            globals::key.eq(key),
                            globals::value.eq(&value),
                            globals::updated_at.eq(now),
                        ))
                        .on_conflict(globals::key)
                        .do_update()
                        .set((globals::value.eq(&value), globals::updated_at.eq(now)))
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    pub async fn append_battle_report(&self, report: &BattleReport) -> DbResult<()> {
        let insert = db_models::NewBattleReport {
            id: report.id,
            attacker_id: &report.attacker_id,
            defender_id: &report.defender_id,
            location: report.location.to_string(),
            report: serde_json::to_value(report).expect("Failed to serialize report"),
            created_at: report.at,
        };
        diesel::insert_into(battle_reports::table)
            .values(&insert)
            .on_conflict(battle_reports::id)
            .do_nothing()
            .execute(&mut self.conn().await)
            .await?;
        Ok(())
    }

    pub async fn list_battle_reports(
        &self,
        agent_id: &str,
        limit: i64,
    ) -> Vec<db_models::BattleReportRow> {
        battle_reports::table
            .filter(
                battle_reports::attacker_id
                    .eq(agent_id)
                    .or(battle_reports::defender_id.eq(agent_id)),
            )
            .order(battle_reports::created_at.desc())
            .limit(limit)
            .select(db_models::BattleReportRow::as_select())
            .load(&mut self.conn().await)
            .await
            .expect("DB Query error")
    }

    pub async fn append_fleet_report(&self, report: &FleetReport) -> DbResult<()> {
        let insert = db_models::NewFleetReport {
            id: report.id,
            agent_id: &report.agent_id,
            kind: report.kind.to_string(),
            report: serde_json::to_value(report).expect("Failed to serialize report"),
            created_at: report.at,
        };
        diesel::insert_into(fleet_reports::table)
            .values(&insert)
            .on_conflict(fleet_reports::id)
            .do_nothing()
            .execute(&mut self.conn().await)
            .await?;
        Ok(())
    }

    pub async fn list_fleet_reports(
        &self,
        agent_id: &str,
        limit: i64,
    ) -> Vec<db_models::FleetReportRow> {
        fleet_reports::table
            .filter(fleet_reports::agent_id.eq(agent_id))
            .order(fleet_reports::created_at.desc())
            .limit(limit)
            .select(db_models::FleetReportRow::as_select())
            .load(&mut self.conn().await)
            .await
            .expect("DB Query error")
    }

    pub async fn append_score_snapshot(
        &self,
        agent_id: &str,
        tick: u64,
        score: f64,
        planet_count: usize,
    ) -> DbResult<()> {
        let insert = db_models::NewScoreSnapshot {
            agent_id,
            tick: tick as i64,
            score,
            planet_count: planet_count as i32,
            created_at: Utc::now(),
        };
        diesel::insert_into(score_history::table)
            .values(&insert)
            .execute(&mut self.conn().await)
            .await?;
        Ok(())
    }

    pub async fn list_score_history(
        &self,
        agent_id: &str,
        limit: i64,
    ) -> Vec<db_models::ScoreSnapshotRow> {
        score_history::table
            .filter(score_history::agent_id.eq(agent_id))
            .order(score_history::tick.desc())
            .limit(limit)
            .select(db_models::ScoreSnapshotRow::as_select())
            .load(&mut self.conn().await)
            .await
            .expect("DB Query error")
    }

    pub async fn append_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
    ) -> DbResult<Uuid> {
        let id = Uuid::new_v4();
        let insert = db_models::NewMessage {
            id,
            sender_id,
            recipient_id,
            body,
            created_at: Utc::now(),
        };
        diesel::insert_into(messages::table)
            .values(&insert)
            .execute(&mut self.conn().await)
            .await?;
        Ok(id)
    }

    pub async fn list_messages(
        &self,
        recipient_id: &str,
        limit: i64,
    ) -> Vec<db_models::MessageRow> {
        messages::table
            .filter(messages::recipient_id.eq(recipient_id))
            .order(messages::created_at.desc())
            .limit(limit)
            .select(db_models::MessageRow::as_select())
            .load(&mut self.conn().await)
            .await
            .expect("DB Query error")
    }

    pub async fn append_chat_message(
        &self,
        sender_id: &str,
        channel: &str,
        body: &str,
    ) -> DbResult<()> {
        let insert = db_models::NewChatMessage {
            sender_id,
            channel,
            body,
            created_at: Utc::now(),
        };
        diesel::insert_into(chat_messages::table)
            .values(&insert)
            .execute(&mut self.conn().await)
            .await?;
        Ok(())
    }

    pub async fn list_chat_messages(
        &self,
        channel: &str,
        limit: i64,
    ) -> Vec<db_models::ChatMessageRow> {
        chat_messages::table
            .filter(chat_messages::channel.eq(channel))
            .order(chat_messages::created_at.desc())
            .limit(limit)
            .select(db_models::ChatMessageRow::as_select())
            .load(&mut self.conn().await)
            .await
            .expect("DB Query error")
    }
}

/// Coerce legacy agent blobs: booster/officer lists become maps keyed by id,
/// and premium fields absent from old rows get their defaults.
fn migrate_agent_value(mut value: Value) -> Value {
    if let Some(obj) = value.as_object_mut() {
        for field in ["boosters", "officers"] {
            let legacy = match obj.get(field) {
                Some(Value::Array(items)) => Some(items.clone()),
                _ => None,
            };
            if let Some(items) = legacy {
                let mut map = serde_json::Map::new();
                for mut item in items {
                    let id = item
                        .get("id")
                        .and_then(|id| id.as_str())
                        .map(str::to_string);
                    if let (Some(id), Some(entry)) = (id, item.as_object_mut()) {
                        entry.remove("id");
                        map.insert(id, Value::Object(entry.clone()));
                    }
                }
                obj.insert(field.to_string(), Value::Object(map));
            }
        }
        if !obj.contains_key("currency") {
            obj.insert("currency".to_string(), serde_json::json!(0.0));
        }
        if !obj.contains_key("stakes") {
            obj.insert("stakes".to_string(), serde_json::json!([]));
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_legacy_booster_list() {
        let legacy = serde_json::json!({
            "id": "0xold",
            "name": "Old Timer",
            "createdAt": "2024-01-01T00:00:00Z",
            "planets": ["1:1:4"],
            "score": 100.0,
            "technologies": {},
            "researchQueue": [],
            "boosters": [
                {"id": "metalBooster", "activatedAt": "2024-01-02T00:00:00Z", "expiresAt": "2024-01-03T00:00:00Z"}
            ]
        });
        let migrated = migrate_agent_value(legacy);
        assert!(migrated["boosters"].is_object());
        assert!(migrated["boosters"]["metalBooster"]["expiresAt"].is_string());
        assert_eq!(migrated["currency"], serde_json::json!(0.0));

        let agent: Agent = serde_json::from_value(migrated).unwrap();
        assert_eq!(agent.currency, 0.0);
        assert_eq!(agent.boosters.len(), 1);
    }

    #[test]
    fn test_migrate_is_noop_for_current_shape() {
        let current = serde_json::json!({
            "id": "0xnew",
            "name": "Fresh",
            "createdAt": "2025-06-01T00:00:00Z",
            "planets": [],
            "score": 0.0,
            "currency": 250.0,
            "officers": {},
            "boosters": {},
            "stakes": [],
            "technologies": {},
            "researchQueue": []
        });
        let migrated = migrate_agent_value(current.clone());
        let agent: Agent = serde_json::from_value(migrated).unwrap();
        assert_eq!(agent.currency, 250.0);
    }
}
