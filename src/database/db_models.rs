use chrono::{DateTime, Utc};
use diesel::{Insertable, Queryable, QueryableByName, Selectable};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::battle_reports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewBattleReport<'a> {
    pub id: Uuid,
    pub attacker_id: &'a str,
    pub defender_id: &'a str,
    pub location: String,
    pub report: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = crate::schema::battle_reports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BattleReportRow {
    pub id: Uuid,
    pub attacker_id: String,
    pub defender_id: String,
    pub location: String,
    pub report: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::fleet_reports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewFleetReport<'a> {
    pub id: Uuid,
    pub agent_id: &'a str,
    pub kind: String,
    pub report: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = crate::schema::fleet_reports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FleetReportRow {
    pub id: Uuid,
    pub agent_id: String,
    pub kind: String,
    pub report: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewMessage<'a> {
    pub id: Uuid,
    pub sender_id: &'a str,
    pub recipient_id: &'a str,
    pub body: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = crate::schema::messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MessageRow {
    pub id: Uuid,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::chat_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewChatMessage<'a> {
    pub sender_id: &'a str,
    pub channel: &'a str,
    pub body: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = crate::schema::chat_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChatMessageRow {
    pub id: i64,
    pub sender_id: String,
    pub channel: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::score_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewScoreSnapshot<'a> {
    pub agent_id: &'a str,
    pub tick: i64,
    pub score: f64,
    pub planet_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = crate::schema::score_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ScoreSnapshotRow {
    pub id: i64,
    pub agent_id: String,
    pub tick: i64,
    pub score: f64,
    pub planet_count: i32,
    pub created_at: DateTime<Utc>,
}
