diesel::table! {
    agents (id) {
        id -> Text,
        data -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    planets (id) {
        id -> Text,
        data -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    fleets (id) {
        id -> Uuid,
        data -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    debris_fields (id) {
        id -> Text,
        data -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    star_systems (id) {
        id -> Text,
        data -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    globals (key) {
        key -> Text,
        value -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    battle_reports (id) {
        id -> Uuid,
        attacker_id -> Text,
        defender_id -> Text,
        location -> Text,
        report -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    fleet_reports (id) {
        id -> Uuid,
        agent_id -> Text,
        kind -> Text,
        report -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    messages (id) {
        id -> Uuid,
        sender_id -> Text,
        recipient_id -> Text,
        body -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    chat_messages (id) {
        id -> Int8,
        sender_id -> Text,
        channel -> Text,
        body -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    score_history (id) {
        id -> Int8,
        agent_id -> Text,
        tick -> Int8,
        score -> Float8,
        planet_count -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    agents,
    planets,
    fleets,
    debris_fields,
    star_systems,
    globals,
    battle_reports,
    fleet_reports,
    messages,
    chat_messages,
    score_history,
);
