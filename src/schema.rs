diesel::table! {
    events (id) {
        id -> Uuid,
        name -> Text,
        password -> Nullable<Text>,
        start_date -> Date,
        end_date -> Date,
        start_time -> Time,
        end_time -> Time,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    participants (id) {
        id -> Uuid,
        event_id -> Uuid,
        name -> Text,
        creator -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    availability (id) {
        id -> Uuid,
        event_id -> Uuid,
        participant_id -> Uuid,
        date -> Date,
        time -> Time,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(participants -> events (event_id));
diesel::joinable!(availability -> participants (participant_id));

diesel::allow_tables_to_appear_in_same_query!(events, participants, availability);
