// Diesel table definitions for the conversation store (C5) and the vector
// segment store backing the retrieval tool (C2). Column types mirror the
// migrations in `migrations/`.

diesel::table! {
    use diesel::sql_types::*;

    messages (id) {
        id -> Uuid,
        conversation_id -> Varchar,
        user_id -> Nullable<Varchar>,
        role -> Varchar,
        content -> Text,
        sources -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use pgvector::sql_types::Vector;

    vector_segments (id) {
        id -> Uuid,
        text -> Text,
        filename -> Nullable<Varchar>,
        document_id -> Nullable<Varchar>,
        chunk_index -> Nullable<Int4>,
        embedding -> Nullable<Vector>,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(messages, vector_segments,);
