// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

diesel::table! {
    wallpapers (id) {
        id -> Text,
        src -> Text,
        source -> Text,
        source_src -> Nullable<Text>,
        description -> Nullable<Text>,
        author -> Nullable<Text>,
        author_url -> Nullable<Text>,
        tags -> Array<Text>,
        colors -> Array<Text>,
        category -> Nullable<Text>,
        width -> Int4,
        height -> Int4,
        ratio -> Float8,
        size -> Int8,
        sfw -> Bool,
        #[sql_name = "type"]
        kind -> Nullable<Text>,
        extra_info -> Jsonb,
        file_id -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    subscriptions (chat_id) {
        chat_id -> Int8,
        chat_type -> Text,
        title -> Text,
        username -> Nullable<Text>,
        is_admin -> Bool,
        active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        extra_info -> Jsonb,
    }
}
