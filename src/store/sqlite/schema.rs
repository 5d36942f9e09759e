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
        tags -> Text,
        colors -> Text,
        category -> Nullable<Text>,
        width -> Integer,
        height -> Integer,
        ratio -> Double,
        size -> BigInt,
        sfw -> Bool,
        #[sql_name = "type"]
        kind -> Nullable<Text>,
        extra_info -> Text,
        file_id -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    subscriptions (chat_id) {
        chat_id -> BigInt,
        chat_type -> Text,
        title -> Text,
        username -> Nullable<Text>,
        is_admin -> Bool,
        active -> Bool,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        extra_info -> Text,
    }
}
