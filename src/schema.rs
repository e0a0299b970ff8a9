diesel::table! {
    users (id) {
        id -> Varchar,
        display_name -> Nullable<Varchar>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    words (id) {
        id -> Uuid,
        word -> Varchar,
        pronunciation -> Varchar,
        definition -> Text,
        created_by -> Varchar,
        created_at -> Timestamp,
    }
}

diesel::table! {
    word_images (id) {
        id -> Uuid,
        word_id -> Uuid,
        url -> Text,
        created_by -> Varchar,
        created_at -> Timestamp,
    }
}

diesel::table! {
    videos (id) {
        id -> Uuid,
        url -> Text,
        created_by -> Varchar,
        created_at -> Timestamp,
    }
}

diesel::table! {
    signs (id) {
        id -> Uuid,
        word_id -> Uuid,
        video_id -> Uuid,
        sign_description -> Text,
        created_by -> Varchar,
        created_at -> Timestamp,
    }
}

diesel::table! {
    votes (id) {
        id -> Uuid,
        video_id -> Uuid,
        user_id -> Varchar,
        value -> Int4,
        created_at -> Timestamp,
    }
}

diesel::joinable!(word_images -> words (word_id));
diesel::joinable!(signs -> words (word_id));
diesel::joinable!(signs -> videos (video_id));
diesel::joinable!(votes -> videos (video_id));
diesel::joinable!(votes -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(users, words, word_images, videos, signs, votes,);
