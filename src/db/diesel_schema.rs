// Diesel table declarations, kept in sync with the DDL in `schema.rs`.

diesel::table! {
    accounts (id) {
        id -> Text,
        username -> Text,
        email -> Nullable<Text>,
        wallet_address -> Text,
        referral_code -> Text,
        balance -> BigInt,
        experience -> BigInt,
        level -> Integer,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    claim_records (id) {
        id -> BigInt,
        account_id -> Text,
        claim_kind -> Text,
        claim_key -> Text,
        currency_granted -> BigInt,
        experience_granted -> BigInt,
        streak_position -> Nullable<Integer>,
        claimed_at -> Text,
    }
}

diesel::table! {
    ledger_entries (id) {
        id -> BigInt,
        account_id -> Text,
        cause -> Text,
        amount -> BigInt,
        counterparty_id -> Nullable<Text>,
        description -> Text,
        reference -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    referral_links (referee_id) {
        referee_id -> Text,
        referrer_id -> Text,
        code_used -> Text,
        bonus_granted -> Bool,
        created_at -> Text,
    }
}

diesel::joinable!(claim_records -> accounts (account_id));
diesel::joinable!(ledger_entries -> accounts (account_id));

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    claim_records,
    ledger_entries,
    referral_links,
);
