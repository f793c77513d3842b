diesel::table! {
    rate_limit_state (key) {
        key -> Text,
        until_ms -> BigInt,
        updated_date -> Timestamp,
    }
}
