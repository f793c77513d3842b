#[macro_export]
macro_rules! param_internal {
    ($vec:ident, required, $key:expr, $val:expr) => {
        $vec.push(($key.to_string(), $val.to_string()));
    };
    ($vec:ident, optional, $key:expr, $val:expr) => {
        if let Some(ref v) = $val {
            $vec.push(($key.to_string(), v.to_string()));
        }
    };
    ($vec:ident, joined, $key:expr, $val:expr) => {
        if !$val.is_empty() {
            $vec.push(($key.to_string(), $val.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")));
        }
    };
}

/// Build `(key, value)` query params for an X API v2 endpoint.
/// Keys are string literals since the API uses dotted names like `tweet.fields`.
/// ```ignore
/// let params = build_params! {
///     required "query" => query,
///     optional "pagination_token" => token,
///     joined "tweet.fields" => TWEET_FIELDS,
/// };
/// ```
#[macro_export]
macro_rules! build_params {
    (
        $(
            $kind:ident $key:literal => $val:expr
        ),+ $(,)?
    ) => {
        {
            let mut params: Vec<(String, String)> = Vec::new();
            $(
                $crate::param_internal!(params, $kind, $key, $val);
            )+
            params
        }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_build_params() {
        let token: Option<String> = None;
        let since = Some("2024-01-01T00:00:00Z");
        let fields = ["created_at", "public_metrics"];
        let params = build_params! {
            required "query" => "$BTC -is:retweet",
            required "max_results" => 100,
            optional "pagination_token" => token,
            optional "start_time" => since,
            joined "tweet.fields" => fields,
        };
        assert_eq!(
            params,
            vec![
                ("query".to_string(), "$BTC -is:retweet".to_string()),
                ("max_results".to_string(), "100".to_string()),
                ("start_time".to_string(), "2024-01-01T00:00:00Z".to_string()),
                ("tweet.fields".to_string(), "created_at,public_metrics".to_string()),
            ]
        );
    }
}
