#[cfg(test)]
mod tests {
    use odbridge_core::{BridgeError, Config, Context, ErrorKind, Result};
    use std::{collections::HashMap, time::Duration};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.login_timeout, None);
        assert_eq!(config.query_timeout, None);
        assert!(config.describe_parameters);
        assert!(!config.scrollable);
        assert_eq!(config.text_chunk, 4096);
    }

    #[test]
    fn read_variables() {
        let config = Config::from_lookup(lookup(&[
            (Config::LOGIN_TIMEOUT, "5"),
            (Config::QUERY_TIMEOUT, " 0.25 "),
            (Config::DESCRIBE_PARAMETERS, "off"),
            (Config::SCROLLABLE, "TRUE"),
            (Config::TEXT_CHUNK, "128"),
        ]));
        assert_eq!(config.login_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.query_timeout, Some(Duration::from_millis(250)));
        assert!(!config.describe_parameters);
        assert!(config.scrollable);
        assert_eq!(config.text_chunk, 128);
    }

    #[test]
    fn invalid_variables_are_ignored() {
        let config = Config::from_lookup(lookup(&[
            (Config::LOGIN_TIMEOUT, "-1"),
            (Config::QUERY_TIMEOUT, "soon"),
            (Config::DESCRIBE_PARAMETERS, "maybe"),
            (Config::TEXT_CHUNK, "0"),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn builders() {
        let config = Config::new()
            .with_login_timeout(Some(Duration::from_secs(1)))
            .with_query_timeout(Some(Duration::from_secs(2)))
            .with_describe_parameters(false)
            .with_scrollable(true)
            .with_text_chunk(0);
        assert_eq!(config.login_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.query_timeout, Some(Duration::from_secs(2)));
        assert!(!config.describe_parameters);
        assert!(config.scrollable);
        assert_eq!(config.text_chunk, 1);
    }

    #[test]
    fn error_context() {
        let failing: Result<()> = Err(ErrorKind::Bind.error("parameter 3 does not exist"));
        let error = failing
            .context("While binding")
            .with_context(|| format!("While running `{}`", "SELECT ?"))
            .unwrap_err();
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Bind));
        let bridge = error
            .downcast_ref::<BridgeError>()
            .expect("The bridge error is under the context");
        assert_eq!(bridge.status(), None);
        assert_eq!(bridge.message(), "parameter 3 does not exist");
        assert_eq!(
            error.chain().map(|v| v.to_string()).collect::<Vec<_>>(),
            [
                "While running `SELECT ?`",
                "While binding",
                "bind error: parameter 3 does not exist"
            ]
        );
        assert_eq!(
            format!("{:#}", error),
            "While running `SELECT ?`: While binding: bind error: parameter 3 does not exist"
        );
        assert_eq!(
            ErrorKind::of(&ErrorKind::State.error("closed")),
            Some(ErrorKind::State)
        );
        assert_eq!(ErrorKind::of(&odbridge_core::anyhow::anyhow!("unrelated")), None);
    }
}
