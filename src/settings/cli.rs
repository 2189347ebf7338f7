use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "jobtalk", about = "Send an authenticated request to the JobTalk server")]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,
    /// Access token to start the session with.
    #[arg(long, env = "JOBTALK_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
    #[arg(long, default_value = "GET")]
    pub method: String,
    /// JSON request body.
    #[arg(long)]
    pub body: Option<String>,
    /// Request path relative to the server host, e.g. `/jobs`.
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_arguments() {
        let cli = Cli::try_parse_from([
            "jobtalk",
            "--settings",
            "settings/dev.toml",
            "--method",
            "POST",
            "--body",
            r#"{"title":"rust"}"#,
            "/jobs",
        ])
        .unwrap();

        assert_eq!(cli.settings.as_deref(), Some("settings/dev.toml"));
        assert_eq!(cli.method, "POST");
        assert_eq!(cli.body.as_deref(), Some(r#"{"title":"rust"}"#));
        assert_eq!(cli.path, "/jobs");
    }

    #[test]
    fn path_is_required() {
        assert!(Cli::try_parse_from(["jobtalk"]).is_err());
    }
}
