use jobtalk::app::App;
use jobtalk::application_port::*;
use jobtalk::domain_model::*;
use jobtalk::logger::*;
use jobtalk::settings::*;
use reqwest::Method;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    logger.reload_from_config(&LogConfig::from(&project_settings.log))?;

    let app = App::try_new(&project_settings)?;
    if let Some(token) = cli.access_token {
        app.session.sign_in(AccessToken::new(token));
    }

    let method: Method = cli.method.to_uppercase().parse()?;
    let mut request = OutboundRequest::new(method, cli.path);
    if let Some(body) = cli.body.as_deref() {
        request = request.with_body(serde_json::from_str(body)?);
    }

    match app.session.send(request).await {
        Ok(response) => {
            match response.decode::<serde_json::Value>() {
                Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                Err(_) => println!("{}", response.text()),
            }
            Ok(())
        }
        Err(e) => {
            if e.requires_reauthentication() {
                app.session.sign_out();
            }
            error!(error = %e, "request failed");
            Err(anyhow::anyhow!(e.user_message()))
        }
    }
}
