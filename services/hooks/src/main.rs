// The hooks service: HTTP API plus the Gmail and price monitors.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zapforge::actions::email::SENDGRID_URL;
use zapforge::actions::{
    ActionRegistry, CalendarAction, EmailAction, GmailMailer, Mailer, RetryConfig, SendGridMailer,
    SheetsAction, SlackAction, WebhookAction,
};
use zapforge::config::{MailProvider, Settings};
use zapforge::server::{self, AppState};
use zapforge::shutdown::{CancellationShutdown, Shutdown, TerminationShutdown};
use zapforge::triggers::{CoinGeckoFeed, GmailInboxProvider, GmailProbe, PollTriggerBuilder, PriceProbe};
use zapforge::utils::HttpClient;
use zapforge::utils::google_auth::GConf;
use zapforge::{ContextHub, Engine, JsonFileStore, ZapExecutor, ZapStore};

fn actions(settings: &Settings, hubs: &Arc<ContextHub>, http: &HttpClient) -> ActionRegistry {
    let mailer: Arc<dyn Mailer> = match settings.mail_provider {
        MailProvider::Gmail => Arc::new(GmailMailer::new(hubs.clone())),
        MailProvider::SendGrid => Arc::new(SendGridMailer::new(
            http.clone(),
            settings.sendgrid_api_key.clone().unwrap_or_default(),
            SENDGRID_URL,
        )),
    };
    let retry = RetryConfig {
        max_attempts: settings.action_retries,
        ..RetryConfig::default()
    };

    ActionRegistry::new()
        .register_with_retry(
            Arc::new(EmailAction::new(mailer, settings.from_email.clone())),
            &retry,
        )
        .register_with_retry(Arc::new(WebhookAction::new(http.clone())), &retry)
        .register_with_retry(Arc::new(SheetsAction::new(hubs.clone())), &retry)
        .register_with_retry(Arc::new(CalendarAction::new(hubs.clone())), &retry)
        .register(Arc::new(SlackAction))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = Settings::from_env()?;
    info!(data = %settings.data_path.display(), port = settings.port, "Starting hooks service");

    let store: Arc<dyn ZapStore> = Arc::new(JsonFileStore::open(&settings.data_path).await?);
    let hubs = Arc::new(ContextHub::new(GConf::new(
        settings.google_client_id.clone(),
        settings.google_client_secret.clone(),
    )));
    let http = HttpClient::new();
    let executor = Arc::new(ZapExecutor::new(
        store.clone(),
        actions(&settings, &hubs, &http),
    ));

    let stop = CancellationToken::new();
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        TerminationShutdown::new().wait_for_signal().await;
        signal_stop.cancel();
    });

    let app = server::router(AppState::new(store.clone(), executor.clone(), hubs.clone()))
        .layer(server::cors_layer(settings.frontend_url.as_deref()));
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let server_handle = tokio::spawn(server::serve(addr, app, stop.clone()));

    let gmail = PollTriggerBuilder::new(
        Arc::new(GmailProbe::new(
            store.clone(),
            Arc::new(GmailInboxProvider::new(hubs.clone())),
        )),
        settings.gmail_poll_interval,
    )
    .with_initial_delay(settings.trigger_start_delay)
    .build();
    let price = PollTriggerBuilder::new(
        Arc::new(PriceProbe::new(
            store.clone(),
            Arc::new(CoinGeckoFeed::new(http.clone(), settings.coingecko_url.clone())),
        )),
        settings.price_poll_interval,
    )
    .with_initial_delay(settings.trigger_start_delay)
    .build();

    let engine = Engine::new(executor, store)
        .add_trigger(Box::new(gmail))
        .add_trigger(Box::new(price))
        .with_shutdown_handler(CancellationShutdown::new(stop.clone()))
        .with_grace_period(settings.shutdown_grace);

    if let Err(e) = engine.run().await {
        error!(error = %e, "Engine stopped with an error");
        stop.cancel();
    }
    server_handle.await??;
    info!("Hooks service stopped");
    Ok(())
}
