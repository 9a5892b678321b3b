use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use postwatch::apply::ApplyService;
use postwatch::config::AppConfig;
use postwatch::logging;
use postwatch::monitor::PostingMonitor;
use postwatch::notification::{
    DiscordChannel, InteractionSource, NotificationHub, Notifier, TelegramChannel,
};
use postwatch::portal::{JobSource, PortalClient};
use postwatch::reauth::{BrowserReauthenticator, YkmanOtp};
use postwatch::scoring::{OpenAiScorer, Scorer};
use postwatch::session::{EnvFileSink, SessionCoordinator};
use postwatch::store::FilePostingStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let logging = logging::init_logging(&config.log_dir, config.log_format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        portal = %config.portal.base_url,
        log_dir = %logging.log_dir().display(),
        "postwatch starting"
    );

    let cancel = CancellationToken::new();
    logging.start_retention_cleanup(cancel.child_token());

    let source: Arc<dyn JobSource> = Arc::new(PortalClient::new(config.portal.clone())?);

    let reauthenticator = Arc::new(BrowserReauthenticator::new(
        config.browser.clone(),
        YkmanOtp::new(&config.ykman_path, &config.otp_account),
    ));
    let mut coordinator = SessionCoordinator::new(
        config.seed_credential.clone(),
        reauthenticator,
        config.refresh.clone(),
    );
    if config.persist_cookie {
        info!(path = %config.env_file.display(), "Refreshed cookies will be persisted");
        coordinator = coordinator.with_sink(Arc::new(EnvFileSink::new(&config.env_file)));
    }
    let coordinator = Arc::new(coordinator);

    let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
    let mut interactions: Option<Arc<dyn InteractionSource>> = None;
    if let Some(telegram) = &config.telegram {
        let channel = Arc::new(TelegramChannel::new(telegram.clone())?);
        interactions = Some(channel.clone());
        channels.push(channel);
    }
    if let Some(discord) = &config.discord {
        channels.push(Arc::new(DiscordChannel::new(discord.clone())?));
    }
    let notifier: Arc<dyn Notifier> = Arc::new(NotificationHub::new(channels));

    let mut monitor = PostingMonitor::new(
        coordinator.clone(),
        source.clone(),
        Arc::new(FilePostingStore::new(&config.store_path)),
        notifier.clone(),
        config.monitor.clone(),
    );
    if let Some(openai) = &config.openai {
        let scorer: Arc<dyn Scorer> = Arc::new(OpenAiScorer::new(openai.clone())?);
        monitor = monitor.with_scorer(scorer);
    } else {
        info!("OPENAI_API_KEY not set, postings will not be summarized");
    }

    let listener = match interactions {
        Some(source_of_requests) => {
            let apply = Arc::new(ApplyService::new(coordinator.clone(), source.clone()));
            Some(tokio::spawn(apply.run_listener(
                source_of_requests,
                notifier.clone(),
                cancel.child_token(),
            )))
        }
        None => {
            warn!("No interactive channel configured, apply buttons are disabled");
            None
        }
    };

    let monitor_cancel = cancel.child_token();
    let monitor_task = tokio::spawn(async move { monitor.run(monitor_cancel).await });

    shutdown_signal().await;
    info!("Shutdown requested");
    cancel.cancel();

    if let Err(e) = monitor_task.await {
        error!(error = %e, "Monitor task panicked");
    }
    if let Some(listener) = listener
        && let Err(e) = listener.await
    {
        error!(error = %e, "Apply listener panicked");
    }

    info!("postwatch stopped");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
