//! Command-line watcher for starred campsites.
//! Starts a camping session for one user and alerts before their campsites open for booking.

use std::sync::Arc;

use anyhow::Context;
use booking_window::{AvailabilityState, SystemClock};
use camping_session::{CampingSession, SessionConfig, SessionDeps, SessionTicker};
use campsite_catalog::RemoteCatalog;
use notification_scheduler::LogNotifier;
use remote_api::{ApiClient, ApiConfig};
use wishlist::{RemoteWishlistGateway, UserId};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting campsite watcher...");

    let user_id = std::env::var("CAMP_USER_ID")
        .map(UserId::new)
        .context("CAMP_USER_ID must be set")?;
    let api_config = ApiConfig::from_env()?;
    let session_config = SessionConfig::from_env()?;

    log::info!("🌐 Park API: {}", api_config.base_url);
    if let Some(park_id) = &session_config.park_id {
        log::info!("🏞️ Watching park {}", park_id);
    }

    let api = ApiClient::new(&api_config)?;
    let deps = SessionDeps {
        catalog: Arc::new(RemoteCatalog::new(api.clone())),
        wishlist: Arc::new(RemoteWishlistGateway::new(api)),
        clock: Arc::new(SystemClock),
        notifier: Some(Arc::new(LogNotifier)),
    };

    let session = match CampingSession::start(user_id, deps, session_config).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            log::error!("❌ Failed to start session: {}", e);
            log::error!("💡 Make sure the park API is reachable at PARK_API_URL");
            return Err(e.into());
        }
    };

    let now = session.now();
    for view in session.campsites_with_availability(now).await {
        if !view.is_wishlisted {
            continue;
        }
        match view.availability.state {
            AvailabilityState::Available => {
                log::info!("✅ {} is open for booking", view.campsite.name)
            }
            state => log::info!(
                "⏳ {} is {} ({}d / {}h)",
                view.campsite.name,
                state,
                view.availability.days_until,
                view.availability.hours_until
            ),
        }
    }

    let mut ticker = SessionTicker::start(session.clone());
    log::info!("👀 Watching wishlist, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    log::info!("🛑 Shutting down...");
    ticker.stop().await;
    drop(ticker);

    match Arc::try_unwrap(session) {
        Ok(session) => session.logout().await,
        Err(_) => log::warn!("⚠️ Session still in use, skipping logout"),
    }

    Ok(())
}
