use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::sync::Mutex;

use crate::auth::inbox_access::InboxAccessStore;
use crate::config::Config;
use crate::events::EventBus;
use crate::rate_limit::RateLimiter;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    pub inbox_access: Arc<Mutex<InboxAccessStore>>,
    pub events: EventBus,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let limits = &config.limits;
        let rate_limiter = RateLimiter::new(
            limits.rate_limit_requests,
            Duration::from_secs(limits.rate_limit_window_secs),
        );
        let inbox_access =
            InboxAccessStore::new(Duration::from_secs(limits.inbox_access_minutes * 60));

        Self {
            db,
            config,
            rate_limiter: Arc::new(Mutex::new(rate_limiter)),
            inbox_access: Arc::new(Mutex::new(inbox_access)),
            events: EventBus::new(),
        }
    }
}
