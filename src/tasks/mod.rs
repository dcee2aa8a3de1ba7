use crate::config::Config;
use crate::error::ApiError;
use crate::helper::rss_helpers::{self, RssContext};
use crate::helper::scheduler_helpers::{self, TickReport};
use crate::{AppState, DbPool};
use actix_web::{rt, web};
use chrono::Utc;
use redb::Database;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Lets at most one run of a named job proceed at a time.
#[derive(Debug)]
pub struct SingleFlight {
    name: &'static str,
    running: AtomicBool,
}

/// Held for the duration of a run; releases the flight on drop.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flight: &'a SingleFlight,
}

impl SingleFlight {
    pub const fn new(name: &'static str) -> Self {
        SingleFlight { name, running: AtomicBool::new(false) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `None` while another run holds the flight.
    pub fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { flight: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.running.store(false, Ordering::Release);
    }
}

/// One guarded scheduler pass. `None` when a pass is already in progress.
pub async fn scheduler_pass(
    db: &Database,
    pool: &DbPool,
    config: &Config,
    state: &AppState,
) -> Option<Result<TickReport, ApiError>> {
    let _guard = state.scheduler_guard.try_acquire()?;
    Some(scheduler_helpers::run_tick(db, pool, config, state.push_gateway.as_ref(), Utc::now()).await)
}

/// One guarded RSS heartbeat. `None` when a heartbeat is already in progress.
pub async fn rss_pass(db: &Database, pool: &DbPool, config: &Config, state: &AppState) -> Option<Result<usize, ApiError>> {
    let _guard = state.rss_guard.try_acquire()?;
    let ctx = RssContext {
        db,
        pool,
        config,
        client: &state.http_client,
        gateway: state.push_gateway.as_ref(),
    };
    Some(rss_helpers::run_due_feeds(&ctx).await)
}

pub fn spawn_scheduler(db: web::Data<Database>, pool: web::Data<DbPool>, config: web::Data<Config>, state: web::Data<AppState>) {
    let period = Duration::from_secs(config.scheduler.tick_seconds.max(1));
    log::info!("Scheduler polling every {:?}", period);
    rt::spawn(async move {
        let mut ticker = rt::time::interval(period);
        loop {
            ticker.tick().await;
            match scheduler_pass(&db, &pool, &config, &state).await {
                Some(Ok(_)) => {}
                Some(Err(e)) => log::error!("Scheduler tick failed: {}", e),
                None => log::warn!("Skipping scheduler tick: previous '{}' run still active", state.scheduler_guard.name()),
            }
        }
    });
}

pub fn spawn_rss_heartbeat(db: web::Data<Database>, pool: web::Data<DbPool>, config: web::Data<Config>, state: web::Data<AppState>) {
    let period = Duration::from_secs(config.rss.heartbeat_seconds.max(1));
    log::info!("RSS heartbeat every {:?}", period);
    rt::spawn(async move {
        let mut ticker = rt::time::interval(period);
        loop {
            ticker.tick().await;
            match rss_pass(&db, &pool, &config, &state).await {
                Some(Ok(_)) => {}
                Some(Err(e)) => log::error!("RSS heartbeat failed: {}", e),
                None => log::warn!("Skipping RSS heartbeat: previous '{}' run still active", state.rss_guard.name()),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_flight_admits_one_holder() {
        let flight = SingleFlight::new("test");
        let first = flight.try_acquire();
        assert!(first.is_some());
        assert!(flight.is_running());
        assert!(flight.try_acquire().is_none());

        drop(first);
        assert!(!flight.is_running());
        assert!(flight.try_acquire().is_some());
    }
}
