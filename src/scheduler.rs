//! Periodic autostart loops
//!
//! [`TariffScheduler`] checks the tariff on a fixed interval and runs the
//! autostart action during low tariff. [`run_cron`] runs the action on a
//! cron schedule. Both stop on cancellation without waiting for the next
//! tick.

use crate::error::{EkzError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::tariff::TariffSchedule;
use chrono::{DateTime, Local, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default interval between tariff checks
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default cron expression for `autostart scheduled`
pub const DEFAULT_CRON: &str = "*/5 * * * *";

/// Work run on every low-tariff tick
#[async_trait::async_trait]
pub trait AutostartAction: Send + Sync {
    async fn run(&self) -> Result<()>;
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Interval loop gated by a [`TariffSchedule`]
pub struct TariffScheduler {
    action: Arc<dyn AutostartAction>,
    schedule: Arc<TariffSchedule>,
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
    logger: StructuredLogger,
}

impl TariffScheduler {
    pub fn new(action: Arc<dyn AutostartAction>, schedule: TariffSchedule) -> Self {
        Self {
            action,
            schedule: Arc::new(schedule),
            interval: DEFAULT_CHECK_INTERVAL,
            running: Mutex::new(None),
            logger: get_logger("scheduler"),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn schedule(&self) -> &TariffSchedule {
        &self.schedule
    }

    /// Spawn the loop; it also ends when `parent` is cancelled
    pub fn start(&self, parent: &CancellationToken) -> Result<()> {
        if self.interval.is_zero() {
            return Err(EkzError::validation(
                "check_interval",
                "must be greater than zero",
            ));
        }

        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(EkzError::scheduler("scheduler is already running"));
        }

        let cancel = parent.child_token();
        let handle = tokio::spawn(run_loop(
            self.action.clone(),
            self.schedule.clone(),
            self.interval,
            cancel.clone(),
            self.logger.clone(),
        ));
        *running = Some(RunningLoop { cancel, handle });

        self.logger.info(&format!(
            "Tariff scheduler started (interval {}s)",
            self.interval.as_secs()
        ));
        Ok(())
    }

    /// Cancel the loop and wait until it has exited; no-op when idle
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(running) = running else {
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            self.logger
                .error(&format!("Scheduler loop ended abnormally: {}", e));
        }
        self.logger.info("Tariff scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Wait until the loop ends on its own, e.g. after parent cancellation
    pub async fn wait(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(running) = running
            && let Err(e) = running.handle.await
        {
            self.logger
                .error(&format!("Scheduler loop ended abnormally: {}", e));
        }
    }
}

async fn run_loop(
    action: Arc<dyn AutostartAction>,
    schedule: Arc<TariffSchedule>,
    period: Duration,
    cancel: CancellationToken,
    logger: StructuredLogger,
) {
    // First tick fires immediately
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = check_and_run(action.as_ref(), &schedule, &logger) => {}
        }
    }
    logger.debug("Scheduler loop exited");
}

async fn check_and_run(
    action: &dyn AutostartAction,
    schedule: &TariffSchedule,
    logger: &StructuredLogger,
) {
    let now = schedule.now();
    if schedule.is_high_tariff(now) {
        logger.debug(&format!(
            "{} is high tariff, next low tariff at {}",
            now.format("%Y-%m-%d %H:%M %a"),
            schedule.next_low_tariff(now).format("%Y-%m-%d %H:%M %a")
        ));
        return;
    }

    logger.info("Low tariff period, checking autostart conditions");
    if let Err(e) = action.run().await {
        logger.error(&format!("Autostart attempt failed: {}", e));
    }
}

/// Parse a cron expression.
///
/// 5-field crontab lines get a seconds field, and their day-of-week
/// field is read the crontab way (0-7, Sunday is 0 and 7). 6/7-field
/// expressions are passed to the `cron` crate unchanged.
pub fn parse_cron(expr: &str) -> Result<cron::Schedule> {
    let expr = expr.trim();
    let invalid = |reason: String| {
        EkzError::validation("cron", format!("invalid cron expression {:?}: {}", expr, reason))
    };

    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = if let [minute, hour, day_of_month, month, day_of_week] = fields[..] {
        let day_of_week = crontab_day_of_week(day_of_week).map_err(invalid)?;
        format!(
            "0 {} {} {} {} {}",
            minute, hour, day_of_month, month, day_of_week
        )
    } else {
        expr.to_string()
    };
    cron::Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))
}

const CRONTAB_DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

fn crontab_day(token: &str) -> std::result::Result<u32, String> {
    if let Ok(n) = token.parse::<u32>() {
        return if n <= 7 {
            Ok(n)
        } else {
            Err(format!("day of week {} is out of range 0-7", n))
        };
    }
    let lower = token.to_ascii_lowercase();
    CRONTAB_DAY_NAMES
        .iter()
        .position(|name| *name == lower)
        .map(|i| i as u32)
        .ok_or_else(|| format!("unknown day of week {:?}", token))
}

/// Rewrite a crontab day-of-week field into the `cron` crate's numbering
/// (1-7, Sunday is 1) as an explicit list.
fn crontab_day_of_week(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step = step
                    .parse::<usize>()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| format!("invalid step {:?}", step))?;
                (range, Some(step))
            }
            None => (item, None),
        };

        let (first, last) = if range == "*" {
            (0, 6)
        } else if let Some((a, b)) = range.split_once('-') {
            (crontab_day(a)?, crontab_day(b)?)
        } else {
            let day = crontab_day(range)?;
            // "N/step" runs from N to the end of the week
            (day, if step.is_some() { day.max(6) } else { day })
        };
        if first > last {
            return Err(format!("day of week range {:?} is reversed", range));
        }

        for day in (first..=last).step_by(step.unwrap_or(1)) {
            days[(day % 7) as usize] = true;
        }
    }

    let list: Vec<String> = days
        .iter()
        .enumerate()
        .filter(|(_, set)| **set)
        .map(|(day, _)| (day + 1).to_string())
        .collect();
    Ok(list.join(","))
}

fn next_run(schedule: &cron::Schedule, time_zone: Option<Tz>) -> Option<DateTime<Utc>> {
    match time_zone {
        Some(tz) => schedule.upcoming(tz).next().map(|t| t.with_timezone(&Utc)),
        None => schedule.upcoming(Local).next().map(|t| t.with_timezone(&Utc)),
    }
}

/// Run `action` at every instant of `schedule` until cancelled
pub async fn run_cron(
    schedule: &cron::Schedule,
    time_zone: Option<Tz>,
    action: &dyn AutostartAction,
    cancel: &CancellationToken,
) -> Result<()> {
    let logger = get_logger("cron");

    loop {
        let next = next_run(schedule, time_zone)
            .ok_or_else(|| EkzError::scheduler("cron expression has no upcoming runs"))?;
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        logger.debug(&format!("Next autostart check at {}", next.to_rfc3339()));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = action.run() => {
                if let Err(e) = result {
                    logger.error(&format!("Autostart attempt failed: {}", e));
                }
            }
        }
    }

    logger.info("Cron loop stopped");
    Ok(())
}

/// Whether the system clock has been set, i.e. is past 1971-01-01
pub fn clock_is_set(now: DateTime<Utc>) -> bool {
    match Utc.with_ymd_and_hms(1971, 1, 1, 0, 0, 0).single() {
        Some(threshold) => now >= threshold,
        None => true,
    }
}

/// Block until the clock is set; boards without RTC boot at the epoch
pub async fn wait_for_clock_sync(cancel: &CancellationToken) {
    let logger = get_logger("scheduler");
    while !clock_is_set(Utc::now()) {
        logger.debug("Waiting for the system clock to be set");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Weekday};

    #[test]
    fn five_field_cron_is_accepted() {
        let schedule = parse_cron(DEFAULT_CRON).unwrap();
        let mut upcoming = schedule.upcoming(Utc);
        let first = upcoming.next().unwrap();
        let second = upcoming.next().unwrap();
        assert_eq!((second - first).num_minutes(), 5);
    }

    fn weekdays(expr: &str) -> Vec<Weekday> {
        parse_cron(expr)
            .unwrap()
            .upcoming(Utc)
            .take(14)
            .map(|t| t.weekday())
            .collect()
    }

    #[test]
    fn crontab_weekday_range_skips_weekend() {
        let days = weekdays("0 22 * * 1-5");
        assert!(!days.contains(&Weekday::Sat));
        assert!(!days.contains(&Weekday::Sun));
        for day in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
            assert!(days.contains(&day), "{:?} missing", day);
        }
    }

    #[test]
    fn crontab_sunday_is_zero_or_seven() {
        assert!(weekdays("0 22 * * 0").iter().all(|d| *d == Weekday::Sun));
        assert!(weekdays("0 22 * * 7").iter().all(|d| *d == Weekday::Sun));
        assert!(weekdays("0 8 * * sun").iter().all(|d| *d == Weekday::Sun));
    }

    #[test]
    fn crontab_weekday_lists_and_steps() {
        let days = weekdays("0 6 * * 6,0");
        assert!(days.iter().all(|d| matches!(d, Weekday::Sat | Weekday::Sun)));

        // Sun, Tue, Thu, Sat
        let days = weekdays("0 6 * * */2");
        assert!(days.iter().all(|d| d.num_days_from_sunday() % 2 == 0));

        // Mon, Wed, Fri
        let days = weekdays("0 6 * * 1-5/2");
        assert!(days.iter().all(|d| matches!(d, Weekday::Mon | Weekday::Wed | Weekday::Fri)));

        let days = weekdays("0 6 * * Mon-fri");
        assert!(!days.contains(&Weekday::Sat) && !days.contains(&Weekday::Sun));
    }

    #[test]
    fn crontab_weekday_errors() {
        assert!(parse_cron("0 22 * * 8").is_err());
        assert!(parse_cron("0 22 * * 5-1").is_err());
        assert!(parse_cron("0 22 * * */0").is_err());
        assert!(parse_cron("0 22 * * funday").is_err());
    }

    #[test]
    fn six_field_cron_is_kept() {
        assert!(parse_cron("30 */10 * * * *").is_ok());
        assert!(parse_cron("not a cron").is_err());
    }

    #[test]
    fn clock_sync_threshold() {
        assert!(!clock_is_set(DateTime::<Utc>::UNIX_EPOCH));
        assert!(clock_is_set(Utc::now()));
    }
}
