//! Market-hours window logic for the NSE trading calendar.
//!
//! All times are IST, a fixed +05:30 offset with no daylight saving, so a
//! `chrono::FixedOffset` is sufficient. The exchange trades weekdays from
//! 09:15 to 15:30; order placement starts warming up at 09:14 so the first
//! submissions land the moment the market opens.
//!
//! "Now" and delays are injected through the `Clock` and `Sleeper` traits so
//! every transition in the executor and gate is testable without wall-clock
//! time.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

/// India Standard Time: UTC+05:30, no DST.
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("IST offset is valid")
}

/// 09:15 IST — first tradeable instant.
pub fn market_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).expect("valid time")
}

/// 09:14 IST — pre-open target where order retries begin.
pub fn preopen_target() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 14, 0).expect("valid time")
}

/// 15:30 IST — market close and the daily retry cutoff.
pub fn market_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).expect("valid time")
}

/// Sleeps are bounded so an interrupt lands within a minute even during an
/// overnight wait.
pub const MAX_SLEEP_CHUNK: Duration = Duration::from_secs(60);

fn at(date: NaiveDate, time: NaiveTime) -> DateTime<FixedOffset> {
    ist()
        .from_local_datetime(&date.and_time(time))
        .single()
        .expect("fixed offset is unambiguous")
}

pub fn is_weekday(d: &DateTime<FixedOffset>) -> bool {
    !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Whether the market is open at `now`: weekday and 09:15 <= t < 15:30.
pub fn is_market_open(now: DateTime<FixedOffset>) -> bool {
    if !is_weekday(&now) {
        return false;
    }
    let t = now.time();
    t >= market_open() && t < market_close()
}

/// The next instant at which pre-open order placement should begin.
///
/// On a weekday between 09:14 and 09:15 this is `now` itself — the window
/// has already started and there is nothing to wait for. Before 09:14 on a
/// weekday it is today at 09:14. Otherwise it is 09:14 on the next weekday.
pub fn next_preopen(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let t = now.time();
    if is_weekday(&now) {
        if t >= preopen_target() && t < market_open() {
            return now;
        }
        if t < preopen_target() {
            return at(now.date_naive(), preopen_target());
        }
    }

    let mut date = now.date_naive();
    if is_weekday(&now) {
        date += chrono::Duration::days(1);
    }
    while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        date += chrono::Duration::days(1);
    }
    at(date, preopen_target())
}

/// Same-day 15:30 IST — every per-order retry loop is bounded by this.
pub fn close_cutoff(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    at(now.date_naive(), market_close())
}

/// A source of "now", injected so time-dependent logic is unit-testable.
pub trait Clock {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall-clock time in IST.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&ist())
    }
}

/// A source of delay, injected alongside the clock.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real blocking sleep.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// A hand-cranked clock for tests and harnesses.
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap()
    }
}

/// Block until `target`, sleeping in bounded chunks so cancellation stays
/// responsive during long (possibly overnight or weekend-long) waits.
pub fn wait_until(clock: &dyn Clock, sleeper: &dyn Sleeper, target: DateTime<FixedOffset>) {
    loop {
        let now = clock.now();
        if now >= target {
            return;
        }
        let remaining = (target - now).to_std().unwrap_or(Duration::ZERO);
        sleeper.sleep(remaining.min(MAX_SLEEP_CHUNK));
    }
}
