use std::time::Duration;

use time::OffsetDateTime;

/// Wall clock plus timer used by background tasks.
///
/// The reaper reads both its sweep cutoff (`now`) and its interval timer
/// (`sleep`) from this trait, so a test clock can age sessions and fire the
/// next sweep without waiting out real hours.
pub trait Clock: Clone + Send + Sync + 'static {
    type Sleep<'a>: Future<Output = ()> + Send + 'a
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime;
    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a>;
}
