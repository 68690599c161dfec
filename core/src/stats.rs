// Cumulative byte counters, fed into tracker announce's `uploaded`/`downloaded`
// fields. Unlike a rate counter there is no decay: totals only grow for the
// lifetime of a session.
#[derive(Debug, Default)]
pub struct Counter(std::sync::atomic::AtomicU64);

impl Counter {

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_adds() {
        let counter = Counter::default();
        counter.add(100);
        counter.add(50);
        assert_eq!(counter.total(), 150);
    }
}
