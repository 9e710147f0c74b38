pub use std::sync::atomic::{AtomicUsize, Ordering};

pub static DEBUG: DebugMetrics = DebugMetrics::new();

pub struct DebugMetrics {
    tick_count: AtomicUsize,
    tick_errors: AtomicUsize,
    sample_count: AtomicUsize,
    gap_count: AtomicUsize,
    ceiling_errors: AtomicUsize,
    persist_count: AtomicUsize,
    persist_errors: AtomicUsize,
    render_count: AtomicUsize,
    render_errors: AtomicUsize,
}

impl DebugMetrics {
    pub const fn new() -> Self {
        DebugMetrics {
            tick_count: AtomicUsize::new(0),
            tick_errors: AtomicUsize::new(0),
            sample_count: AtomicUsize::new(0),
            gap_count: AtomicUsize::new(0),
            ceiling_errors: AtomicUsize::new(0),
            persist_count: AtomicUsize::new(0),
            persist_errors: AtomicUsize::new(0),
            render_count: AtomicUsize::new(0),
            render_errors: AtomicUsize::new(0),
        }
    }

    pub fn tick_succeeded(&self) {
        self.tick_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_failed(&self) {
        self.tick_count.fetch_add(1, Ordering::Relaxed);
        self.tick_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample_recorded(&self) {
        self.sample_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn gap_recorded(&self) {
        self.gap_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ceiling_failed(&self) {
        self.ceiling_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn persist_succeeded(&self) {
        self.persist_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn persist_failed(&self) {
        self.persist_count.fetch_add(1, Ordering::Relaxed);
        self.persist_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_succeeded(&self) {
        self.render_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_failed(&self) {
        self.render_count.fetch_add(1, Ordering::Relaxed);
        self.render_errors.fetch_add(1, Ordering::Relaxed);
    }

    // Log the current metrics and reset the counters
    pub fn publish(&self) {
        let tick_count = self.tick_count.swap(0, Ordering::Relaxed);
        let tick_errors = self.tick_errors.swap(0, Ordering::Relaxed);
        let sample_count = self.sample_count.swap(0, Ordering::Relaxed);
        let gap_count = self.gap_count.swap(0, Ordering::Relaxed);
        let ceiling_errors = self.ceiling_errors.load(Ordering::Relaxed);
        let persist_count = self.persist_count.swap(0, Ordering::Relaxed);
        let persist_errors = self.persist_errors.swap(0, Ordering::Relaxed);
        let render_count = self.render_count.swap(0, Ordering::Relaxed);
        let render_errors = self.render_errors.swap(0, Ordering::Relaxed);
        println!(
            "Debug: ticks {} (errors {}) | samples {} (gaps {}) | ceiling errors {} | writes {} (errors {}) | renders {} (errors {})",
            tick_count,
            tick_errors,
            sample_count,
            gap_count,
            ceiling_errors,
            persist_count,
            persist_errors,
            render_count,
            render_errors,
        );
    }
}
