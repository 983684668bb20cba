/// Progress of the item being transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress<'a> {
    /// Name of the item in flight.
    pub label: &'a str,
    /// Bytes copied so far (entries removed, for deletes).
    pub done: u64,
    pub total: u64,
}

impl Progress<'_> {
    /// Completion in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.done as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Running counter that reports to a progress callback.
pub(crate) struct Meter<'a> {
    label: &'a str,
    done: u64,
    total: u64,
    sink: &'a mut dyn FnMut(Progress<'_>),
}

impl<'a> Meter<'a> {
    pub(crate) fn new(label: &'a str, total: u64, sink: &'a mut dyn FnMut(Progress<'_>)) -> Self {
        Self {
            label,
            done: 0,
            total,
            sink,
        }
    }

    pub(crate) fn start(&mut self) {
        self.report();
    }

    pub(crate) fn advance(&mut self, amount: u64) {
        self.done = self.done.saturating_add(amount);
        self.report();
    }

    fn report(&mut self) {
        (self.sink)(Progress {
            label: self.label,
            done: self.done,
            total: self.total.max(self.done),
        });
    }
}
