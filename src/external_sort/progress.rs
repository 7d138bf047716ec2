use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPhase {
    Reading,
    Writing,
}

/// Snapshot handed to a progress observer after each line read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortProgress {
    pub phase: SortPhase,
    /// Lines handled so far in the current phase.
    pub counter: usize,
}

pub type ProgressObserver<'a> = Box<dyn FnMut(&SortProgress) + 'a>;

pub(crate) struct ProgressTracker<'a> {
    observer: Option<ProgressObserver<'a>>,
    progress: SortProgress,
    log_interval: usize,
    label: &'static str,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(observer: Option<ProgressObserver<'a>>, log_interval: usize, label: &'static str) -> Self {
        Self {
            observer,
            progress: SortProgress {
                phase: SortPhase::Reading,
                counter: 0,
            },
            log_interval,
            label,
        }
    }

    pub fn start(&mut self, phase: SortPhase) {
        self.progress = SortProgress { phase, counter: 0 };
    }

    pub fn tick(&mut self) {
        self.progress.counter += 1;
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.progress);
        }
        if self.log_interval > 0 && self.progress.counter % self.log_interval == 0 {
            debug!(
                "{}: {:?} {} lines",
                self.label, self.progress.phase, self.progress.counter
            );
        }
    }

    pub fn into_observer(self) -> Option<ProgressObserver<'a>> {
        self.observer
    }
}
