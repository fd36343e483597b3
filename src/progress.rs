//! Progress observers.
//!
//! Commit progress is reported as the fraction of entries written. Extraction
//! progress is reported per entry as the fraction of its uncompressed bytes,
//! and the observer may stop the extraction by returning `false`.

/// Observer for the commit protocol.
///
/// Closures `FnMut(f64)` implement this trait.
pub trait ProgressReporter: Send {
    /// `fraction` runs from 0.0 to 1.0.
    fn on_progress(&mut self, fraction: f64);
}

impl<F> ProgressReporter for F
where
    F: FnMut(f64) + Send,
{
    fn on_progress(&mut self, fraction: f64) {
        self(fraction)
    }
}

/// Observer for a single-entry extraction.
///
/// Return `false` to cancel. Closures `FnMut(&str, f64) -> bool` implement
/// this trait.
pub trait ExtractProgress {
    fn on_progress(&mut self, entry_name: &str, fraction: f64) -> bool;
}

impl<F> ExtractProgress for F
where
    F: FnMut(&str, f64) -> bool,
{
    fn on_progress(&mut self, entry_name: &str, fraction: f64) -> bool {
        self(entry_name, fraction)
    }
}

/// Observer that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ExtractProgress for NoProgress {
    fn on_progress(&mut self, _entry_name: &str, _fraction: f64) -> bool {
        true
    }
}

/// Observer for [`Archive::extract_all`](crate::Archive::extract_all):
/// `(entry_name, entry_fraction, total_fraction)`.
pub trait ExtractAllProgress {
    fn on_progress(&mut self, entry_name: &str, entry_fraction: f64, total_fraction: f64) -> bool;
}

impl<F> ExtractAllProgress for F
where
    F: FnMut(&str, f64, f64) -> bool,
{
    fn on_progress(&mut self, entry_name: &str, entry_fraction: f64, total_fraction: f64) -> bool {
        self(entry_name, entry_fraction, total_fraction)
    }
}

impl ExtractAllProgress for NoProgress {
    fn on_progress(&mut self, _: &str, _: f64, _: f64) -> bool {
        true
    }
}

/// Fraction `done / total`, 1.0 for an empty total.
pub(crate) fn fraction(done: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        (done as f64 / total as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_reporters() {
        fn drive(reporter: &mut dyn ProgressReporter) {
            reporter.on_progress(0.0);
            reporter.on_progress(1.0);
        }

        let mut seen = Vec::new();
        drive(&mut |f: f64| seen.push(f));
        assert_eq!(seen, vec![0.0, 1.0]);

        let mut stop_after_half = |_: &str, f: f64| f < 0.5;
        assert!(ExtractProgress::on_progress(&mut stop_after_half, "a", 0.25));
        assert!(!ExtractProgress::on_progress(&mut stop_after_half, "a", 0.75));
    }

    #[test]
    fn test_fraction() {
        assert_eq!(fraction(0, 0), 1.0);
        assert_eq!(fraction(1, 4), 0.25);
        assert_eq!(fraction(5, 4), 1.0);
    }
}
