use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const SPINNER_TICK_MS: u64 = 80;

/// A stderr spinner shown while a slow step (network, bulk import) runs.
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        let pb = ProgressBar::new_spinner().with_style(Self::spinner_style());
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
        pb.set_message(message.into());
        Self { pb }
    }

    pub fn succeed(self, message: impl Into<String>) {
        self.pb.disable_steady_tick();
        self.pb.finish_with_message(format!("✓ {}", message.into()));
    }

    pub fn fail(self, message: impl Into<String>) {
        self.pb.disable_steady_tick();
        self.pb.finish_with_message(format!("✗ {}", message.into()));
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}
