use crate::config::{PageLayout, ScrollConfig};

use super::session::UiSession;

/// What a reveal pass actually did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RevealReport {
    pub planned_steps: usize,
    pub key_presses: usize,
    pub loaded_more: bool,
}

/// Drives a lazily paginated result list far enough to cover a target count.
pub struct ScrollController<'a> {
    config: &'a ScrollConfig,
    layout: &'a PageLayout,
}

impl<'a> ScrollController<'a> {
    pub fn new(config: &'a ScrollConfig, layout: &'a PageLayout) -> Self {
        Self { config, layout }
    }

    /// Reveal enough results for `target_count` images.
    ///
    /// Never fails: a missing scroll target or "load more" control just means
    /// fewer results are revealed.
    pub async fn reveal<S>(&self, session: &mut S, target_count: usize) -> RevealReport
    where
        S: UiSession + ?Sized,
    {
        let mut report = RevealReport::default();
        self.advance(session, target_count, &mut report).await;
        tokio::time::sleep(self.config.page_load_timeout).await;

        if target_count > self.config.large_result_threshold {
            match session.click(&self.layout.load_more, 0).await {
                Ok(()) => {
                    report.loaded_more = true;
                    tokio::time::sleep(self.config.page_load_timeout).await;
                    self.advance(session, target_count, &mut report).await;
                }
                Err(e) => tracing::warn!("No extra results: {}", e),
            }
        }

        tracing::debug!(
            "Reveal for {} images: {}/{} key presses, load more: {}",
            target_count,
            report.key_presses,
            report.planned_steps,
            report.loaded_more
        );
        report
    }

    async fn advance<S>(&self, session: &mut S, target_count: usize, report: &mut RevealReport)
    where
        S: UiSession + ?Sized,
    {
        let steps = self.config.iterations_for(target_count);
        let pause = self.config.step_pause();
        report.planned_steps += steps;

        for step in 0..steps {
            tokio::time::sleep(pause).await;
            if let Err(e) = session
                .press_key(&self.layout.scroll_target, &self.config.advance_key)
                .await
            {
                tracing::warn!("Stopped scrolling after {} of {} steps: {}", step, steps, e);
                return;
            }
            report.key_presses += 1;
        }
    }
}
