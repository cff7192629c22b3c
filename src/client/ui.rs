//! Terminal progress bars, one per running download.

use std::sync::LazyLock;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::{sync::mpsc, task::JoinHandle};

use super::downloader::Progress;
use crate::{kind::FileKind, models::file_name_from_url};

const PB_STYLE: &str = "{prefix} {wide_bar:.cyan/blue} {pos:>3}% {msg}";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::with_template(PB_STYLE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PB_CHARS)
});

/// One progress bar per download, drawn together.
pub struct ProgressBoard {
    multi: MultiProgress,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }

    #[cfg(test)]
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
        }
    }

    /// Add a bar for `url`, fed by the returned sender.
    ///
    /// The task finishes with the last snapshot once the sender is dropped.
    pub fn track(&self, url: &str) -> (mpsc::UnboundedSender<Progress>, JoinHandle<Progress>) {
        let pb = self.multi.add(ProgressBar::new(100));
        pb.set_style(PB_TEMPLATE.clone());
        pb.set_prefix(format!(
            "{} {}",
            FileKind::from_url(url).icon(),
            file_name_from_url(url)
        ));

        let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
        let handle = tokio::spawn(async move {
            let mut last = Progress::default();
            while let Some(progress) = rx.recv().await {
                pb.set_position(progress.bar_percent().round() as u64);
                pb.set_message(status_line(&progress));
                last = progress;
            }
            pb.finish();
            last
        });
        (tx, handle)
    }
}

/// Status text shown next to a bar
pub fn status_line(progress: &Progress) -> String {
    if progress.is_complete() {
        return progress.status.to_string();
    }
    match progress.total_display() {
        Some(total) => format!(
            "{} {} / {}",
            progress.status,
            progress.downloaded_display(),
            total
        ),
        None => format!("{} {}", progress.status, progress.downloaded_display()),
    }
}
