// crates/cli/src/watch.rs
//! Live progress view: renders the current job on an indicatif bar,
//! reflects the connectivity signal, and re-establishes the link with
//! the stored credential when it stays down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use mailshift_sync::Coordinator;

/// How long the link may stay down before the watch loop invokes the
/// manual reconnect affordance on the user's behalf.
const RECONNECT_AFTER: Duration = Duration::from_secs(15);

pub async fn run(coordinator: Arc<Coordinator>) -> anyhow::Result<()> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{wide_bar}] {pos:>3}%")
            .expect("progress template"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let mut state = coordinator.link_state();
    let mut offline_since: Option<Instant> = None;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                bar.abandon_with_message("detached");
                break;
            }
            _ = state.changed() => {}
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }

        let connected = coordinator.is_connected();
        if connected {
            offline_since = None;
        } else {
            let since = *offline_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= RECONNECT_AFTER {
                tracing::info!("link down, invoking manual reconnect");
                let _ = coordinator.reconnect();
                offline_since = Some(Instant::now());
            }
        }

        match coordinator.current_job() {
            Some(job) => {
                bar.set_position(u64::from(job.progress));
                let suffix = if connected { "" } else { "  (link down)" };
                let message = job.message.as_deref().unwrap_or("");
                bar.set_message(format!("{} {} {}{}", job.job_id, job.status, message, suffix));
                if job.status.is_terminal() {
                    bar.finish_with_message(format!("{} {}", job.job_id, job.status));
                    break;
                }
            }
            None => {
                let suffix = if connected { "" } else { "  (link down)" };
                bar.set_message(format!("waiting for job events...{suffix}"));
            }
        }
    }

    Ok(())
}
