//! Repeats reconcile passes until told to stop.
//!
//! Each lock gets its own task, so passes for one lock never overlap while different locks proceed independently.
//! After a pass the task waits for:
//! - the requested delay when the pass asked to be requeued,
//! - the resync period when the pass finished cleanly,
//! - an exponential backoff when the pass returned an error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::ResolverConfig;
use crate::reconciler::Reconciler;

pub struct Controller {
	reconciler: Arc<Reconciler>,
	resync: Duration,
	backoff_base: Duration,
	backoff_max: Duration,
}

impl Controller {
	pub fn new(reconciler: Arc<Reconciler>, config: &ResolverConfig) -> Self {
		Self {
			reconciler,
			resync: config.resync(),
			backoff_base: config.backoff_base(),
			backoff_max: config.backoff_max(),
		}
	}

	/// Reconciles every lock in `names` until `shutdown` changes or its sender is dropped.
	pub async fn run(&self, names: Vec<String>, shutdown: watch::Receiver<bool>) {
		let mut tasks = Vec::with_capacity(names.len());
		for name in names {
			let reconciler = self.reconciler.clone();
			let shutdown = shutdown.clone();
			let delays = Delays { resync: self.resync, backoff_base: self.backoff_base, backoff_max: self.backoff_max };
			tasks.push(tokio::spawn(drive(reconciler, name, delays, shutdown)));
		}

		for task in tasks {
			if let Err(e) = task.await {
				log::error!("Reconcile task failed: {}", e);
			}
		}
	}
}

#[derive(Debug, Clone, Copy)]
struct Delays {
	resync: Duration,
	backoff_base: Duration,
	backoff_max: Duration,
}

async fn drive(reconciler: Arc<Reconciler>, name: String, delays: Delays, mut shutdown: watch::Receiver<bool>) {
	let mut failures: u32 = 0;

	loop {
		if *shutdown.borrow() {
			break;
		}

		let delay = match reconciler.reconcile(&name).await {
			Ok(outcome) => {
				failures = 0;
				log::trace!("Lock {} pass ended in {:?}", name, outcome.state);
				outcome.requeue_after.unwrap_or(delays.resync)
			},
			Err(e) => {
				failures = failures.saturating_add(1);
				let delay = backoff_delay(failures, delays.backoff_base, delays.backoff_max);
				log::warn!("Reconcile of lock {} failed, retrying in {:?}: {}", name, delay, e);
				delay
			},
		};

		tokio::select! {
			_ = tokio::time::sleep(delay) => {},
			changed = shutdown.changed() => {
				if changed.is_err() || *shutdown.borrow() {
					break;
				}
			},
		}
	}

	log::debug!("Stopped reconciling lock {}", name);
}

/// `base * 2^(failures - 1)`, capped at `max`.
pub fn backoff_delay(failures: u32, base: Duration, max: Duration) -> Duration {
	let exponent = failures.saturating_sub(1).min(31);
	base.checked_mul(1u32 << exponent).map_or(max, |d| d.min(max))
}
