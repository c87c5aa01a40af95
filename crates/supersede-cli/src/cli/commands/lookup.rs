//! `supersede lookup`: typeahead over stdin.
//!
//! Every non-empty line starts a lookup through one shared tracker. Only the
//! lookup that is still current when it finishes gets its result printed; an
//! empty line abandons the lookup in flight.

use std::time::Duration;

use anyhow::{Context, Result};
use supersede_core::{Operation, Source, Superseded, Tracker};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use crate::config::LookupConfig;
use crate::lookup::Dictionary;

type LookupOperation = Operation<'static, Vec<String>, anyhow::Error>;

#[derive(Debug, Clone, Copy, Default)]
pub struct LookupOptions {
    /// Delay before each query after the first.
    pub interval: Duration,
    pub show_stale: bool,
    pub show_pending: bool,
}

pub async fn run(config: &LookupConfig, options: LookupOptions) -> Result<()> {
    let dictionary = Dictionary::from_config(config);
    let cancellable = config.cancel_superseded;

    let show_pending = options.show_pending;
    let tracker = Tracker::builder()
        .on_change_is_pending(move |pending| {
            tracing::info!(pending, "lookup pending state changed");
            if show_pending {
                println!("pending {pending}");
            }
            Ok(())
        })
        .build();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();
    let mut issued = 0usize;

    while let Some(line) = lines.next_line().await.context("read query from stdin")? {
        let query = line.trim().to_string();
        if query.is_empty() {
            if let Some(id) = tracker.abandon() {
                tracing::debug!(op = %id, "input cleared");
            }
            continue;
        }

        if issued > 0 && !options.interval.is_zero() {
            tokio::time::sleep(options.interval).await;
        }
        issued += 1;

        let op = tracker.next(lookup_source(dictionary.clone(), query.clone(), cancellable));
        tracing::debug!(op = %op.id(), %query, "lookup started");
        in_flight.spawn(report(op, query, options.show_stale));
        reap_finished(&mut in_flight)?;
    }

    while let Some(joined) = in_flight.join_next().await {
        joined.context("lookup task panicked")??;
    }
    tracker.flush().await;

    let stats = tracker.stats();
    tracing::info!(
        started = stats.started,
        superseded = stats.superseded,
        signals = stats.signals_created,
        "lookups finished"
    );
    Ok(())
}

/// Collects reports that already finished, surfacing the first failure.
fn reap_finished(in_flight: &mut JoinSet<Result<()>>) -> Result<()> {
    while let Some(joined) = in_flight.try_join_next() {
        joined.context("lookup task panicked")??;
    }
    Ok(())
}

fn lookup_source(
    dictionary: Dictionary,
    query: String,
    cancellable: bool,
) -> Source<'static, Vec<String>, anyhow::Error> {
    Source::factory(move |context| {
        let signal = cancellable.then(|| context.signal());
        Ok(async move {
            dictionary
                .search(&query, signal)
                .await
                .map_err(anyhow::Error::from)
        })
    })
}

/// Prints the outcome of one lookup according to its current flag.
async fn report(op: LookupOperation, query: String, show_stale: bool) -> Result<()> {
    let failed_query = query.clone();
    op.then_or_else(
        move |words, is_current| async move {
            if is_current {
                println!("result {query}: {}", format_words(&words));
            } else if show_stale {
                println!("stale {query}");
            }
            Ok(())
        },
        move |err, is_current| async move {
            if err.downcast_ref::<Superseded>().is_some() {
                if show_stale {
                    println!("cancelled {failed_query}");
                }
                Ok(())
            } else if is_current {
                Err(err.context(format!("lookup '{failed_query}' failed")))
            } else {
                tracing::debug!(query = %failed_query, error = %err, "stale lookup failed");
                Ok(())
            }
        },
    )
    .await
}

fn format_words(words: &[String]) -> String {
    if words.is_empty() {
        "(none)".to_string()
    } else {
        words.join(", ")
    }
}
