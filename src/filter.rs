// src/filter.rs
use alloy::primitives::{B256, U256};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::FeedCatalog;
use crate::metrics;
use crate::sources::DataSource;
use crate::types::{decode_value, decode_whole_units, DecodeError, FundedFeedDetails};

/// Why a feed (or a historical entry) was dropped. Scoped to one feed; never
/// aborts a pass.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EligibilityError {
    #[error("no value source for query")]
    UnsupportedQuery,
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("unable to fetch current value")]
    FetchFailure,
    #[error("reward {reward} exceeds balance {balance}")]
    InsufficientFunds { reward: U256, balance: U256 },
    #[error("balance exhausted by unclaimed rewards")]
    BalanceDepleted,
    #[error("not first in window and no price threshold")]
    OutsideWindow,
    #[error("price change {change} below threshold {threshold}")]
    BelowThreshold { change: u64, threshold: U256 },
}

impl EligibilityError {
    pub fn reason(&self) -> &'static str {
        match self {
            EligibilityError::UnsupportedQuery => "unsupported",
            EligibilityError::Decode(_) => "decode",
            EligibilityError::FetchFailure => "fetch",
            EligibilityError::InsufficientFunds { .. } => "funds",
            EligibilityError::BalanceDepleted => "depleted",
            EligibilityError::OutsideWindow => "window",
            EligibilityError::BelowThreshold { .. } => "threshold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCheck {
    pub first_in_window: bool,
    /// Seconds since the start of the window containing the checked timestamp.
    pub time_diff: u64,
}

/// Whether `timestamp_to_check` would be the first submission in its window,
/// given the previous submission `timestamp_before` (None = never submitted).
pub fn is_timestamp_first_in_window(
    timestamp_before: Option<u64>,
    timestamp_to_check: u64,
    feed_start_timestamp: u64,
    feed_window: u64,
    feed_interval: u64,
) -> WindowCheck {
    if feed_interval == 0 {
        return WindowCheck { first_in_window: false, time_diff: 0 };
    }
    let start = feed_start_timestamp as i128;
    let interval = feed_interval as i128;
    let check = timestamp_to_check as i128;
    // floor, also for checks before the feed start
    let num_intervals = (check - start).div_euclid(interval);
    let current_window_start = start + interval * num_intervals;
    let time_diff = check - current_window_start;
    let before_window = timestamp_before.map_or(true, |t| (t as i128) < current_window_start);
    WindowCheck {
        first_in_window: time_diff < feed_window as i128 && before_window,
        time_diff: time_diff as u64,
    }
}

/// Magnitude of change in hundredths of a percent, truncated toward zero.
/// A zero previous value counts as a 100% move.
pub fn price_change(previous: f64, current: f64) -> u64 {
    if previous == 0.0 {
        return 10_000;
    }
    let change = if current >= previous {
        10_000.0 * (current - previous) / previous
    } else {
        10_000.0 * (previous - current) / previous
    };
    // `as` truncates and clamps negatives to zero
    change as u64
}

fn below_threshold(change: u64, threshold: U256) -> bool {
    U256::from(change) < threshold
}

fn drop_feed(feed: &FundedFeedDetails, why: &EligibilityError) {
    tracing::debug!(feed_id = %feed.feed_id, query_id = %feed.query_id, reason = why.reason(), "dropped: {why}");
    metrics::feed_dropped(why.reason());
}

enum Pending {
    Keep,
    Drop(EligibilityError),
    PriceCheck { source: Arc<dyn DataSource>, previous: f64 },
}

/// Decides which funded feeds are worth a submission right now.
pub struct FundedFeedFilter {
    pub catalog: Arc<FeedCatalog>,
    pub fetch_timeout: Duration,
}

impl FundedFeedFilter {
    pub fn new(catalog: Arc<FeedCatalog>, fetch_timeout: Duration) -> Self {
        Self { catalog, fetch_timeout }
    }

    /// Drop feeds with a price threshold that we have no way to price.
    pub fn filter_supported(&self, feeds: Vec<FundedFeedDetails>) -> Vec<FundedFeedDetails> {
        feeds
            .into_iter()
            .filter(|feed| {
                if feed.params.price_threshold.is_zero() || self.catalog.supports(&feed.query_data) {
                    return true;
                }
                drop_feed(feed, &EligibilityError::UnsupportedQuery);
                false
            })
            .collect()
    }

    /// Prune historical submissions that would not have earned a reward, so
    /// later unclaimed-reward accounting only sees rewardable timestamps.
    ///
    /// Each entry is compared with its predecessor in the input list; the oldest entry
    /// is only a baseline and is never removed.
    pub fn filter_history(&self, feeds: Vec<FundedFeedDetails>) -> Vec<FundedFeedDetails> {
        feeds.into_iter().map(|feed| self.prune_history(feed)).collect()
    }

    fn prune_history(&self, mut feed: FundedFeedDetails) -> FundedFeedDetails {
        let list = &feed.queryid_timestamps_values_list;
        if list.len() < 2 {
            return feed;
        }
        let p = &feed.params;
        let mut keep = vec![true; list.len()];

        for i in (1..list.len()).rev() {
            let (previous, current) = (&list[i - 1], &list[i]);
            if p.start_time > current.timestamp {
                keep[i] = false;
                continue;
            }
            let window = is_timestamp_first_in_window(
                Some(previous.timestamp),
                current.timestamp,
                p.start_time,
                p.window,
                p.interval,
            );
            if window.first_in_window {
                continue;
            }
            if p.price_threshold.is_zero() {
                keep[i] = false;
                continue;
            }
            let decoded = decode_whole_units(&previous.value)
                .and_then(|prev| decode_whole_units(&current.value).map(|cur| (prev, cur)));
            match decoded {
                Ok((prev, cur)) => {
                    if below_threshold(price_change(prev, cur), p.price_threshold) {
                        keep[i] = false;
                    }
                }
                Err(e) => {
                    tracing::warn!(feed_id = %feed.feed_id, ts = current.timestamp, "Error decoding query id value: {e}");
                }
            }
        }

        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped > 0 {
            tracing::debug!(feed_id = %feed.feed_id, dropped, "pruned historical submissions");
        }
        let mut flags = keep.into_iter();
        feed.queryid_timestamps_values_list.retain(|_| flags.next().unwrap_or(true));
        feed
    }

    /// Charge outstanding unclaimed rewards against each feed's balance and
    /// drop feeds that cannot cover them.
    pub fn apply_unclaimed_deductions(
        &self,
        feeds: Vec<FundedFeedDetails>,
        unclaimed: &HashMap<(B256, B256), u64>,
    ) -> Vec<FundedFeedDetails> {
        feeds
            .into_iter()
            .filter_map(|mut feed| {
                let Some(count) = unclaimed.get(&(feed.feed_id, feed.query_id)) else {
                    return Some(feed);
                };
                match feed.params.reward.checked_mul(U256::from(*count)) {
                    Some(owed) if owed < feed.params.balance => {
                        feed.params.balance -= owed;
                        Some(feed)
                    }
                    _ => {
                        drop_feed(&feed, &EligibilityError::BalanceDepleted);
                        None
                    }
                }
            })
            .collect()
    }

    /// Keep feeds where submitting at `now` is first in window (and fundable),
    /// or where the price moved past the threshold since the last report.
    ///
    /// Price fetches are deduplicated per query id and run concurrently. The
    /// price cache lives only for this call.
    pub async fn filter_eligible_now(&self, feeds: Vec<FundedFeedDetails>, now: u64) -> Vec<FundedFeedDetails> {
        let mut staged: Vec<(FundedFeedDetails, Pending)> = Vec::with_capacity(feeds.len());

        for mut feed in feeds {
            let p = &feed.params;
            let window = is_timestamp_first_in_window(
                feed.current_value_timestamp,
                now,
                p.start_time,
                p.window,
                p.interval,
            );

            let verdict = if window.first_in_window {
                let sloped = p.reward_increase_per_second.saturating_mul(U256::from(window.time_diff));
                feed.params.reward = feed.params.reward.saturating_add(sloped);
                if feed.params.balance < feed.params.reward {
                    Pending::Drop(EligibilityError::InsufficientFunds {
                        reward: feed.params.reward,
                        balance: feed.params.balance,
                    })
                } else {
                    Pending::Keep
                }
            } else if p.price_threshold.is_zero() {
                Pending::Drop(EligibilityError::OutsideWindow)
            } else {
                self.stage_price_check(&feed)
            };
            staged.push((feed, verdict));
        }

        let prices = self.fetch_prices(&staged).await;

        let mut kept = Vec::with_capacity(staged.len());
        for (feed, verdict) in staged {
            let outcome = match verdict {
                Pending::Keep => Ok(()),
                Pending::Drop(e) => Err(e),
                Pending::PriceCheck { previous, .. } => match prices.get(&feed.query_id) {
                    None => Err(EligibilityError::FetchFailure),
                    Some(&current) => {
                        let change = price_change(previous, current);
                        if below_threshold(change, feed.params.price_threshold) {
                            Err(EligibilityError::BelowThreshold { change, threshold: feed.params.price_threshold })
                        } else {
                            Ok(())
                        }
                    }
                },
            };
            match outcome {
                Ok(()) => {
                    metrics::feed_kept();
                    kept.push(feed);
                }
                Err(e) => drop_feed(&feed, &e),
            }
        }
        kept
    }

    fn stage_price_check(&self, feed: &FundedFeedDetails) -> Pending {
        let Some(data_feed) = self.catalog.resolve(&feed.query_data) else {
            return Pending::Drop(EligibilityError::UnsupportedQuery);
        };
        match decode_value(&feed.current_queryid_value) {
            Ok(previous) => Pending::PriceCheck { source: data_feed.source, previous },
            Err(e) => {
                tracing::info!(feed_id = %feed.feed_id, "Before value is not a number, can't calculate price change: {e}");
                Pending::Drop(e.into())
            }
        }
    }

    /// One fetch per query id, all in flight together. Failed or timed out
    /// fetches leave no entry.
    async fn fetch_prices(&self, staged: &[(FundedFeedDetails, Pending)]) -> HashMap<B256, f64> {
        let mut wanted: HashMap<B256, Arc<dyn DataSource>> = HashMap::new();
        for (feed, verdict) in staged {
            if let Pending::PriceCheck { source, .. } = verdict {
                wanted.entry(feed.query_id).or_insert_with(|| source.clone());
            }
        }
        if wanted.is_empty() {
            return HashMap::new();
        }

        let timeout = self.fetch_timeout;
        let results = join_all(wanted.into_iter().map(|(query_id, source)| async move {
            let reading = tokio::time::timeout(timeout, source.fetch_new_datapoint()).await;
            (query_id, reading)
        }))
        .await;

        let mut prices = HashMap::with_capacity(results.len());
        for (query_id, reading) in results {
            match reading {
                Ok(r) => match r.usable() {
                    Some(v) => {
                        prices.insert(query_id, v);
                    }
                    None => tracing::warn!(%query_id, "Unable to fetch data from API to check if price threshold is met"),
                },
                Err(_) => tracing::warn!(%query_id, ?timeout, "price fetch timed out"),
            }
        }
        prices
    }

    /// Full pass: support, history, balance, then window/threshold.
    pub async fn run_pass(
        &self,
        feeds: Vec<FundedFeedDetails>,
        unclaimed: &HashMap<(B256, B256), u64>,
        now: u64,
    ) -> Vec<FundedFeedDetails> {
        let total = feeds.len();
        let feeds = self.filter_supported(feeds);
        let feeds = self.filter_history(feeds);
        let feeds = self.apply_unclaimed_deductions(feeds, unclaimed);
        let feeds = self.filter_eligible_now(feeds, now).await;
        tracing::info!(now, total, eligible = feeds.len(), "funded feed pass complete");
        feeds
    }
}
