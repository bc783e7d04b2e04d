//! Keyword-weighted second-price auction.
//!
//! Selection runs inside one read transaction and has no side effects:
//!
//! 1. The message is reduced to a [`WordSet`].
//! 2. Every spend in the global index that is enabled and shares at least one
//!    term with the message becomes a candidate.
//! 3. Each candidate is scored. A matched term is worth `1 / n` where `n` is
//!    the number of candidates matching it, and the sum is scaled by the share
//!    of the spend's own keywords that matched. Broad keyword lists and
//!    contested terms both score lower.
//! 4. `discount = min_score / score`, so the weakest match has discount `1.0`
//!    and better matches fall below it. A candidate's effective bid is its
//!    (balance-clamped) max bid divided by its discount.
//! 5. A sole candidate pays the floor. Otherwise the highest effective bid wins
//!    and pays `(runner_up + 1) * discount`, capped at its own max bid.
//!
//! Billing is a separate write, see [`bill`].

use std::collections::HashMap;

use redb::ReadTransaction;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::campaign::{Creative, Spend, lookup_creative, scan_spends};
use crate::cents::Cents;
use crate::keyword::WordSet;
use crate::ledger::{BalanceView, Books, HOUSE, LedgerError, SYSTEM, is_pseudo};
use crate::overrides::OverrideSnapshot;
use crate::scoreboard::record_delivery;
use crate::store::{METRICS, Store, StoreError, open_write};

/// A spend that survived matching, scoring and the floor.
#[derive(Clone, Debug, PartialEq)]
pub struct Bid {
    pub spend: Spend,
    pub matches: WordSet,
    pub score: f64,
    pub discount: f64,
    /// Max bid after clamping to the owner's balance.
    pub max_bid: Cents,
    pub effective_bid: Cents,
}

/// Outcome of a won auction, ready to be shown and later billed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub creative: Creative,
    /// Account billed for the impression: the creative's owner, so house when
    /// the creative fell back.
    pub winner: String,
    /// Owner and creative name of the winning spend.
    pub bidder: String,
    pub spend_creative: String,
    pub price: Cents,
    pub floor: Cents,
    pub discount: f64,
    pub effective_bid: Cents,
    pub candidates: usize,
}

/// Result of a [`bill`] call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillReceipt {
    pub winner: String,
    pub price: Cents,
    pub impressions: u64,
    /// Winner's balance after paying; `None` for house, which is not charged.
    pub balance: Option<Cents>,
}

struct Candidate {
    spend: Spend,
    matches: WordSet,
}

/// Score, discount, clamp and filter the enabled matching spends.
///
/// The returned bids keep global-index order.
pub(crate) fn collect_bids(
    txn: &ReadTransaction,
    target: &WordSet,
    floor: Cents,
) -> Result<Vec<Bid>, StoreError> {
    let overrides = OverrideSnapshot::read(txn)?;

    let mut candidates = Vec::new();
    scan_spends(txn, |spend: Spend| {
        if !overrides.is_enabled(&spend.owner, &spend.creative) {
            debug!(owner = %spend.owner, creative = %spend.creative, "spend disabled");
            return Ok::<_, StoreError>(());
        }
        let matches = target.intersect(&spend.keywords);
        if !matches.is_empty() {
            candidates.push(Candidate { spend, matches });
        }
        Ok(())
    })?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut match_count: HashMap<&str, u32> = HashMap::new();
    for candidate in &candidates {
        for term in candidate.matches.iter() {
            *match_count.entry(term).or_default() += 1;
        }
    }

    let scores: Vec<f64> = candidates
        .iter()
        .map(|candidate| {
            let weight: f64 = candidate
                .matches
                .iter()
                .map(|term| 1.0 / f64::from(match_count[term]))
                .sum();
            weight * candidate.matches.len() as f64 / candidate.spend.keywords.len() as f64
        })
        .collect();
    let min_score = scores.iter().copied().fold(f64::INFINITY, f64::min);

    let balances = BalanceView::open(txn)?;
    let mut bids = Vec::with_capacity(candidates.len());
    for (candidate, score) in candidates.into_iter().zip(scores) {
        let discount = min_score / score;
        let mut max_bid = candidate.spend.max_bid;
        if !is_pseudo(&candidate.spend.owner) {
            max_bid = max_bid.min(balances.balance(&candidate.spend.owner)?);
        }
        if !max_bid.is_positive() {
            debug!(
                owner = %candidate.spend.owner,
                creative = %candidate.spend.creative,
                "candidate cannot pay"
            );
            continue;
        }
        let effective_bid = Cents::from_f64_rounded(max_bid.as_f64() / discount);
        debug!(
            owner = %candidate.spend.owner,
            creative = %candidate.spend.creative,
            score,
            discount,
            max_bid = max_bid.get(),
            effective_bid = effective_bid.get(),
            floor = floor.get(),
            "candidate scored"
        );
        if effective_bid < floor {
            continue;
        }
        bids.push(Bid {
            spend: candidate.spend,
            matches: candidate.matches,
            score,
            discount,
            max_bid,
            effective_bid,
        });
    }
    Ok(bids)
}

/// Pick the winner and its price. Ties on effective bid go to the bid that
/// came first in index order.
pub fn clear(mut bids: Vec<Bid>, floor: Cents) -> Option<(Bid, Cents)> {
    match bids.len() {
        0 => None,
        1 => bids.pop().map(|bid| (bid, floor)),
        _ => {
            // Stable sort keeps index order among equal effective bids.
            bids.sort_by(|a, b| b.effective_bid.cmp(&a.effective_bid));
            let runner_up = bids[1].effective_bid;
            let winner = bids.swap_remove(0);
            let price = Cents::from_f64_rounded((runner_up.as_f64() + 1.0) * winner.discount)
                .min(winner.max_bid);
            Some((winner, price))
        }
    }
}

/// Run the auction for `message` against `floor` in one read transaction.
pub fn select(store: &Store, message: &str, floor: Cents) -> Result<Option<Selection>, StoreError> {
    let target = WordSet::parse(message);
    if target.is_empty() {
        return Ok(None);
    }

    store.read(|txn| {
        let bids = collect_bids(txn, &target, floor)?;
        let candidates = bids.len();
        let Some((winner, price)) = clear(bids, floor) else {
            return Ok(None);
        };

        let creative = match lookup_creative(txn, &winner.spend.owner, &winner.spend.creative)? {
            Some(creative) => creative,
            None => {
                warn!(
                    owner = %winner.spend.owner,
                    creative = %winner.spend.creative,
                    "winning spend references a missing creative"
                );
                Creative::fallback()
            }
        };

        info!(
            winner = %winner.spend.owner,
            creative = %winner.spend.creative,
            price = price.get(),
            floor = floor.get(),
            candidates,
            "auction cleared"
        );
        Ok(Some(Selection {
            winner: creative.owner.clone(),
            creative,
            bidder: winner.spend.owner,
            spend_creative: winner.spend.creative,
            price,
            floor,
            discount: winner.discount,
            effective_bid: winner.effective_bid,
            candidates,
        }))
    })
}

/// Charge `winner` for a delivered ad and update metrics, in one write
/// transaction. House ads are recorded but not charged.
pub fn bill(
    store: &Store,
    room: &str,
    winner: &str,
    price: Cents,
    creative: &str,
    impressions: u64,
) -> Result<BillReceipt, LedgerError> {
    let memo = format!("ad {creative} in {room} ({impressions} impressions)");
    let balance = store.write(|txn| {
        let balance = if winner == HOUSE {
            None
        } else {
            let mut books = Books::open(txn)?;
            let (paid, _) = books.transfer(price, winner, SYSTEM, &memo, true)?;
            Some(paid)
        };
        let mut metrics = open_write(txn, METRICS)?;
        record_delivery(&mut metrics, winner, impressions, price)?;
        Ok::<_, LedgerError>(balance)
    })?;
    info!(
        room,
        winner,
        creative,
        price = price.get(),
        impressions,
        "impression billed"
    );
    Ok(BillReceipt {
        winner: winner.to_string(),
        price,
        impressions,
        balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{upsert_creative, upsert_spend};
    use crate::ledger::{get_balance, ledger, transfer};
    use crate::overrides::{set_account_enabled, set_spend_enabled};
    use crate::scoreboard::load_metrics;

    fn funded(accounts: &[(&str, i64)]) -> Store {
        let store = Store::in_memory().unwrap();
        for (account, amount) in accounts {
            transfer(&store, Cents(*amount), HOUSE, account, "seed", false).unwrap();
        }
        store
    }

    fn ad(store: &Store, owner: &str, name: &str, keywords: &str, max_bid: i64) {
        upsert_creative(store, owner, name, &format!("{owner} {name}")).unwrap();
        upsert_spend(store, owner, name, keywords, Cents(max_bid)).unwrap();
    }

    #[test]
    fn no_match_no_ad() {
        let store = funded(&[("alice", 1_000)]);
        ad(&store, "alice", "shoes", "shoes", 500);
        assert!(select(&store, "hats for sale", Cents(100)).unwrap().is_none());
        assert!(select(&store, "", Cents(0)).unwrap().is_none());
    }

    #[test]
    fn sole_candidate_pays_floor() {
        let store = funded(&[("alice", 1_000)]);
        ad(&store, "alice", "shoes", "shoes", 500);
        let sel = select(&store, "I need new shoes", Cents(100)).unwrap().unwrap();
        assert_eq!(sel.winner, "alice");
        assert_eq!(sel.price, Cents(100));
        assert_eq!(sel.creative.content, "alice shoes");
        assert_eq!(sel.candidates, 1);
    }

    #[test]
    fn second_price_with_equal_discounts() {
        let store = funded(&[("alice", 1_000), ("bob", 1_000)]);
        ad(&store, "alice", "shoes", "shoes", 500);
        ad(&store, "bob", "shoes", "shoes", 800);
        let sel = select(&store, "shoes", Cents(100)).unwrap().unwrap();
        assert_eq!(sel.winner, "bob");
        assert_eq!(sel.discount, 1.0);
        assert_eq!(sel.price, Cents(501));
    }

    #[test]
    fn broad_keywords_are_discounted() {
        let store = funded(&[("alice", 10_000), ("bob", 10_000)]);
        // Alice targets one term precisely; Bob targets four.
        ad(&store, "alice", "shoes", "shoes", 400);
        ad(&store, "bob", "stuff", "shoes hats coats socks", 400);
        let bids = store
            .read(|txn| collect_bids(txn, &WordSet::parse("shoes"), Cents(0)))
            .unwrap();
        let alice = bids.iter().find(|b| b.spend.owner == "alice").unwrap();
        let bob = bids.iter().find(|b| b.spend.owner == "bob").unwrap();
        assert_eq!(bob.discount, 1.0);
        assert_eq!(bob.effective_bid, Cents(400));
        assert_eq!(alice.discount, 0.25);
        assert_eq!(alice.effective_bid, Cents(1_600));

        let sel = select(&store, "shoes", Cents(0)).unwrap().unwrap();
        assert_eq!(sel.winner, "alice");
        // (400 + 1) * 0.25, rounded.
        assert_eq!(sel.price, Cents(100));
    }

    #[test]
    fn price_is_capped_at_winner_max_bid() {
        let store = funded(&[("alice", 1_000), ("bob", 1_000)]);
        ad(&store, "alice", "a", "shoes", 300);
        ad(&store, "bob", "b", "shoes", 300);
        let sel = select(&store, "shoes", Cents(0)).unwrap().unwrap();
        // Tie goes to the earlier index key, and 301 is capped at 300.
        assert_eq!(sel.winner, "alice");
        assert_eq!(sel.price, Cents(300));
    }

    #[test]
    fn max_bid_is_clamped_to_balance() {
        let store = funded(&[("alice", 50), ("bob", 1_000)]);
        ad(&store, "alice", "a", "shoes", 5_000);
        ad(&store, "bob", "b", "shoes", 200);
        let sel = select(&store, "shoes", Cents(0)).unwrap().unwrap();
        assert_eq!(sel.winner, "bob");
        assert_eq!(sel.price, Cents(51));
    }

    #[test]
    fn broke_advertisers_are_dropped_but_house_is_not() {
        let store = funded(&[]);
        ad(&store, "alice", "a", "shoes", 500);
        ad(&store, HOUSE, "promo", "shoes", 10);
        let sel = select(&store, "shoes", Cents(5)).unwrap().unwrap();
        assert_eq!(sel.winner, HOUSE);
        assert_eq!(sel.candidates, 1);
    }

    #[test]
    fn floor_filters_candidates() {
        let store = funded(&[("alice", 1_000)]);
        ad(&store, "alice", "a", "shoes", 99);
        assert!(select(&store, "shoes", Cents(100)).unwrap().is_none());
    }

    #[test]
    fn disabled_spends_never_win() {
        let store = funded(&[("alice", 1_000), ("bob", 1_000)]);
        ad(&store, "alice", "a", "shoes", 900);
        ad(&store, "bob", "b", "shoes", 100);

        set_spend_enabled(&store, "alice", "a", false).unwrap();
        assert_eq!(select(&store, "shoes", Cents(0)).unwrap().unwrap().winner, "bob");

        set_spend_enabled(&store, "alice", "a", true).unwrap();
        set_account_enabled(&store, "alice", false).unwrap();
        assert_eq!(select(&store, "shoes", Cents(0)).unwrap().unwrap().winner, "bob");
    }

    #[test]
    fn missing_creative_falls_back_to_house_text() {
        let store = funded(&[("alice", 1_000)]);
        upsert_spend(&store, "alice", "ghost", "shoes", Cents(100)).unwrap();
        let sel = select(&store, "shoes", Cents(10)).unwrap().unwrap();
        assert_eq!(sel.winner, HOUSE);
        assert_eq!(sel.bidder, "alice");
        assert_eq!(sel.creative, Creative::fallback());
        assert_eq!(sel.spend_creative, "ghost");
    }

    #[test]
    fn selection_has_no_side_effects() {
        let store = funded(&[("alice", 1_000)]);
        ad(&store, "alice", "a", "shoes", 500);
        select(&store, "shoes", Cents(100)).unwrap();
        assert_eq!(get_balance(&store, "alice").unwrap(), Cents(1_000));
        assert_eq!(load_metrics(&store, "alice").unwrap().ads_displayed, 0);
    }

    #[test]
    fn billing_charges_winner_and_counts() {
        let store = funded(&[("alice", 1_000)]);
        let receipt = bill(&store, "lobby", "alice", Cents(150), "shoes", 7).unwrap();
        assert_eq!(receipt.balance, Some(Cents(850)));
        assert_eq!(get_balance(&store, SYSTEM).unwrap(), Cents(150));
        let entries = ledger(&store, "alice", 1).unwrap();
        assert_eq!(entries[0].to, SYSTEM);
        assert!(entries[0].memo.contains("lobby"));

        let metrics = load_metrics(&store, "alice").unwrap();
        assert_eq!((metrics.ads_displayed, metrics.impressions), (1, 7));
        assert_eq!(load_metrics(&store, SYSTEM).unwrap().amount_spent, Cents(150));
    }

    #[test]
    fn billing_house_moves_no_money() {
        let store = funded(&[]);
        let receipt = bill(&store, "lobby", HOUSE, Cents(40), "promo", 3).unwrap();
        assert_eq!(receipt.balance, None);
        assert_eq!(get_balance(&store, HOUSE).unwrap(), Cents::ZERO);
        assert_eq!(
            load_metrics(&store, SYSTEM).unwrap().amount_spent_by_house,
            Cents(40)
        );
    }

    #[test]
    fn clear_with_no_bids_is_none() {
        assert!(clear(Vec::new(), Cents(1)).is_none());
    }
}
