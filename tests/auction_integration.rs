//! End-to-end auctions through the `Adbot` facade.

use adbot::{Adbot, Cents, HOUSE, Store, SYSTEM};

fn bot() -> Adbot {
    // Fixed floor so prices are easy to reason about.
    Adbot::new(Store::in_memory().unwrap(), |_: u64, _: u64| Cents(100))
}

fn advertise(bot: &Adbot, owner: &str, creative: &str, keywords: &str, max_bid: i64) {
    bot.upsert_creative(owner, creative, &format!("{owner} sells {creative}"))
        .unwrap();
    bot.upsert_spend(owner, creative, keywords, Cents(max_bid))
        .unwrap();
}

#[test]
fn documented_two_bidder_example() {
    let bot = bot();
    bot.credit("a", Cents(10_000), "seed").unwrap();
    bot.credit("b", Cents(10_000), "seed").unwrap();

    advertise(&bot, "a", "shoes", "shoes", 500);
    let sel = bot.evaluate("shoes", 5, 0).unwrap().unwrap();
    assert_eq!(sel.winner, "a");
    assert_eq!(sel.price, Cents(100));

    advertise(&bot, "b", "shoes", "shoes", 800);
    let sel = bot.evaluate("shoes", 5, 0).unwrap().unwrap();
    assert_eq!(sel.winner, "b");
    assert_eq!(sel.price, Cents(501));
}

#[test]
fn evaluate_writes_nothing_until_delivery() {
    let bot = bot();
    bot.credit("a", Cents(1_000), "seed").unwrap();
    advertise(&bot, "a", "coffee", "coffee espresso", 300);

    let sel = bot.evaluate("fresh coffee here", 7, 0).unwrap().unwrap();
    assert_eq!(bot.balance("a").unwrap(), Cents(1_000));
    assert_eq!(bot.metrics("a").unwrap().impressions, 0);

    let receipt = bot.record_impression("lobby", &sel, 7).unwrap();
    assert_eq!(receipt.balance, Some(Cents(900)));
    assert_eq!(bot.balance(SYSTEM).unwrap(), Cents(100));

    let metrics = bot.metrics("a").unwrap();
    assert_eq!(metrics.ads_displayed, 1);
    assert_eq!(metrics.impressions, 7);
    assert_eq!(metrics.amount_spent, Cents(100));

    let entry = bot.ledger_entries("a", 1).unwrap().pop().unwrap();
    assert_eq!(entry.to, SYSTEM);
    assert_eq!(entry.memo, "ad coffee in lobby (7 impressions)");
}

#[test]
fn overrides_remove_candidates() {
    let bot = bot();
    bot.credit("a", Cents(1_000), "seed").unwrap();
    bot.credit("b", Cents(1_000), "seed").unwrap();
    advertise(&bot, "a", "tea", "tea", 500);
    advertise(&bot, "b", "tea", "tea", 400);

    bot.set_account_enabled("a", false).unwrap();
    assert_eq!(bot.evaluate("tea", 1, 0).unwrap().unwrap().winner, "b");

    // A spend-level enable does not beat an account-level disable.
    bot.set_spend_enabled("a", "tea", true).unwrap();
    assert_eq!(bot.evaluate("tea", 1, 0).unwrap().unwrap().winner, "b");

    bot.set_account_enabled("a", true).unwrap();
    bot.set_spend_enabled("b", "tea", false).unwrap();
    assert_eq!(bot.evaluate("tea", 1, 0).unwrap().unwrap().winner, "a");
}

#[test]
fn deleted_spend_stops_matching() {
    let bot = bot();
    bot.credit("a", Cents(1_000), "seed").unwrap();
    advertise(&bot, "a", "chess", "chess puzzle", 500);
    assert!(bot.evaluate("chess tonight?", 1, 0).unwrap().is_some());

    assert!(bot.delete_spend("a", "chess").unwrap());
    assert!(bot.evaluate("chess tonight?", 1, 0).unwrap().is_none());
    assert!(bot.spends("a").unwrap().is_empty());
}

#[test]
fn unfunded_advertisers_never_win() {
    let bot = bot();
    advertise(&bot, "broke", "lens", "camera lens", 900);
    assert!(bot.evaluate("camera", 1, 0).unwrap().is_none());

    bot.credit("broke", Cents(50), "seed").unwrap();
    // Clamped to 50, which is under the floor of 100.
    assert!(bot.evaluate("camera", 1, 0).unwrap().is_none());
}

#[test]
fn house_ads_fill_inventory_for_free() {
    let bot = bot();
    advertise(&bot, HOUSE, "promo", "guitar piano", 200);

    let sel = bot.evaluate("who plays guitar", 4, 0).unwrap().unwrap();
    assert_eq!(sel.winner, HOUSE);
    let receipt = bot.record_impression("music", &sel, 4).unwrap();
    assert_eq!(receipt.balance, None);
    assert_eq!(bot.balance(HOUSE).unwrap(), Cents::ZERO);

    let system = bot.metrics(SYSTEM).unwrap();
    assert_eq!(system.amount_spent_by_house, Cents(100));
    assert_eq!(system.revenue(), Cents::ZERO);
}

#[test]
fn missing_creative_falls_back_to_house() {
    let bot = bot();
    bot.credit("a", Cents(1_000), "seed").unwrap();
    advertise(&bot, "a", "kettle", "kettle", 500);
    assert!(bot.delete_creative("a", "kettle").unwrap());

    let sel = bot.evaluate("kettle", 1, 0).unwrap().unwrap();
    assert_eq!(sel.bidder, "a");
    assert_eq!(sel.winner, HOUSE);
    assert_eq!(sel.creative.content, "404 ad not found");

    bot.record_impression("kitchen", &sel, 1).unwrap();
    assert_eq!(bot.balance("a").unwrap(), Cents(1_000));
}

#[test]
fn scoreboard_ranks_by_impressions_then_spend() {
    let bot = bot();
    for account in ["a", "b", "c"] {
        bot.credit(account, Cents(10_000), "seed").unwrap();
        bot.set_nick(account, &account.to_uppercase()).unwrap();
    }
    advertise(&bot, "a", "x", "apple", 500);
    advertise(&bot, "b", "x", "banana", 500);
    advertise(&bot, "c", "x", "cherry", 500);

    let sel = bot.evaluate("apple", 1, 0).unwrap().unwrap();
    bot.record_impression("r", &sel, 10).unwrap();
    let mut sel = bot.evaluate("banana", 1, 0).unwrap().unwrap();
    sel.price = Cents(300);
    bot.record_impression("r", &sel, 10).unwrap();
    let sel = bot.evaluate("cherry", 1, 0).unwrap().unwrap();
    bot.record_impression("r", &sel, 20).unwrap();

    let board = bot.scoreboard().unwrap();
    let order: Vec<&str> = board.iter().map(|e| e.account.as_str()).collect();
    assert_eq!(order, vec!["c", "b", "a"]);
    assert_eq!(board[0].nick, "C");
    assert!(board.iter().all(|e| e.account != SYSTEM && e.account != HOUSE));
}

#[test]
fn reset_campaigns_keeps_balances() {
    let bot = bot();
    bot.credit("a", Cents(1_000), "seed").unwrap();
    advertise(&bot, "a", "bike", "bicycle helmet", 500);
    bot.reset_campaigns().unwrap();

    assert!(bot.creatives("a").unwrap().is_empty());
    assert!(bot.evaluate("bicycle", 1, 0).unwrap().is_none());
    assert_eq!(bot.balance("a").unwrap(), Cents(1_000));
}
