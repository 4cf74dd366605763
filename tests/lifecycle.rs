use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use solana_position_engine::config::EngineSettings;
use solana_position_engine::position::PumpPhase;
use solana_position_engine::risk::BotMode;
use solana_position_engine::{Decision, EntryError, EntryRequest, PositionManager, ReasonTag, Tick};

const DAY_MS: i64 = 86_400_000;

fn entry(token: &str, tokens: f64, usd: f64) -> EntryRequest {
    EntryRequest {
        token_id: token.into(),
        entry_price: 1.0,
        token_amount: tokens,
        usd_amount: usd,
        confidence: None,
        timestamp_ms: 0,
    }
}

fn tick(token: &str, price: f64, volume: f64, ts: i64) -> Tick {
    Tick {
        token_id: token.into(),
        price,
        volume,
        timestamp_ms: ts,
    }
}

fn manager() -> PositionManager {
    PositionManager::new(EngineSettings::default()).unwrap()
}

#[test]
fn pullback_after_run_exits_on_stop() {
    let mut m = manager();
    m.open(&entry("T", 1000.0, 1000.0)).unwrap();

    // volume grows geometrically so the 5-vs-5 window trend holds at +20%
    let growth = 1.2_f64.powf(0.2);
    let volume = |k: usize| 100.0 * growth.powi(k as i32);
    for k in 0..10 {
        let out = m.on_tick_with_momentum(&tick("T", 1.0, volume(k), k as i64 + 1), 50.0);
        assert!(out.is_empty(), "warm-up tick {k}: {out:?}");
    }

    let path = [(1.05, 50.0), (1.10, 45.0), (1.00, 30.0), (0.80, 10.0), (0.70, 10.0)];
    let mut exit = None;
    for (i, (price, momentum)) in path.into_iter().enumerate() {
        let out = m.on_tick_with_momentum(&tick("T", price, volume(10 + i), 11 + i as i64), momentum);
        if let Some(d) = out.into_iter().find(Decision::is_full_exit) {
            exit = Some((i + 1, d));
            break;
        }
    }

    let (at, decision) = exit.expect("position should exit");
    assert!(at <= 5);
    assert_eq!(
        decision,
        Decision::FullExit {
            token_id: "T".into(),
            reason_tag: ReasonTag::StopBreach
        }
    );
    let closed = m.closed_position("T").unwrap();
    assert_eq!(closed.highest_price(), 1.10);
    assert_eq!(m.open_count(), 0);
}

#[test]
fn quiet_base_then_breakout_climbs_the_phase_ladder() {
    let mut m = manager();
    m.open(&entry("P", 1000.0, 1000.0)).unwrap();

    // heavy volume that then dries up while price sits under entry
    let mut feed: Vec<(f64, f64, f64)> = Vec::new();
    feed.extend(std::iter::repeat((0.95, 1000.0, 25.0)).take(5));
    feed.extend(std::iter::repeat((0.95, 10.0, 25.0)).take(10));
    // breakout on building volume
    feed.extend([(1.06, 40.0, 60.0), (1.10, 60.0, 62.0), (1.18, 100.0, 65.0)]);

    let mut scale_ups = Vec::new();
    for (i, (price, volume, momentum)) in feed.into_iter().enumerate() {
        let n = i + 1;
        for d in m.on_tick_with_momentum(&tick("P", price, volume, n as i64), momentum) {
            match d {
                Decision::ScaleUp { new_amount, .. } => scale_ups.push((n, new_amount)),
                other => panic!("unexpected decision at tick {n}: {other:?}"),
            }
        }
    }

    let ticks: Vec<usize> = scale_ups.iter().map(|(n, _)| *n).collect();
    assert_eq!(ticks, vec![13, 16, 18]);
    let amounts: Vec<f64> = scale_ups.iter().map(|(_, a)| *a).collect();
    for (got, want) in amounts.iter().zip([1300.0, 1690.0, 2366.0]) {
        assert!((got - want).abs() < 1e-6, "{got} != {want}");
    }

    let p = m.position("P").unwrap();
    assert_eq!(p.pump_phase, PumpPhase::Acceleration);
    assert!(p.trailing_stop() < 1.18);
    assert!(p.usd_amount() > 1000.0);
}

#[test]
fn climax_after_the_ladder_is_sold_down_in_fomo_tiers() {
    let mut m = manager();
    m.open(&entry("F", 1000.0, 1000.0)).unwrap();

    let mut feed: Vec<(f64, f64, f64)> = Vec::new();
    feed.extend(std::iter::repeat((0.95, 1000.0, 25.0)).take(5));
    feed.extend(std::iter::repeat((0.95, 10.0, 25.0)).take(10));
    feed.extend([(1.06, 40.0, 60.0), (1.10, 60.0, 62.0), (1.18, 100.0, 65.0)]);
    for (i, (price, volume, momentum)) in feed.into_iter().enumerate() {
        m.on_tick_with_momentum(&tick("F", price, volume, i as i64 + 1), momentum);
    }
    assert_eq!(m.position("F").unwrap().pump_phase, PumpPhase::Acceleration);

    // volume climaxes well past +25% profit; FOMO tiers sell first
    let climax = [(1.6, 400.0, 85.0, 473.2), (1.7, 1500.0, 88.0, 567.84)];
    for (i, (price, volume, momentum, sold)) in climax.into_iter().enumerate() {
        let out = m.on_tick_with_momentum(&tick("F", price, volume, 19 + i as i64), momentum);
        assert_eq!(out.len(), 1, "{out:?}");
        match &out[0] {
            Decision::PartialExit {
                amount_reduced,
                reason_tag: ReasonTag::FomoTake,
                ..
            } => assert!((amount_reduced - sold).abs() < 1e-6, "{amount_reduced} != {sold}"),
            other => panic!("expected a FOMO take, got {other:?}"),
        }
    }

    let p = m.position("F").expect("still open after FOMO takes");
    assert!(p.profit_taking().level1);
    assert!(p.profit_taking().level2);
    assert!(!p.profit_taking().level3);
    assert!((p.token_amount() - 1324.96).abs() < 1e-6);
}

#[test]
fn daily_loss_blocks_entries_until_next_day() {
    let mut m = manager();
    m.open(&entry("A", 100.0, 100.0)).unwrap();
    m.open(&entry("C", 10.0, 10.0)).unwrap();

    // A crashes through its stop: -50 on day one, over the 30 daily limit
    let out = m.on_tick(&tick("A", 0.5, 10.0, 1));
    assert!(out.iter().any(Decision::is_full_exit));
    assert_eq!(m.guard().mode, BotMode::ReadOnly);
    assert_eq!(
        m.open(&entry("B", 10.0, 10.0)),
        Err(EntryError::Blocked(BotMode::ReadOnly))
    );

    // a small loss booked the next day resets the daily tally
    let out = m.on_tick(&tick("C", 0.5, 10.0, DAY_MS + 1));
    assert!(out.iter().any(Decision::is_full_exit));
    assert_eq!(m.guard().mode, BotMode::Trading);
    assert!((m.guard().current_balance_usd - 945.0).abs() < 1e-9);
    assert!(m.open(&entry("B", 10.0, 10.0)).is_ok());
    let open: Vec<&str> = m.positions().map(|p| p.token_id.as_str()).collect();
    assert_eq!(open, vec!["B"]);
}

#[test]
fn hard_stop_is_sticky() {
    let mut m = manager();
    m.open(&entry("A", 1000.0, 1000.0)).unwrap();
    m.on_tick(&tick("A", 0.5, 10.0, 1));
    assert_eq!(m.guard().mode, BotMode::EmergencyStop);
    assert_eq!(
        m.open(&entry("B", 10.0, 10.0)),
        Err(EntryError::Blocked(BotMode::EmergencyStop))
    );
}

#[test]
fn random_walks_keep_position_invariants() {
    for seed in 0..40u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut m = manager();
        m.open(&entry("R", 1000.0, 1000.0)).unwrap();

        let mut price = 1.0_f64;
        for n in 1..=300i64 {
            price *= 1.0 + rng.gen_range(-0.06..0.08);
            let volume = rng.gen_range(0.0..5_000.0);
            let momentum = rng.gen_range(0.0..100.0);

            let Some(before) = m.position("R").cloned() else {
                break;
            };
            let out = m.on_tick_with_momentum(&tick("R", price, volume, n), momentum);
            let scaled = out.iter().any(|d| matches!(d, Decision::ScaleUp { .. }));

            let Some(after) = m.position("R") else {
                assert!(out.iter().any(Decision::is_full_exit), "seed {seed} tick {n}");
                assert!(m.closed_position("R").unwrap().is_closed());
                break;
            };

            assert!(after.highest_price() >= before.highest_price());
            assert!(after.highest_price() >= price);
            assert!(after.trailing_stop() >= before.trailing_stop());
            if price > before.highest_price() {
                assert!(after.trailing_stop() < price, "seed {seed} tick {n}");
            }
            assert!(after.pump_phase >= before.pump_phase);
            for (was, now) in [
                (before.profit_taking().level1, after.profit_taking().level1),
                (before.profit_taking().level2, after.profit_taking().level2),
                (before.profit_taking().level3, after.profit_taking().level3),
            ] {
                assert!(!was || now);
            }
            if !scaled {
                assert!(after.token_amount() <= before.token_amount());
            }
            assert!(!out.iter().any(Decision::is_full_exit));
        }
    }
}
