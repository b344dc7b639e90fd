//! Property-based tests for the live buffer counter.

use proptest::prelude::*;
use reco_core::recovery::LiveBufferCounter;

// ── Strategies ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Event {
    Add,
    Unload,
}

fn arb_events(max: usize) -> impl Strategy<Value = Vec<Event>> {
    proptest::collection::vec(prop_oneof![Just(Event::Add), Just(Event::Unload)], 0..max)
}

fn apply(counter: &mut LiveBufferCounter, events: &[Event]) {
    for event in events {
        match event {
            Event::Add => counter.increment(),
            Event::Unload => counter.decrement(),
        }
    }
}

// ── Invariants ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Events before arming leave no trace once armed.
    #[test]
    fn startup_events_do_not_perturb(before in arb_events(32), start in 0usize..16) {
        let mut counter = LiveBufferCounter::new();
        apply(&mut counter, &before);
        counter.arm(start);
        prop_assert_eq!(counter.count(), start);
    }

    /// Every add/unload pair returns the counter to where it was.
    #[test]
    fn add_unload_pairs_balance(start in 0usize..16, pairs in 0usize..32) {
        let mut counter = LiveBufferCounter::new();
        counter.arm(start);
        for _ in 0..pairs {
            counter.increment();
            counter.decrement();
        }
        prop_assert_eq!(counter.count(), start);
    }

    /// Matches a saturating reference model and never goes negative.
    #[test]
    fn tracks_saturating_model(start in 0usize..8, events in arb_events(64)) {
        let mut counter = LiveBufferCounter::new();
        counter.arm(start);
        let mut model = start;
        for event in &events {
            match event {
                Event::Add => {
                    counter.increment();
                    model += 1;
                }
                Event::Unload => {
                    counter.decrement();
                    model = model.saturating_sub(1);
                }
            }
            prop_assert_eq!(counter.count(), model);
            prop_assert_eq!(counter.allows_cleanup(), model == 0);
        }
    }
}
