//! Property tests over arbitrary send/connect/clear interleavings.

use proptest::prelude::*;
use xdcmesh_core::{Serial, SubmittedUpdate};
use xdcmesh_sim::{GeneratorConfig, ScenarioRunner, random_scenario};

use crate::common::{connect, recorded_processor};

const IDS: [&str; 3] = ["3001", "3002", "3003"];

proptest! {
    /// Every connected instance sees serials 1, 2, 3, ... no matter who sent.
    #[test]
    fn prop_serials_are_global(senders in prop::collection::vec(0usize..IDS.len(), 1..40)) {
        let (mut processor, _recorder) = recorded_processor();
        let mailboxes: Vec<_> = IDS.iter().map(|id| connect(&mut processor, id, 0)).collect();

        for (n, sender) in senders.iter().enumerate() {
            let update = processor
                .client(IDS[*sender])
                .unwrap()
                .send_update(SubmittedUpdate::new(n as u64), "")
                .unwrap();
            prop_assert_eq!(update.serial, n as Serial + 1);
        }

        let expected: Vec<Serial> = (1..=senders.len() as Serial).collect();
        for mailbox in &mailboxes {
            prop_assert_eq!(mailbox.serials(), expected.clone());
        }
    }

    /// Connecting at cursor `s` yields exactly the serials above `s`, all
    /// stamped with the log length.
    #[test]
    fn prop_catch_up_is_exact(total in 0u64..30, cursor_seed in 0u64..31) {
        let cursor = cursor_seed.min(total);
        let (mut processor, _recorder) = recorded_processor();
        processor.create_client("writer").unwrap();
        for n in 0..total {
            processor
                .client("writer")
                .unwrap()
                .send_update(SubmittedUpdate::new(n), "")
                .unwrap();
        }

        let reader = connect(&mut processor, "reader", cursor);

        prop_assert_eq!(reader.batches().len(), 1);
        let expected: Vec<(Serial, Serial)> =
            ((cursor + 1)..=total).map(|serial| (serial, total)).collect();
        prop_assert_eq!(reader.stamps(), expected);
    }

    /// A client is cleared exactly once per epoch however often it connects.
    #[test]
    fn prop_one_clear_per_epoch(ops in prop::collection::vec(any::<bool>(), 1..30)) {
        let (mut processor, _recorder) = recorded_processor();
        let mailbox = connect(&mut processor, "3001", 0);

        for clear in &ops {
            if *clear {
                processor.clear();
            } else {
                crate::common::reconnect(&mut processor, "3001", &mailbox, 0);
            }
        }

        let clears = ops.iter().filter(|clear| **clear).count();
        prop_assert_eq!(mailbox.clears(), clears + 1);
        prop_assert_eq!(processor.epoch(), clears as u64);
    }

    /// Generated scenarios never trip an invariant.
    #[test]
    fn prop_random_scenarios_hold(seed in any::<u64>(), instances in 1usize..6) {
        let scenario = random_scenario(GeneratorConfig { seed, instances, steps: 80 });
        let report = ScenarioRunner::new().run(&scenario).unwrap();

        prop_assert!(report.is_success(), "{}", report.summary());
        prop_assert!(report.rejected.is_empty(), "{}", report.summary());
    }
}
