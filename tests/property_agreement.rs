//! Property-based check that agreement and integrity survive arbitrary
//! reordering of the normal-case message flow.
//!
//! Each case runs the same single-instance, single-round happy path (no
//! faults, no timeouts) but shuffles the delivery order within every
//! broadcast wave using a seed supplied by `proptest`. Every participant's
//! [`message_log`](ibft_core::MessageLog) is built to be order-independent
//! (quorum counting is a set, not a sequence), so whichever participants
//! decide must still agree with each other and with the value actually
//! proposed, regardless of the order messages arrived in.

use {
    ibft_core::{BftConfig, DecisionSink, Message, Participant, ParticipantSet, RejectEmpty},
    proptest::prelude::*,
    solana_keypair::Keypair,
    solana_signer::Signer,
    std::sync::{Arc, Mutex},
};

type Node = Participant<RejectEmpty, RecordingSink>;

#[derive(Clone, Default)]
struct RecordingSink(Arc<Mutex<Vec<(u64, Vec<u8>)>>>);

impl DecisionSink for RecordingSink {
    fn on_decision(&mut self, sequence: u64, value: Vec<u8>) {
        self.0.lock().unwrap().push((sequence, value));
    }
}

/// A small, deterministic xorshift64 shuffle, seeded per-wave by a value
/// `proptest` controls. Not a security-grade shuffle; good enough to
/// decorrelate delivery order from construction order across cases.
fn shuffle_seeded<T>(items: &mut [T], seed: u64) {
    let mut state = seed | 1;
    for i in (1..items.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state as usize) % (i + 1);
        items.swap(i, j);
    }
}

fn make_network(n: usize) -> (ParticipantSet, Vec<Node>, Vec<RecordingSink>) {
    let keypairs: Vec<Keypair> = (0..n).map(|_| Keypair::new()).collect();
    let participants = ParticipantSet::new(keypairs.iter().map(|k| k.pubkey()).collect());
    let config = BftConfig::new(n as u32, (n as u32 - 1) / 3);
    let sinks: Vec<RecordingSink> = (0..n).map(|_| RecordingSink::default()).collect();
    let nodes: Vec<Node> = (0..n)
        .map(|i| {
            Participant::new(
                config,
                i as u32,
                Keypair::from_bytes(&keypairs[i].to_bytes()).unwrap(),
                participants.clone(),
                RejectEmpty,
                sinks[i].clone(),
            )
        })
        .collect();
    (participants, nodes, sinks)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Agreement (P1) and integrity (P3): in a fault-free, timeout-free run,
    /// every participant that decides must decide the value that was
    /// actually proposed, no matter what order the four participants'
    /// messages reach each other in.
    #[test]
    fn agreement_and_integrity_hold_under_reordering(
        seeds in prop::collection::vec(any::<u64>(), 4..12),
        value in prop::collection::vec(any::<u8>(), 1..16),
    ) {
        let (_participants, mut nodes, sinks) = make_network(4);

        let mut inflight = nodes[0].propose(value.clone());
        let mut wave = 0usize;
        for _ in 0..40 {
            if inflight.is_empty() {
                break;
            }
            shuffle_seeded(&mut inflight, seeds[wave % seeds.len()]);
            wave += 1;

            let mut next: Vec<Message> = Vec::new();
            for msg in inflight.drain(..) {
                let mut order: Vec<usize> = (0..nodes.len()).collect();
                shuffle_seeded(&mut order, seeds[wave % seeds.len()].wrapping_add(msg.sender as u64));
                for i in order {
                    next.extend(nodes[i].deliver(msg.clone()).outbound);
                }
            }
            inflight = next;
        }

        let mut decided_values = Vec::new();
        for sink in &sinks {
            let recorded = sink.0.lock().unwrap();
            if let Some((sequence, decided_value)) = recorded.first() {
                prop_assert_eq!(*sequence, 0);
                prop_assert_eq!(decided_value, &value, "integrity: decided value must be the proposed one");
                decided_values.push(decided_value.clone());
            }
        }
        for pair in decided_values.windows(2) {
            prop_assert_eq!(&pair[0], &pair[1], "agreement: all deciders must agree");
        }
        // No faults or timeouts were injected, so reordering alone must not
        // prevent eventual decision within the wave budget above.
        prop_assert_eq!(decided_values.len(), nodes.len(), "liveness: every participant should still decide");
    }
}
