use super::*;
use crate::adapters::{GenesisSlotClock, InMemoryDecidedStore, InMemoryEventBus, DEFAULT_SLOT_DURATION};
use crate::ports::SlotClock;
use crate::roundtimer::TimeoutOptions;
use crate::test_utils::TestCommittee;
use shared_types::RunnerRole;
use std::time::SystemTime;

const INPUT: &[u8] = b"attestation-data";
const OTHER: &[u8] = b"other-data";

struct Harness {
    committee: TestCommittee,
    instance: Instance,
    queue: Arc<MessageQueue<SignedMessage>>,
    bus: Arc<InMemoryEventBus>,
    store: Arc<InMemoryDecidedStore>,
}

impl Harness {
    fn new(operator_id: OperatorId) -> Self {
        let committee = TestCommittee::new(4, RunnerRole::Attester);
        let (deps, bus, store) = committee.dependencies(operator_id);
        let queue = Arc::new(MessageQueue::new(256));
        let clock: Arc<dyn SlotClock> = Arc::new(GenesisSlotClock::new(
            SystemTime::now(),
            DEFAULT_SLOT_DURATION,
        ));
        let (timer, _timeouts) =
            RoundTimer::new(RunnerRole::Attester, clock, TimeoutOptions::default());
        let instance = Instance::new(
            Arc::new(committee.share(operator_id)),
            committee.identifier,
            0,
            deps,
            queue.clone(),
            Arc::new(timer),
        );
        Self {
            committee,
            instance,
            queue,
            bus,
            store,
        }
    }

    fn feed(&self, msgs: impl IntoIterator<Item = SignedMessage>) {
        for msg in msgs {
            self.queue.add_message(msg).unwrap();
        }
    }

    fn drain(&self) -> usize {
        let mut processed = 0;
        while self.instance.process_message().unwrap() {
            processed += 1;
        }
        processed
    }

    fn prepares(&self, ops: &[OperatorId], round: Round, value: &[u8]) -> Vec<SignedMessage> {
        ops.iter()
            .map(|op| self.committee.prepare(*op, 0, round, value))
            .collect()
    }

    fn commits(&self, ops: &[OperatorId], round: Round, value: &[u8]) -> Vec<SignedMessage> {
        ops.iter()
            .map(|op| self.committee.commit(*op, 0, round, value))
            .collect()
    }
}

// =========================================================================
// START
// =========================================================================

#[tokio::test]
async fn test_leader_proposes_on_start() {
    let h = Harness::new(1);
    h.instance.start(INPUT.to_vec()).unwrap();

    let proposals = h.bus.broadcasts_of(MessageType::PrePrepare);
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].value(), INPUT);
    assert_eq!(proposals[0].signers, vec![1]);
    assert_eq!(h.instance.round(), FIRST_ROUND);
    assert_eq!(h.instance.stage(), Stage::NotStarted);
}

#[tokio::test]
async fn test_non_leader_waits_on_start() {
    let h = Harness::new(2);
    h.instance.start(INPUT.to_vec()).unwrap();
    assert!(h.bus.broadcasts().is_empty());
}

#[tokio::test]
async fn test_start_twice_fails() {
    let h = Harness::new(2);
    h.instance.start(INPUT.to_vec()).unwrap();
    assert!(matches!(
        h.instance.start(INPUT.to_vec()),
        Err(QbftError::AlreadyStarted)
    ));
}

#[tokio::test]
async fn test_not_started_processes_nothing() {
    let h = Harness::new(2);
    h.feed([h.committee.pre_prepare(1, 0, 1, INPUT)]);
    assert!(!h.instance.process_message().unwrap());
    assert_eq!(h.queue.len(), 1);
}

// =========================================================================
// HAPPY PATH
// =========================================================================

#[tokio::test]
async fn test_decides_in_first_round() {
    let h = Harness::new(2);
    h.instance.start(INPUT.to_vec()).unwrap();

    h.feed([h.committee.pre_prepare(1, 0, 1, INPUT)]);
    h.feed(h.prepares(&[1, 2, 3], 1, INPUT));
    h.feed(h.commits(&[1, 2, 3], 1, INPUT));
    assert_eq!(h.drain(), 7);

    assert_eq!(h.instance.stage(), Stage::Decided);
    assert_eq!(h.instance.decided_value(), Some(INPUT.to_vec()));
    assert_eq!(h.bus.broadcasts_of(MessageType::Prepare).len(), 1);
    assert_eq!(h.bus.broadcasts_of(MessageType::Commit).len(), 1);

    let decided = h.bus.decided();
    assert_eq!(decided.len(), 1);
    assert_eq!(decided[0].signers, vec![1, 2, 3]);
    assert_eq!(decided[0].round, 1);

    let stored = h
        .store
        .get_decided(&h.committee.identifier, 0)
        .unwrap()
        .unwrap();
    assert_eq!(stored.value, INPUT.to_vec());
}

#[tokio::test]
async fn test_commits_before_prepares_still_decide() {
    let h = Harness::new(2);
    h.instance.start(INPUT.to_vec()).unwrap();

    h.feed(h.commits(&[1, 3, 4], 1, INPUT));
    h.feed([h.committee.pre_prepare(1, 0, 1, INPUT)]);
    h.feed(h.prepares(&[4, 3, 1], 1, INPUT));
    h.drain();

    assert_eq!(h.instance.stage(), Stage::Decided);
}

#[tokio::test]
async fn test_decides_exactly_once() {
    let h = Harness::new(2);
    h.instance.start(INPUT.to_vec()).unwrap();
    h.feed([h.committee.pre_prepare(1, 0, 1, INPUT)]);
    h.feed(h.prepares(&[1, 2, 3, 4], 1, INPUT));
    h.feed(h.commits(&[1, 2, 3, 4], 1, INPUT));
    h.drain();

    assert!(!h.instance.process_message().unwrap());
    h.instance.stop();
    assert_eq!(h.instance.stage(), Stage::Decided);
    assert_eq!(h.bus.decided().len(), 1);
    assert_eq!(h.store.count(), 1);
}

// =========================================================================
// PROTOCOL REJECTIONS
// =========================================================================

#[tokio::test]
async fn test_pre_prepare_from_non_leader_ignored() {
    let h = Harness::new(2);
    h.instance.start(INPUT.to_vec()).unwrap();
    h.feed([h.committee.pre_prepare(3, 0, 1, INPUT)]);

    assert!(h.instance.process_message().unwrap());
    assert_eq!(h.instance.stage(), Stage::NotStarted);
    assert!(h.bus.broadcasts_of(MessageType::Prepare).is_empty());
}

#[tokio::test]
async fn test_first_round_proposal_must_match_input() {
    let h = Harness::new(2);
    h.instance.start(INPUT.to_vec()).unwrap();
    h.feed([h.committee.pre_prepare(1, 0, 1, OTHER)]);
    h.drain();
    assert_eq!(h.instance.stage(), Stage::NotStarted);
}

#[tokio::test]
async fn test_duplicate_signer_not_counted() {
    let h = Harness::new(2);
    h.instance.start(INPUT.to_vec()).unwrap();
    h.feed([h.committee.pre_prepare(1, 0, 1, INPUT)]);
    h.feed(h.prepares(&[1, 1, 3, 3], 1, INPUT));
    h.drain();

    assert_eq!(h.instance.stage(), Stage::Prepare);
    assert!(h.bus.broadcasts_of(MessageType::Commit).is_empty());
}

#[tokio::test]
async fn test_forged_signature_rejected() {
    let h = Harness::new(2);
    h.instance.start(INPUT.to_vec()).unwrap();
    h.feed([h.committee.pre_prepare(1, 0, 1, INPUT)]);

    let mut forged = h.committee.prepare(3, 0, 1, INPUT);
    forged.signers = vec![4];
    h.feed([h.committee.prepare(1, 0, 1, INPUT), forged]);
    h.drain();

    // Only operator 1's prepare is stored.
    assert_eq!(h.instance.stage(), Stage::Prepare);
}

// =========================================================================
// QUEUE ADMISSION
// =========================================================================

#[tokio::test]
async fn test_future_round_messages_buffered() {
    let h = Harness::new(2);
    h.instance.start(INPUT.to_vec()).unwrap();
    h.feed(h.prepares(&[1, 3], 2, INPUT));

    assert!(!h.instance.process_message().unwrap());
    assert_eq!(h.queue.len(), 2);
}

#[tokio::test]
async fn test_past_round_messages_dropped() {
    let h = Harness::new(2);
    h.instance.start(INPUT.to_vec()).unwrap();
    h.instance
        .on_timeout(RoundTimeout {
            height: 0,
            round: 1,
        })
        .unwrap();

    h.feed(h.prepares(&[1, 3], 1, INPUT));
    assert!(!h.instance.process_message().unwrap());
    assert!(h.queue.is_empty());
}

// =========================================================================
// ROUND CHANGE
// =========================================================================

#[tokio::test]
async fn test_timeout_broadcasts_round_change() {
    let h = Harness::new(3);
    h.instance.start(INPUT.to_vec()).unwrap();
    h.feed([h.committee.pre_prepare(1, 0, 1, INPUT)]);
    h.feed(h.prepares(&[1, 2, 4], 1, INPUT));
    h.drain();
    assert_eq!(h.instance.stage(), Stage::Commit);

    let moved = h
        .instance
        .on_timeout(RoundTimeout {
            height: 0,
            round: 1,
        })
        .unwrap();
    assert!(moved);
    assert_eq!(h.instance.round(), 2);

    let rcs = h.bus.broadcasts_of(MessageType::RoundChange);
    assert_eq!(rcs.len(), 1);
    assert_eq!(rcs[0].round(), 2);
    assert_eq!(rcs[0].message.prepared_round(), Some(1));
    assert_eq!(rcs[0].message.prepared_value(), Some(INPUT));
}

#[tokio::test]
async fn test_stale_timeout_ignored() {
    let h = Harness::new(3);
    h.instance.start(INPUT.to_vec()).unwrap();
    let stale = RoundTimeout {
        height: 0,
        round: 4,
    };
    assert!(!h.instance.on_timeout(stale).unwrap());
    assert_eq!(h.instance.round(), 1);
    assert!(h.bus.broadcasts().is_empty());
}

#[tokio::test]
async fn test_prepared_value_carried_forward() {
    let h = Harness::new(3);
    h.instance.start(INPUT.to_vec()).unwrap();
    h.instance
        .on_timeout(RoundTimeout {
            height: 0,
            round: 1,
        })
        .unwrap();

    // A quorum prepared OTHER in round 2 without us.
    let cert = h.committee.prepared_certificate(&[1, 2, 4], 0, 2, OTHER);
    h.feed([
        h.committee.round_change(1, 0, 3, Some(cert.clone())),
        h.committee.round_change(2, 0, 3, Some(cert)),
        h.committee.round_change(4, 0, 3, None),
    ]);
    h.drain();

    assert_eq!(h.instance.round(), 3);
    assert_eq!(h.instance.stage(), Stage::PrePrepare);

    // We lead round 3 and must re-propose the prepared value.
    let proposals = h.bus.broadcasts_of(MessageType::PrePrepare);
    assert_eq!(proposals.last().map(|m| m.value()), Some(OTHER));
    assert!(h.instance.justify_pre_prepare(3, OTHER).is_ok());
    assert!(h.instance.justify_pre_prepare(3, INPUT).is_err());

    h.feed([
        h.committee.pre_prepare(3, 0, 3, INPUT),
        h.committee.pre_prepare(3, 0, 3, OTHER),
    ]);
    h.drain();
    assert_eq!(h.instance.stage(), Stage::Prepare);
    let prepares = h.bus.broadcasts_of(MessageType::Prepare);
    assert_eq!(prepares.last().map(|m| m.value()), Some(OTHER));
}

#[tokio::test]
async fn test_round_change_with_short_certificate_rejected() {
    let h = Harness::new(3);
    h.instance.start(INPUT.to_vec()).unwrap();
    let short = h.committee.prepared_certificate(&[1, 2], 0, 1, INPUT);
    h.feed([
        h.committee.round_change(1, 0, 2, Some(short)),
        h.committee.round_change(2, 0, 2, None),
        h.committee.round_change(4, 0, 2, None),
    ]);
    h.drain();

    assert!(!h.instance.justify_round_change(2).unwrap());
    assert_eq!(h.instance.round(), 1);
}

#[tokio::test]
async fn test_later_round_proposal_waits_for_justification() {
    let h = Harness::new(3);
    h.instance.start(INPUT.to_vec()).unwrap();
    h.instance
        .on_timeout(RoundTimeout {
            height: 0,
            round: 1,
        })
        .unwrap();

    h.feed([h.committee.pre_prepare(2, 0, 2, INPUT)]);
    assert!(!h.instance.process_message().unwrap());
    assert_eq!(h.queue.len(), 1);

    h.feed([
        h.committee.round_change(1, 0, 2, None),
        h.committee.round_change(2, 0, 2, None),
        h.committee.round_change(4, 0, 2, None),
    ]);
    h.drain();
    assert!(h.queue.is_empty());
    assert_eq!(h.instance.stage(), Stage::Prepare);
}

#[tokio::test]
async fn test_partial_quorum_counts_distinct_signers() {
    let h = Harness::new(3);
    h.instance.start(INPUT.to_vec()).unwrap();

    h.feed([
        h.committee.round_change(1, 0, 4, None),
        h.committee.round_change(1, 0, 6, None),
    ]);
    assert!(!h.instance.process_change_round_partial_quorum().unwrap());
    assert_eq!(h.instance.round(), 1);

    h.feed([h.committee.round_change(2, 0, 6, None)]);
    // Operator 1 asks for round 4 at the least, so the first bump stops there.
    assert!(h.instance.process_change_round_partial_quorum().unwrap());
    assert_eq!(h.instance.round(), 4);
    assert_eq!(h.instance.stage(), Stage::NotStarted);
    // Nothing was consumed.
    assert_eq!(h.queue.len(), 3);

    let rcs = h.bus.broadcasts_of(MessageType::RoundChange);
    assert_eq!(rcs.last().map(|m| m.round()), Some(4));

    // Both still ask for round 6.
    assert!(h.instance.process_change_round_partial_quorum().unwrap());
    assert_eq!(h.instance.round(), 6);
    assert!(!h.instance.process_change_round_partial_quorum().unwrap());
    assert_eq!(h.instance.round(), 6);
}

// =========================================================================
// DELIVERY ORDER
// =========================================================================

/// Deterministic Fisher-Yates driven by a linear congruential generator.
fn shuffled<T>(mut items: Vec<T>, seed: u64) -> Vec<T> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    for i in (1..items.len()).rev() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let j = ((state >> 33) % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
    items
}

/// Feed every message twice in `seed`'s order and drain after each one.
fn deliver_shuffled(operator_id: OperatorId, msgs: &[SignedMessage], seed: u64) -> Harness {
    let h = Harness::new(operator_id);
    h.instance.start(INPUT.to_vec()).unwrap();

    let doubled: Vec<SignedMessage> = msgs.iter().chain(msgs.iter()).cloned().collect();
    for msg in shuffled(doubled, seed) {
        h.feed([msg]);
        h.drain();
    }
    h
}

#[tokio::test]
async fn test_any_order_with_duplicates_decides_once_in_first_round() {
    let c = TestCommittee::new(4, RunnerRole::Attester);
    let mut msgs = vec![c.pre_prepare(1, 0, 1, INPUT)];
    msgs.extend([1, 3, 4].map(|op| c.prepare(op, 0, 1, INPUT)));
    msgs.extend([1, 3, 4].map(|op| c.commit(op, 0, 1, INPUT)));

    for seed in 0..40 {
        let h = deliver_shuffled(2, &msgs, seed);
        let decided = h.bus.decided();
        assert_eq!(decided.len(), 1, "seed {}", seed);
        assert_eq!(decided[0].value, INPUT.to_vec(), "seed {}", seed);
        assert_eq!(decided[0].round, 1, "seed {}", seed);
        assert_eq!(h.store.count(), 1, "seed {}", seed);
    }
}

#[tokio::test]
async fn test_any_order_with_duplicates_decides_once_after_round_change() {
    // Operator 2 leads round 2; operator 3 never sees a round-1 proposal.
    let c = TestCommittee::new(4, RunnerRole::Attester);
    let mut msgs: Vec<SignedMessage> = [1, 2, 4].map(|op| c.round_change(op, 0, 2, None)).into();
    msgs.push(c.pre_prepare(2, 0, 2, INPUT));
    msgs.extend([1, 2, 4].map(|op| c.prepare(op, 0, 2, INPUT)));
    msgs.extend([1, 2, 4].map(|op| c.commit(op, 0, 2, INPUT)));

    for seed in 0..40 {
        let h = deliver_shuffled(3, &msgs, seed);
        let decided = h.bus.decided();
        assert_eq!(decided.len(), 1, "seed {}", seed);
        assert_eq!(decided[0].value, INPUT.to_vec(), "seed {}", seed);
        assert_eq!(decided[0].round, 2, "seed {}", seed);
        assert_eq!(h.instance.stage(), Stage::Decided, "seed {}", seed);
    }
}
