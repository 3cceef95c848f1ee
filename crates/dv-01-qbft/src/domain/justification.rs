//! Justification rules
//!
//! - A round change to `r` is justified by a quorum of distinct signers
//!   asking for round `>= r` whose prepared reports agree at the highest
//!   reported round.
//! - A pre-prepare in round 1 must carry the instance input; in later rounds
//!   it must carry the value extracted by the justifying round change.

use super::container::MessageContainer;
use super::error::{QbftError, QbftResult};
use super::message::{MessageType, PreparedCertificate};
use super::state::InstanceState;
use crate::ports::SignatureVerifier;
use shared_types::{Height, MessageId, OperatorId, QuorumParams, Round, Share, FIRST_ROUND};
use std::collections::BTreeSet;

/// Outcome of a successful round-change justification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundChangeJustification {
    pub round: Round,
    pub signers: BTreeSet<OperatorId>,
    /// Highest prepared round and value reported by the quorum.
    pub prepared: Option<(Round, Vec<u8>)>,
}

impl RoundChangeJustification {
    /// The value the leader of `round` must propose.
    pub fn value_or(&self, input: &[u8]) -> Vec<u8> {
        match &self.prepared {
            Some((_, value)) => value.clone(),
            None => input.to_vec(),
        }
    }
}

/// `Ok(None)` when fewer than a quorum of distinct signers asked for a round
/// `>= round`.
pub fn justify_round_change(
    round_changes: &MessageContainer,
    quorum: QuorumParams,
    round: Round,
) -> QbftResult<Option<RoundChangeJustification>> {
    let signers = round_changes.signers_at_or_above(round);
    if !quorum.has_quorum(signers.len()) {
        return Ok(None);
    }

    let certificates: Vec<&PreparedCertificate> = round_changes
        .at_or_above(round)
        .filter_map(|msg| msg.message.prepared.as_ref())
        .collect();

    let prepared = match certificates.iter().map(|cert| cert.round).max() {
        None => None,
        Some(highest) => {
            let mut at_highest = certificates.iter().filter(|cert| cert.round == highest);
            // Non-empty: `highest` came from this set.
            let value = at_highest.next().map(|cert| cert.value.clone()).unwrap_or_default();
            if at_highest.any(|cert| cert.value != value) {
                return Err(QbftError::ConflictingPreparedValues { round: highest });
            }
            Some((highest, value))
        }
    };

    Ok(Some(RoundChangeJustification {
        round,
        signers,
        prepared,
    }))
}

pub fn justify_pre_prepare(state: &InstanceState, round: Round, value: &[u8]) -> QbftResult<()> {
    let expected = if round == FIRST_ROUND {
        state.input_value.as_slice()
    } else {
        match &state.justified {
            Some(justified) if justified.round == round => justified.value.as_slice(),
            _ => return Err(QbftError::UnjustifiedPrePrepare(round)),
        }
    };

    if value != expected {
        return Err(QbftError::PrePrepareValueMismatch(round));
    }
    Ok(())
}

/// Check a prepared certificate carried by a round change for `rc_round`.
pub fn validate_prepared_certificate(
    cert: &PreparedCertificate,
    rc_round: Round,
    identifier: &MessageId,
    height: Height,
    share: &Share,
    verifier: &dyn SignatureVerifier,
) -> QbftResult<()> {
    let invalid = |reason: String| Err(QbftError::InvalidPreparedCertificate(reason));

    if cert.round < FIRST_ROUND || cert.round >= rc_round {
        return invalid(format!(
            "prepared round {} not below round change {}",
            cert.round, rc_round
        ));
    }

    let mut signers = BTreeSet::new();
    for prepare in &cert.prepares {
        let msg = &prepare.message;
        if msg.msg_type != MessageType::Prepare
            || msg.height != height
            || msg.round != cert.round
            || msg.identifier != *identifier
            || msg.value != cert.value
        {
            return invalid("prepare does not match certificate".into());
        }
        let Some(signer) = prepare.signer() else {
            return invalid("prepare without a single signer".into());
        };
        if !share.is_member(signer) || !verifier.verify(prepare, share) {
            return invalid(format!("bad prepare signature from {signer}"));
        }
        signers.insert(signer);
    }

    if !share.quorum().has_quorum(signers.len()) {
        return invalid(format!(
            "{} distinct prepares, quorum is {}",
            signers.len(),
            share.quorum().quorum
        ));
    }
    Ok(())
}
