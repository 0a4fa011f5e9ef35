//! The per-transaction WTP responder state machine. Each live transaction
//! owns one [`Transaction`] behind its own mutex; the responder never holds
//! two transactions' locks at once and never holds a transaction lock
//! across an await on the outside world.

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::pdu::{abort_code, segment_with_trailers, AbortType, Pdu, PduType, SarSegment, MAX_RCR, TID_VERIFICATION};
use crate::error::WtpError;

/// Responder class-1/class-2 transaction states (no user acknowledgement
/// variant is modeled beyond what the responder needs to track).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Listen,
    TidOkWait,
    InvokeRespWait,
    ResultWait,
    ResultRespWait,
    WaitTimeoutState,
}

/// Inbound or internally-generated events a transaction reacts to.
#[derive(Debug, Clone)]
pub enum Event {
    /// `tid_valid` is false when the peer asked us to verify a tid
    /// ([`TID_VERIFICATION`] set) and we already hold a transaction under it
    /// — i.e. the tid was not, in fact, new.
    RcvInvoke {
        tcl: u8,
        u_ack: u8,
        tid_valid: bool,
        payload: Vec<u8>,
    },
    /// `psn`/`ttr` identify how much of a segmented Result the peer has
    /// acknowledged so far; `ttr` set means the whole result is acked.
    RcvAck { tid_verification: u8, psn: u8, ttr: bool },
    RcvAbort { reason: u8 },
    RcvSegmentedInvoke { psn: u8, payload: Vec<u8>, ttr: bool },
    TrResult { payload: Vec<u8> },
    TrAbort { reason: u8 },
    Timeout,
}

/// A PDU to send plus whether the responder should keep the transaction
/// alive afterward or may tear it down.
#[derive(Debug, Clone)]
pub struct Action {
    pub pdu: Pdu,
    pub terminal: bool,
}

/// One live WTP transaction. `tid` is the machine-local (initiator-space)
/// transaction id; wire PDUs always carry [`Pdu::wire_tid`] of it.
pub struct Transaction {
    pub tid: u16,
    pub state: State,
    pub rcr: u8,
    events: VecDeque<Event>,
    reassembly: Vec<u8>,
    expected_psn: u8,
    tcl: u8,
    u_ack: u8,
    /// The Invoke payload received while waiting on tid verification,
    /// delivered once the peer confirms the tid in `TidOkWait`.
    pending_invoke: Option<Vec<u8>>,
    /// The outbound Result, already split into SAR segments, kept around so
    /// a partial ack or a timeout can resend from the right point.
    pending_segments: Vec<SarSegment>,
    /// Index into `pending_segments` of the next segment to (re)send.
    next_send_psn: usize,
}

impl Transaction {
    pub fn new(tid: u16) -> Self {
        Transaction {
            tid,
            state: State::Listen,
            rcr: 0,
            events: VecDeque::new(),
            reassembly: Vec::new(),
            expected_psn: 0,
            tcl: 0,
            u_ack: 0,
            pending_invoke: None,
            pending_segments: Vec::new(),
            next_send_psn: 0,
        }
    }

    pub fn push_event(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Drain and process every queued event in FIFO order, returning the
    /// actions (PDUs to send) produced along the way.
    pub fn drain(&mut self) -> Result<Vec<Action>, WtpError> {
        let mut actions = Vec::new();
        while let Some(event) = self.events.pop_front() {
            actions.extend(self.step(event)?);
        }
        Ok(actions)
    }

    fn step(&mut self, event: Event) -> Result<Vec<Action>, WtpError> {
        match (self.state, event) {
            (
                State::Listen,
                Event::RcvInvoke {
                    tcl,
                    u_ack,
                    tid_valid,
                    payload,
                },
            ) => {
                if !tid_valid {
                    self.tcl = tcl;
                    self.u_ack = u_ack;
                    self.pending_invoke = Some(payload);
                    self.state = State::TidOkWait;
                    debug!(tid = self.tid, "tid requires verification, asking peer to confirm");
                    return Ok(vec![ack_action_tid_verify(self.tid)]);
                }

                self.tcl = tcl;
                self.u_ack = u_ack;
                if tcl == 0 {
                    // Unconfirmed push: deliver and dispose, no ack, no
                    // transaction kept around for a Result.
                    self.reassembly = payload;
                    self.state = State::WaitTimeoutState;
                    debug!(tid = self.tid, "class-0 invoke delivered and disposed");
                    return Ok(vec![]);
                }

                self.reassembly = payload;
                self.state = State::InvokeRespWait;
                debug!(tid = self.tid, tcl, "transaction entered invoke-resp-wait");
                if u_ack == 0 {
                    Ok(vec![ack_action(self.tid, false)])
                } else {
                    Ok(vec![])
                }
            }

            (State::Listen, Event::RcvSegmentedInvoke { psn, payload, ttr }) => {
                self.reassembly.extend_from_slice(&payload);
                self.expected_psn = psn + 1;
                if ttr {
                    self.state = State::InvokeRespWait;
                } else {
                    self.state = State::TidOkWait;
                }
                Ok(vec![ack_action(self.tid, false)])
            }

            (State::TidOkWait, Event::RcvSegmentedInvoke { psn, payload, ttr }) => {
                if psn != self.expected_psn {
                    warn!(tid = self.tid, expected = self.expected_psn, got = psn, "out of order segment");
                    return Ok(vec![]);
                }
                self.reassembly.extend_from_slice(&payload);
                self.expected_psn = psn + 1;
                if ttr {
                    self.state = State::InvokeRespWait;
                }
                Ok(vec![ack_action(self.tid, false)])
            }

            (State::TidOkWait, Event::RcvAck { .. }) => {
                // The peer confirmed the tid: deliver the invoke we held
                // back and proceed as if it had arrived with a valid tid.
                if let Some(payload) = self.pending_invoke.take() {
                    self.reassembly = payload;
                }
                self.state = State::InvokeRespWait;
                debug!(tid = self.tid, "tid confirmed, invoke delivered");
                Ok(vec![])
            }

            (State::InvokeRespWait, Event::TrResult { payload }) => {
                let segments = segment_with_trailers(&payload)?;
                self.pending_segments = segments;
                self.next_send_psn = 0;
                self.rcr = 0;
                self.state = State::ResultWait;
                Ok(build_result_actions(self.tid, &self.pending_segments, self.next_send_psn))
            }

            (State::InvokeRespWait, Event::TrAbort { reason }) => {
                self.state = State::WaitTimeoutState;
                Ok(vec![abort_action(self.tid, reason, true)])
            }

            (State::ResultWait, Event::RcvAck { psn, ttr, .. }) => self.handle_result_ack(psn, ttr),

            (State::ResultWait, Event::Timeout) => {
                self.rcr += 1;
                if self.rcr >= MAX_RCR {
                    self.state = State::WaitTimeoutState;
                    return Err(WtpError::RetransmissionCeiling);
                }
                self.state = State::ResultRespWait;
                Ok(build_result_actions(self.tid, &self.pending_segments, self.next_send_psn))
            }

            (State::ResultRespWait, Event::RcvAck { psn, ttr, .. }) => self.handle_result_ack(psn, ttr),

            (State::ResultRespWait, Event::Timeout) => {
                self.rcr += 1;
                if self.rcr >= MAX_RCR {
                    self.state = State::WaitTimeoutState;
                    return Err(WtpError::RetransmissionCeiling);
                }
                Ok(build_result_actions(self.tid, &self.pending_segments, self.next_send_psn))
            }

            (_, Event::RcvAbort { reason }) => {
                debug!(tid = self.tid, reason, "peer aborted transaction");
                self.state = State::WaitTimeoutState;
                Ok(vec![])
            }

            (state, event) => {
                warn!(tid = self.tid, ?state, ?event, "unexpected event for state, ignoring");
                Ok(vec![])
            }
        }
    }

    /// Shared `RcvAck` handling for `ResultWait`/`ResultRespWait`: a full ack
    /// (`ttr` set, or the ack's psn covers every pending segment) retires the
    /// transaction; a partial ack resumes sending from the segment after the
    /// acknowledged one.
    fn handle_result_ack(&mut self, psn: u8, ttr: bool) -> Result<Vec<Action>, WtpError> {
        let acked_through = psn as usize + 1;
        if ttr || acked_through >= self.pending_segments.len() {
            self.state = State::WaitTimeoutState;
            self.pending_segments.clear();
            return Ok(vec![]);
        }
        self.next_send_psn = acked_through;
        self.rcr = 0;
        self.state = State::ResultWait;
        Ok(build_result_actions(self.tid, &self.pending_segments, self.next_send_psn))
    }

    pub fn reassembled_payload(&self) -> &[u8] {
        &self.reassembly
    }

    pub fn is_terminal(&self) -> bool {
        self.state == State::WaitTimeoutState
    }
}

fn ack_action(tid: u16, ttr: bool) -> Action {
    Action {
        pdu: Pdu {
            pdu_type: PduType::Ack,
            ttr,
            tid: Pdu::wire_tid(tid),
            ..Default::default()
        },
        terminal: false,
    }
}

/// An Ack carrying `tid-verify=1`, sent from `Listen` when the peer's
/// Invoke asked us to confirm a tid we already hold a transaction under.
fn ack_action_tid_verify(tid: u16) -> Action {
    Action {
        pdu: Pdu {
            pdu_type: PduType::Ack,
            tid_verification: TID_VERIFICATION,
            tid: Pdu::wire_tid(tid),
            ..Default::default()
        },
        terminal: false,
    }
}

/// Build one PDU per segment from `from_psn` onward: a plain `Result` PDU
/// when the whole payload fit in a single segment, `SegmentedResult`
/// otherwise.
fn build_result_actions(tid: u16, segments: &[SarSegment], from_psn: usize) -> Vec<Action> {
    let single = segments.len() == 1;
    segments[from_psn.min(segments.len())..]
        .iter()
        .map(|seg| {
            let pdu_type = if single { PduType::Result } else { PduType::SegmentedResult };
            Action {
                pdu: Pdu {
                    con: !seg.ttr,
                    pdu_type,
                    gtr: seg.gtr,
                    ttr: seg.ttr,
                    tid: Pdu::wire_tid(tid),
                    psn: seg.psn,
                    payload: seg.data.clone(),
                    ..Default::default()
                },
                terminal: false,
            }
        })
        .collect()
}

fn abort_action(tid: u16, reason: u8, user: bool) -> Action {
    Action {
        pdu: Pdu {
            pdu_type: PduType::Abort,
            ttr: true,
            tid: Pdu::wire_tid(tid),
            abort_type: Some(if user { AbortType::User } else { AbortType::Provider }),
            abort_reason: Some(reason),
            ..Default::default()
        },
        terminal: true,
    }
}

pub fn abort_reason_no_response() -> u8 {
    abort_code::NORESPONSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wtp::pdu::SAR_SEGM_SIZE;

    fn invoke_class1() -> Event {
        Event::RcvInvoke {
            tcl: 1,
            u_ack: 0,
            tid_valid: true,
            payload: b"invoke".to_vec(),
        }
    }

    #[test]
    fn class1_invoke_emits_ack_then_result_then_retires_on_full_ack() {
        let mut txn = Transaction::new(1);
        txn.push_event(invoke_class1());
        let actions = txn.drain().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].pdu.pdu_type as u8, PduType::Ack as u8);
        assert_eq!(txn.state, State::InvokeRespWait);

        txn.push_event(Event::TrResult {
            payload: b"ok".to_vec(),
        });
        let actions = txn.drain().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].pdu.pdu_type as u8, PduType::Result as u8);
        assert_eq!(txn.state, State::ResultWait);

        txn.push_event(Event::RcvAck {
            tid_verification: 0,
            psn: 0,
            ttr: true,
        });
        txn.drain().unwrap();
        assert_eq!(txn.state, State::WaitTimeoutState);
    }

    #[test]
    fn class2_invoke_with_u_ack_one_suppresses_responder_ack() {
        let mut txn = Transaction::new(1);
        txn.push_event(Event::RcvInvoke {
            tcl: 2,
            u_ack: 1,
            tid_valid: true,
            payload: b"invoke".to_vec(),
        });
        let actions = txn.drain().unwrap();
        assert!(actions.is_empty());
        assert_eq!(txn.state, State::InvokeRespWait);
    }

    #[test]
    fn class0_invoke_delivers_and_disposes_without_ack() {
        let mut txn = Transaction::new(1);
        txn.push_event(Event::RcvInvoke {
            tcl: 0,
            u_ack: 0,
            tid_valid: true,
            payload: b"fire-and-forget".to_vec(),
        });
        let actions = txn.drain().unwrap();
        assert!(actions.is_empty());
        assert_eq!(txn.state, State::WaitTimeoutState);
        assert_eq!(txn.reassembled_payload(), b"fire-and-forget");
    }

    #[test]
    fn invalid_tid_gets_tid_verify_ack_then_confirms_into_invoke_resp_wait() {
        let mut txn = Transaction::new(1);
        txn.push_event(Event::RcvInvoke {
            tcl: 1,
            u_ack: 0,
            tid_valid: false,
            payload: b"invoke".to_vec(),
        });
        let actions = txn.drain().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].pdu.pdu_type as u8, PduType::Ack as u8);
        assert_eq!(actions[0].pdu.tid_verification, TID_VERIFICATION);
        assert_eq!(txn.state, State::TidOkWait);

        txn.push_event(Event::RcvAck {
            tid_verification: TID_VERIFICATION,
            psn: 0,
            ttr: false,
        });
        let actions = txn.drain().unwrap();
        assert!(actions.is_empty());
        assert_eq!(txn.state, State::InvokeRespWait);
        assert_eq!(txn.reassembled_payload(), b"invoke");
    }

    #[test]
    fn large_result_segments_into_three_pdus_with_correct_trailers() {
        let mut txn = Transaction::new(1);
        txn.push_event(invoke_class1());
        txn.drain().unwrap();

        let payload = vec![7u8; SAR_SEGM_SIZE * 2 + 200];
        txn.push_event(Event::TrResult { payload });
        let actions = txn.drain().unwrap();
        assert_eq!(actions.len(), 3);
        for (i, action) in actions.iter().enumerate() {
            assert_eq!(action.pdu.pdu_type as u8, PduType::SegmentedResult as u8);
            assert_eq!(action.pdu.psn, i as u8);
        }
        assert!(!actions[0].pdu.ttr && !actions[0].pdu.gtr);
        assert!(!actions[1].pdu.ttr && !actions[1].pdu.gtr);
        assert!(actions[2].pdu.ttr && actions[2].pdu.gtr);
        assert_eq!(txn.state, State::ResultWait);
    }

    #[test]
    fn partial_ack_resumes_from_next_segment() {
        let mut txn = Transaction::new(1);
        txn.push_event(invoke_class1());
        txn.drain().unwrap();
        txn.push_event(Event::TrResult {
            payload: vec![7u8; SAR_SEGM_SIZE * 3],
        });
        txn.drain().unwrap();

        txn.push_event(Event::RcvAck {
            tid_verification: 0,
            psn: 0,
            ttr: false,
        });
        let actions = txn.drain().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].pdu.psn, 1);
        assert_eq!(actions[1].pdu.psn, 2);
        assert_eq!(txn.state, State::ResultWait);

        txn.push_event(Event::RcvAck {
            tid_verification: 0,
            psn: 2,
            ttr: true,
        });
        txn.drain().unwrap();
        assert_eq!(txn.state, State::WaitTimeoutState);
    }

    #[test]
    fn timeout_resends_unacked_segments_and_increments_rcr() {
        let mut txn = Transaction::new(1);
        txn.push_event(invoke_class1());
        txn.drain().unwrap();
        txn.push_event(Event::TrResult {
            payload: vec![7u8; SAR_SEGM_SIZE * 2],
        });
        txn.drain().unwrap();

        txn.push_event(Event::Timeout);
        let actions = txn.drain().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(txn.rcr, 1);
        assert_eq!(txn.state, State::ResultRespWait);
    }

    #[test]
    fn retransmission_ceiling_surfaces_as_error() {
        let mut txn = Transaction::new(2);
        txn.push_event(invoke_class1());
        txn.drain().unwrap();
        txn.push_event(Event::TrResult { payload: vec![] });
        txn.drain().unwrap();

        for _ in 0..MAX_RCR - 1 {
            txn.push_event(Event::Timeout);
            txn.drain().unwrap();
        }
        txn.push_event(Event::Timeout);
        let err = txn.drain().unwrap_err();
        assert!(matches!(err, WtpError::RetransmissionCeiling));
    }

    #[test]
    fn three_segment_invoke_reassembles_in_order() {
        let mut txn = Transaction::new(3);
        txn.push_event(Event::RcvSegmentedInvoke {
            psn: 0,
            payload: b"AAA".to_vec(),
            ttr: false,
        });
        txn.push_event(Event::RcvSegmentedInvoke {
            psn: 1,
            payload: b"BBB".to_vec(),
            ttr: false,
        });
        txn.push_event(Event::RcvSegmentedInvoke {
            psn: 2,
            payload: b"CCC".to_vec(),
            ttr: true,
        });
        let actions = txn.drain().unwrap();
        assert_eq!(actions.len(), 3);
        assert_eq!(txn.reassembled_payload(), b"AAABBBCCC");
        assert_eq!(txn.state, State::InvokeRespWait);
    }

    #[test]
    fn user_abort_produces_abort_pdu() {
        let mut txn = Transaction::new(4);
        txn.push_event(invoke_class1());
        txn.drain().unwrap();
        txn.push_event(Event::TrAbort {
            reason: abort_reason_no_response(),
        });
        let actions = txn.drain().unwrap();
        assert_eq!(actions.len(), 1);
        assert!(actions[0].terminal);
        assert_eq!(txn.state, State::WaitTimeoutState);
    }
}
