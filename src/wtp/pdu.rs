//! WTP PDU wire format: header bit layout, segmentation constants, and
//! pack/unpack for the handful of PDU types the responder needs.

use crate::error::WtpError;

/// Maximum initiator-assigned transaction id before wraparound, per the
/// WTP spec's TID space split between initiator and responder.
pub const INITIATOR_TID_LIMIT: u16 = 1 << 15;

/// TID verification flags carried in an Invoke PDU's first octet.
pub const ACKNOWLEDGEMENT: u8 = 0;
pub const TID_VERIFICATION: u8 = 1;

/// Segmented Asynchronous Response (SAR) tuning: payload bytes per segment
/// and the maximum number of segments in one group.
pub const SAR_SEGM_SIZE: usize = 1280;
pub const SAR_GROUP_LEN: usize = 255;

/// Retransmission ceiling: once a transaction's retry counter reaches this,
/// it surfaces as a failure rather than retrying again.
pub const MAX_RCR: u8 = 8;

/// Abort codes (the reason field of an Abort PDU).
pub mod abort_code {
    pub const UNKNOWN: u8 = 0x00;
    pub const PROTOERR: u8 = 0x01;
    pub const INVALIDTID: u8 = 0x02;
    pub const NOTIMPLEMENTEDCL2: u8 = 0x03;
    pub const NOTIMPLEMENTEDSAR: u8 = 0x04;
    pub const NOTIMPLEMENTEDUACK: u8 = 0x05;
    pub const WTPVERSIONONE: u8 = 0x06;
    pub const CAPTEMPEXCEEDED: u8 = 0x07;
    pub const NORESPONSE: u8 = 0x08;
    pub const MESSAGETOOLARGE: u8 = 0x09;
    pub const NOTIMPLEMENTEDESAR: u8 = 0x0A;
}

/// Abort type: whether the abort originates from the protocol provider or the user above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortType {
    Provider = 0,
    User = 1,
}

/// PDU type discriminant, carried in the 4-bit `type` field of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    Invoke = 1,
    Result = 2,
    Ack = 3,
    Abort = 4,
    SegmentedInvoke = 5,
    SegmentedResult = 6,
    NegativeAck = 7,
}

impl PduType {
    fn from_u8(v: u8) -> Result<Self, WtpError> {
        match v {
            1 => Ok(PduType::Invoke),
            2 => Ok(PduType::Result),
            3 => Ok(PduType::Ack),
            4 => Ok(PduType::Abort),
            5 => Ok(PduType::SegmentedInvoke),
            6 => Ok(PduType::SegmentedResult),
            7 => Ok(PduType::NegativeAck),
            other => Err(WtpError::UnknownPduType(other)),
        }
    }
}

/// A decoded WTP PDU header plus whatever payload/trailer bytes follow it.
#[derive(Debug, Clone)]
pub struct Pdu {
    /// Continue flag: more segments follow in this group.
    pub con: bool,
    pub pdu_type: PduType,
    /// Group Trailer: this is the last segment of the group.
    pub gtr: bool,
    /// Transmission Trailer: this is the last segment of the whole message.
    pub ttr: bool,
    /// Re-transmission indicator.
    pub rid: bool,
    /// Wire-encoded transaction id (already XORed with 0x8000 for a sent PDU).
    pub tid: u16,
    pub tid_verification: u8,
    /// Invoke-only: transaction class (0 = unconfirmed, 1/2 = confirmed).
    pub tcl: u8,
    /// Invoke-only: user-acknowledgement flag. 0 means the responder itself
    /// emits an Ack on receipt; 1 means the application above generates it.
    pub u_ack: u8,
    pub psn: u8,
    pub abort_type: Option<AbortType>,
    pub abort_reason: Option<u8>,
    pub payload: Vec<u8>,
}

impl Default for Pdu {
    fn default() -> Self {
        Pdu {
            con: false,
            pdu_type: PduType::Invoke,
            gtr: false,
            ttr: false,
            rid: false,
            tid: 0,
            tid_verification: ACKNOWLEDGEMENT,
            tcl: 0,
            u_ack: 0,
            psn: 0,
            abort_type: None,
            abort_reason: None,
            payload: Vec::new(),
        }
    }
}

impl Pdu {
    /// Compute the wire-level Send-TID for a machine-local transaction id:
    /// the responder always XORs with 0x8000 so initiator and responder TID
    /// spaces never collide on the wire.
    pub fn wire_tid(machine_tid: u16) -> u16 {
        machine_tid ^ 0x8000
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.payload.len());
        let mut first = 0u8;
        if self.con {
            first |= 0b1000_0000;
        }
        first |= (self.pdu_type as u8 & 0x0F) << 3;
        if self.gtr {
            first |= 0b0000_0100;
        }
        if self.ttr {
            first |= 0b0000_0010;
        }
        if self.rid {
            first |= 0b0000_0001;
        }
        out.push(first);
        out.extend_from_slice(&self.tid.to_be_bytes());

        match self.pdu_type {
            PduType::Invoke => {
                let mut byte = self.tid_verification & 0x01;
                byte |= (self.tcl & 0x03) << 1;
                byte |= (self.u_ack & 0x01) << 3;
                out.push(byte);
            }
            PduType::Ack => {
                out.push(self.tid_verification & 0x01);
                out.push(self.psn);
            }
            PduType::SegmentedInvoke | PduType::SegmentedResult => out.push(self.psn),
            PduType::Abort => {
                out.push(self.abort_type.unwrap_or(AbortType::Provider) as u8);
                out.push(self.abort_reason.unwrap_or(abort_code::UNKNOWN));
            }
            _ => {}
        }

        out.extend_from_slice(&self.payload);
        out
    }

    pub fn unpack(bytes: &[u8]) -> Result<Self, WtpError> {
        if bytes.len() < 3 {
            return Err(WtpError::InvalidHeader);
        }
        let first = bytes[0];
        let con = first & 0b1000_0000 != 0;
        let pdu_type = PduType::from_u8((first >> 3) & 0x0F)?;
        let gtr = first & 0b0000_0100 != 0;
        let ttr = first & 0b0000_0010 != 0;
        let rid = first & 0b0000_0001 != 0;
        let tid = u16::from_be_bytes([bytes[1], bytes[2]]);

        let mut offset = 3;
        let mut tid_verification = ACKNOWLEDGEMENT;
        let mut tcl = 0u8;
        let mut u_ack = 0u8;
        let mut psn = 0u8;
        let mut abort_type = None;
        let mut abort_reason = None;

        match pdu_type {
            PduType::Invoke => {
                let byte = *bytes.get(offset).ok_or(WtpError::InvalidHeader)?;
                tid_verification = byte & 0x01;
                tcl = (byte >> 1) & 0x03;
                u_ack = (byte >> 3) & 0x01;
                offset += 1;
            }
            PduType::Ack => {
                let byte = *bytes.get(offset).ok_or(WtpError::InvalidHeader)?;
                tid_verification = byte & 0x01;
                let p = *bytes.get(offset + 1).ok_or(WtpError::InvalidHeader)?;
                psn = p;
                offset += 2;
            }
            PduType::SegmentedInvoke | PduType::SegmentedResult => {
                let byte = *bytes.get(offset).ok_or(WtpError::InvalidHeader)?;
                psn = byte;
                offset += 1;
            }
            PduType::Abort => {
                let t = *bytes.get(offset).ok_or(WtpError::InvalidHeader)?;
                let r = *bytes.get(offset + 1).ok_or(WtpError::InvalidHeader)?;
                abort_type = Some(if t == 1 { AbortType::User } else { AbortType::Provider });
                abort_reason = Some(r);
                offset += 2;
            }
            _ => {}
        }

        let payload = bytes[offset..].to_vec();
        Ok(Pdu {
            con,
            pdu_type,
            gtr,
            ttr,
            rid,
            tid,
            tid_verification,
            tcl,
            u_ack,
            psn,
            abort_type,
            abort_reason,
            payload,
        })
    }
}

/// Split `data` into SAR segments of at most [`SAR_SEGM_SIZE`] bytes each,
/// at most [`SAR_GROUP_LEN`] segments per group.
pub fn segment(data: &[u8]) -> Result<Vec<&[u8]>, WtpError> {
    let chunks: Vec<&[u8]> = data.chunks(SAR_SEGM_SIZE).collect();
    if chunks.len() > SAR_GROUP_LEN {
        return Err(WtpError::BadSegmentation(format!(
            "{} segments exceeds group limit {}",
            chunks.len(),
            SAR_GROUP_LEN
        )));
    }
    if chunks.is_empty() {
        return Ok(vec![&[]]);
    }
    Ok(chunks)
}

/// One SAR segment with its position and trailer flags already resolved.
#[derive(Debug, Clone)]
pub struct SarSegment {
    pub psn: u8,
    /// Group Trailer: last segment of a `SAR_GROUP_LEN`-sized group.
    pub gtr: bool,
    /// Transmission Trailer: last segment overall.
    pub ttr: bool,
    pub data: Vec<u8>,
}

/// Split `data` into SAR segments and resolve each one's `gtr`/`ttr` flags,
/// for a caller that needs to emit (or resend) one PDU per segment.
pub fn segment_with_trailers(data: &[u8]) -> Result<Vec<SarSegment>, WtpError> {
    let chunks = segment(data)?;
    let total = chunks.len();
    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let is_last = i + 1 == total;
            let group_boundary = (i + 1) % SAR_GROUP_LEN == 0;
            SarSegment {
                psn: i as u8,
                gtr: is_last || group_boundary,
                ttr: is_last,
                data: chunk.to_vec(),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tid_xors_high_bit() {
        assert_eq!(Pdu::wire_tid(0x0001), 0x8001);
        assert_eq!(Pdu::wire_tid(0x8001), 0x0001);
    }

    #[test]
    fn invoke_pdu_round_trips() {
        let pdu = Pdu {
            con: true,
            pdu_type: PduType::Invoke,
            ttr: true,
            tid: 0x8042,
            tid_verification: TID_VERIFICATION,
            tcl: 2,
            u_ack: 0,
            payload: vec![1, 2, 3, 4],
            ..Default::default()
        };
        let packed = pdu.pack();
        let unpacked = Pdu::unpack(&packed).unwrap();
        assert!(unpacked.con);
        assert!(unpacked.ttr);
        assert!(!unpacked.gtr);
        assert_eq!(unpacked.tid, 0x8042);
        assert_eq!(unpacked.tid_verification, TID_VERIFICATION);
        assert_eq!(unpacked.tcl, 2);
        assert_eq!(unpacked.u_ack, 0);
        assert_eq!(unpacked.payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn ack_pdu_carries_tid_verification_and_psn() {
        let pdu = Pdu {
            pdu_type: PduType::Ack,
            tid: 0x8042,
            tid_verification: TID_VERIFICATION,
            psn: 5,
            ..Default::default()
        };
        let unpacked = Pdu::unpack(&pdu.pack()).unwrap();
        assert_eq!(unpacked.tid_verification, TID_VERIFICATION);
        assert_eq!(unpacked.psn, 5);
    }

    #[test]
    fn abort_pdu_round_trips() {
        let pdu = Pdu {
            pdu_type: PduType::Abort,
            tid: 7,
            abort_type: Some(AbortType::User),
            abort_reason: Some(abort_code::NORESPONSE),
            ..Default::default()
        };
        let packed = pdu.pack();
        let unpacked = Pdu::unpack(&packed).unwrap();
        assert_eq!(unpacked.abort_type, Some(AbortType::User));
        assert_eq!(unpacked.abort_reason, Some(abort_code::NORESPONSE));
    }

    #[test]
    fn segment_respects_group_limit() {
        let data = vec![0u8; SAR_SEGM_SIZE * (SAR_GROUP_LEN + 1)];
        let err = segment(&data).unwrap_err();
        assert!(matches!(err, WtpError::BadSegmentation(_)));
    }

    #[test]
    fn segment_splits_into_expected_chunk_count() {
        let data = vec![0u8; SAR_SEGM_SIZE * 3];
        let chunks = segment(&data).unwrap();
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = Pdu::unpack(&[0, 1]).unwrap_err();
        assert!(matches!(err, WtpError::InvalidHeader));
    }

    #[test]
    fn segment_with_trailers_marks_gtr_and_ttr_on_last_segment_only() {
        let data = vec![0u8; SAR_SEGM_SIZE * 3];
        let segments = segment_with_trailers(&data).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].psn, 0);
        assert!(!segments[0].gtr && !segments[0].ttr);
        assert!(!segments[1].gtr && !segments[1].ttr);
        assert_eq!(segments[2].psn, 2);
        assert!(segments[2].gtr && segments[2].ttr);
    }
}
