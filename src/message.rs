//! # Message Model and Wire Codec
//!
//! This module defines the canonical in-memory message model shared by every
//! component of the bearerbox core, and the length-prefixed binary codec used
//! to frame messages between bearerbox and its box peers (smsbox/wapbox) and
//! to persist them in the message store.
//!
//! ## Wire Format
//!
//! Every field serializes as either a 32-bit big-endian signed integer or a
//! length-prefixed byte string (length `-1` encodes an absent value, any
//! other non-negative length is an exact byte count). The whole message is
//! prefixed by its own 32-bit total length; the first inner field is always
//! the variant tag. This mirrors Kannel's own `octstr_pack`/`msg_unpack`
//! wire layout closely enough that a real box peer's framing expectations
//! are met: one `u32` length, then that many bytes of packed fields.

use std::io::{self, Cursor, Read};

use thiserror::Error;

/// Errors produced while encoding or decoding a [`Message`] or a raw frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of frame while reading {0}")]
    Truncated(&'static str),

    #[error("frame length {0} exceeds maximum allowed size {1}")]
    FrameTooLarge(u32, u32),

    #[error("unknown message variant tag {0}")]
    UnknownVariant(i32),

    #[error("unknown enum value {1} for field {0}")]
    UnknownEnumValue(&'static str, i32),

    #[error("negative length {0} is not a valid absent-value marker")]
    InvalidLength(i32),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Maximum frame size accepted on any wire or store path: 16 MiB.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// SMS character coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coding {
    #[default]
    Undef,
    Bits7,
    Bits8,
    Ucs2,
}

impl Coding {
    fn to_i32(self) -> i32 {
        match self {
            Coding::Undef => 0,
            Coding::Bits7 => 1,
            Coding::Bits8 => 2,
            Coding::Ucs2 => 3,
        }
    }

    fn from_i32(v: i32) -> Result<Self, CodecError> {
        match v {
            0 => Ok(Coding::Undef),
            1 => Ok(Coding::Bits7),
            2 => Ok(Coding::Bits8),
            3 => Ok(Coding::Ucs2),
            other => Err(CodecError::UnknownEnumValue("coding", other)),
        }
    }
}

/// Disposition of an SMS within the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmsType {
    #[default]
    Mo,
    MtReply,
    MtPush,
    Report,
}

impl SmsType {
    fn to_i32(self) -> i32 {
        match self {
            SmsType::Mo => 0,
            SmsType::MtReply => 1,
            SmsType::MtPush => 2,
            SmsType::Report => 3,
        }
    }

    fn from_i32(v: i32) -> Result<Self, CodecError> {
        match v {
            0 => Ok(SmsType::Mo),
            1 => Ok(SmsType::MtReply),
            2 => Ok(SmsType::MtPush),
            3 => Ok(SmsType::Report),
            other => Err(CodecError::UnknownEnumValue("sms_type", other)),
        }
    }
}

/// Reason an SMS failed delivery, attached to an `ack` record/message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NackReason {
    #[default]
    None,
    Failed,
    FailedTmp,
    Rejected,
}

impl NackReason {
    fn to_i32(self) -> i32 {
        match self {
            NackReason::None => 0,
            NackReason::Failed => 1,
            NackReason::FailedTmp => 2,
            NackReason::Rejected => 3,
        }
    }

    fn from_i32(v: i32) -> Result<Self, CodecError> {
        match v {
            0 => Ok(NackReason::None),
            1 => Ok(NackReason::Failed),
            2 => Ok(NackReason::FailedTmp),
            3 => Ok(NackReason::Rejected),
            other => Err(CodecError::UnknownEnumValue("nack_reason", other)),
        }
    }
}

/// Admin command carried by an `admin` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Shutdown,
    Suspend,
    Resume,
    Identify,
}

impl AdminCommand {
    fn to_i32(self) -> i32 {
        match self {
            AdminCommand::Shutdown => 0,
            AdminCommand::Suspend => 1,
            AdminCommand::Resume => 2,
            AdminCommand::Identify => 3,
        }
    }

    fn from_i32(v: i32) -> Result<Self, CodecError> {
        match v {
            0 => Ok(AdminCommand::Shutdown),
            1 => Ok(AdminCommand::Suspend),
            2 => Ok(AdminCommand::Resume),
            3 => Ok(AdminCommand::Identify),
            other => Err(CodecError::UnknownEnumValue("admin_command", other)),
        }
    }
}

/// An in-flight SMS, the unit of work routed between SMSC and box connections.
#[derive(Debug, Clone, Default)]
pub struct Sms {
    pub sender: Option<Vec<u8>>,
    pub receiver: Option<Vec<u8>>,
    pub msgdata: Option<Vec<u8>>,
    pub udhdata: Option<Vec<u8>>,
    pub coding: Coding,
    pub mclass: i32,
    pub mwi: i32,
    pub alt_dcs: i32,
    pub pid: i32,
    pub validity: i32,
    pub deferred: i32,
    pub time: i64,
    /// Unique id, assigned exactly once at first `store_save`. Zero means unassigned.
    pub id: u64,
    pub smsc_id: Option<Vec<u8>>,
    pub boxc_id: Option<Vec<u8>>,
    pub service: Option<Vec<u8>>,
    pub account: Option<Vec<u8>>,
    pub binfo: Option<Vec<u8>>,
    pub dlr_url: Option<Vec<u8>>,
    pub dlr_mask: i32,
    pub sms_type: SmsType,
}

/// Acknowledgement of an SMS reaching a terminal state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ack {
    pub id: u64,
    pub time: i64,
    pub nack_reason: NackReason,
}

/// A WAP datagram, the unit of work on the WTP ingress/egress queues.
#[derive(Debug, Clone, Default)]
pub struct WdpDatagram {
    pub source_address: Vec<u8>,
    pub source_port: u16,
    pub destination_address: Vec<u8>,
    pub destination_port: u16,
    pub user_data: Vec<u8>,
}

/// Periodic load report from a box peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Heartbeat {
    pub load: i64,
}

/// Control command carried between bearerbox and a box peer or admin client.
#[derive(Debug, Clone)]
pub struct Admin {
    pub command: AdminCommand,
    pub boxc_id: Option<Vec<u8>>,
}

/// The tagged union of every message kind that moves through a queue or
/// across a box/wire connection.
#[derive(Debug, Clone)]
pub enum Message {
    Sms(Sms),
    Ack(Ack),
    WdpDatagram(WdpDatagram),
    Heartbeat(Heartbeat),
    Admin(Admin),
}

const TAG_SMS: i32 = 0;
const TAG_ACK: i32 = 1;
const TAG_WDP: i32 = 2;
const TAG_HEARTBEAT: i32 = 3;
const TAG_ADMIN: i32 = 4;

impl Message {
    pub fn sms_type_name(&self) -> &'static str {
        match self {
            Message::Sms(_) => "sms",
            Message::Ack(_) => "ack",
            Message::WdpDatagram(_) => "wdp_datagram",
            Message::Heartbeat(_) => "heartbeat",
            Message::Admin(_) => "admin",
        }
    }

    /// Encode this message into a length-prefixed frame: `u32 total_len` then
    /// `total_len` bytes of packed fields, the first of which is the variant tag.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(64);
        match self {
            Message::Sms(sms) => {
                write_i32(&mut body, TAG_SMS);
                write_bytes_opt(&mut body, sms.sender.as_deref());
                write_bytes_opt(&mut body, sms.receiver.as_deref());
                write_bytes_opt(&mut body, sms.msgdata.as_deref());
                write_bytes_opt(&mut body, sms.udhdata.as_deref());
                write_i32(&mut body, sms.coding.to_i32());
                write_i32(&mut body, sms.mclass);
                write_i32(&mut body, sms.mwi);
                write_i32(&mut body, sms.alt_dcs);
                write_i32(&mut body, sms.pid);
                write_i32(&mut body, sms.validity);
                write_i32(&mut body, sms.deferred);
                write_i64(&mut body, sms.time);
                write_i64(&mut body, sms.id as i64);
                write_bytes_opt(&mut body, sms.smsc_id.as_deref());
                write_bytes_opt(&mut body, sms.boxc_id.as_deref());
                write_bytes_opt(&mut body, sms.service.as_deref());
                write_bytes_opt(&mut body, sms.account.as_deref());
                write_bytes_opt(&mut body, sms.binfo.as_deref());
                write_bytes_opt(&mut body, sms.dlr_url.as_deref());
                write_i32(&mut body, sms.dlr_mask);
                write_i32(&mut body, sms.sms_type.to_i32());
            }
            Message::Ack(ack) => {
                write_i32(&mut body, TAG_ACK);
                write_i64(&mut body, ack.id as i64);
                write_i64(&mut body, ack.time);
                write_i32(&mut body, ack.nack_reason.to_i32());
            }
            Message::WdpDatagram(dg) => {
                write_i32(&mut body, TAG_WDP);
                write_bytes_opt(&mut body, Some(&dg.source_address));
                write_i32(&mut body, dg.source_port as i32);
                write_bytes_opt(&mut body, Some(&dg.destination_address));
                write_i32(&mut body, dg.destination_port as i32);
                write_bytes_opt(&mut body, Some(&dg.user_data));
            }
            Message::Heartbeat(hb) => {
                write_i32(&mut body, TAG_HEARTBEAT);
                write_i64(&mut body, hb.load);
            }
            Message::Admin(admin) => {
                write_i32(&mut body, TAG_ADMIN);
                write_i32(&mut body, admin.command.to_i32());
                write_bytes_opt(&mut body, admin.boxc_id.as_deref());
            }
        }

        let mut frame = Vec::with_capacity(body.len() + 4);
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    /// Decode a single message from the field stream of an already-length-delimited body.
    pub fn decode_body(body: &[u8]) -> Result<Self, CodecError> {
        let mut cur = Cursor::new(body);
        let tag = read_i32(&mut cur)?;
        match tag {
            TAG_SMS => {
                let sender = read_bytes_opt(&mut cur)?;
                let receiver = read_bytes_opt(&mut cur)?;
                let msgdata = read_bytes_opt(&mut cur)?;
                let udhdata = read_bytes_opt(&mut cur)?;
                let coding = Coding::from_i32(read_i32(&mut cur)?)?;
                let mclass = read_i32(&mut cur)?;
                let mwi = read_i32(&mut cur)?;
                let alt_dcs = read_i32(&mut cur)?;
                let pid = read_i32(&mut cur)?;
                let validity = read_i32(&mut cur)?;
                let deferred = read_i32(&mut cur)?;
                let time = read_i64(&mut cur)?;
                let id = read_i64(&mut cur)? as u64;
                let smsc_id = read_bytes_opt(&mut cur)?;
                let boxc_id = read_bytes_opt(&mut cur)?;
                let service = read_bytes_opt(&mut cur)?;
                let account = read_bytes_opt(&mut cur)?;
                let binfo = read_bytes_opt(&mut cur)?;
                let dlr_url = read_bytes_opt(&mut cur)?;
                let dlr_mask = read_i32(&mut cur)?;
                let sms_type = SmsType::from_i32(read_i32(&mut cur)?)?;
                Ok(Message::Sms(Sms {
                    sender,
                    receiver,
                    msgdata,
                    udhdata,
                    coding,
                    mclass,
                    mwi,
                    alt_dcs,
                    pid,
                    validity,
                    deferred,
                    time,
                    id,
                    smsc_id,
                    boxc_id,
                    service,
                    account,
                    binfo,
                    dlr_url,
                    dlr_mask,
                    sms_type,
                }))
            }
            TAG_ACK => {
                let id = read_i64(&mut cur)? as u64;
                let time = read_i64(&mut cur)?;
                let nack_reason = NackReason::from_i32(read_i32(&mut cur)?)?;
                Ok(Message::Ack(Ack {
                    id,
                    time,
                    nack_reason,
                }))
            }
            TAG_WDP => {
                let source_address = read_bytes_opt(&mut cur)?.unwrap_or_default();
                let source_port = read_i32(&mut cur)? as u16;
                let destination_address = read_bytes_opt(&mut cur)?.unwrap_or_default();
                let destination_port = read_i32(&mut cur)? as u16;
                let user_data = read_bytes_opt(&mut cur)?.unwrap_or_default();
                Ok(Message::WdpDatagram(WdpDatagram {
                    source_address,
                    source_port,
                    destination_address,
                    destination_port,
                    user_data,
                }))
            }
            TAG_HEARTBEAT => {
                let load = read_i64(&mut cur)?;
                Ok(Message::Heartbeat(Heartbeat { load }))
            }
            TAG_ADMIN => {
                let command = AdminCommand::from_i32(read_i32(&mut cur)?)?;
                let boxc_id = read_bytes_opt(&mut cur)?;
                Ok(Message::Admin(Admin { command, boxc_id }))
            }
            other => Err(CodecError::UnknownVariant(other)),
        }
    }
}

fn write_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_i64(out: &mut Vec<u8>, v: i64) {
    // Encoded as two consecutive 32-bit big-endian words (high, then low) to
    // stay within the spec's "every field is a 32-bit int or byte string"
    // wire description while still carrying 64-bit ids and timestamps.
    write_i32(out, (v >> 32) as i32);
    write_i32(out, v as i32);
}

fn write_bytes_opt(out: &mut Vec<u8>, v: Option<&[u8]>) {
    match v {
        None => write_i32(out, -1),
        Some(bytes) => {
            write_i32(out, bytes.len() as i32);
            out.extend_from_slice(bytes);
        }
    }
}

fn read_i32(cur: &mut Cursor<&[u8]>) -> Result<i32, CodecError> {
    let mut buf = [0u8; 4];
    cur.read_exact(&mut buf)
        .map_err(|_| CodecError::Truncated("i32 field"))?;
    Ok(i32::from_be_bytes(buf))
}

fn read_i64(cur: &mut Cursor<&[u8]>) -> Result<i64, CodecError> {
    let hi = read_i32(cur)? as i64;
    let lo = read_i32(cur)? as u32 as i64;
    Ok((hi << 32) | lo)
}

fn read_bytes_opt(cur: &mut Cursor<&[u8]>) -> Result<Option<Vec<u8>>, CodecError> {
    let len = read_i32(cur)?;
    if len == -1 {
        return Ok(None);
    }
    if len < -1 {
        return Err(CodecError::InvalidLength(len));
    }
    let mut buf = vec![0u8; len as usize];
    cur.read_exact(&mut buf)
        .map_err(|_| CodecError::Truncated("byte string field"))?;
    Ok(Some(buf))
}

/// Read one length-prefixed frame body from an async reader (§6.1 inter-box framing).
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, CodecError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len, MAX_FRAME_LEN));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write one length-prefixed frame for a message to an async writer.
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> Result<(), CodecError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    let frame = message.encode();
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
