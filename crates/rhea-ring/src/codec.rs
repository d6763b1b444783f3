//! Binary pack/unpack for the three record shapes carried over the ring:
//! `Standard`, `Frames`, and `Bytes`. All integers are little-endian; the
//! first byte of every packed record is its serialization tag.
//!
//! Decoded `Frames` and `Bytes` records borrow from the buffer they were
//! unpacked from rather than copying. This is the codec's core performance
//! contract: the hot decode path never allocates. A caller that needs a
//! record to outlive its source buffer must clone the borrowed slice itself.

use crate::invariants::debug_assert_packed_len;
use std::convert::TryFrom;

const TAG_STANDARD: u8 = 1;
const TAG_FRAMES: u8 = 2;
const TAG_BYTES: u8 = 3;

/// Errors raised while packing or unpacking a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid serialization tag: expected {expected}, found {found}")]
    InvalidTag { expected: u8, found: u8 },
    #[error("destination too small: need {needed} bytes, have {available}")]
    OutOfRange { needed: usize, available: usize },
    #[error("source buffer is empty")]
    NullInput,
    #[error("unknown entry type tag: {0}")]
    UnknownType(u8),
}

#[inline]
const fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

macro_rules! entry_types {
    ($(($variant:ident, $text:literal)),* $(,)?) => {
        /// The ~90 event kinds a [`Record`] can carry. Discriminants are
        /// assigned by declaration order and are part of the on-wire format.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EntryType {
            $($variant,)*
        }

        impl EntryType {
            const VARIANTS: &'static [EntryType] = &[$(EntryType::$variant),*];

            /// The stable textual name written into trace file body lines.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(EntryType::$variant => $text,)*
                }
            }
        }

        impl TryFrom<u8> for EntryType {
            type Error = CodecError;

            fn try_from(value: u8) -> Result<Self, CodecError> {
                EntryType::VARIANTS.get(value as usize).copied().ok_or(CodecError::UnknownType(value))
            }
        }
    };
}

entry_types! {
    (UnknownType, "UNKNOWN_TYPE"),
    (UiInputStart, "UI_INPUT_START"),
    (UiInputEnd, "UI_INPUT_END"),
    (UiUpdateStart, "UI_UPDATE_START"),
    (UiUpdateEnd, "UI_UPDATE_END"),
    (NetAdded, "NET_ADDED"),
    (NetCancel, "NET_CANCEL"),
    (NetChangepri, "NET_CHANGEPRI"),
    (NetError, "NET_ERROR"),
    (NetEnd, "NET_END"),
    (NetResponse, "NET_RESPONSE"),
    (NetRetry, "NET_RETRY"),
    (NetStart, "NET_START"),
    (NetCounter, "NET_COUNTER"),
    (CallStart, "CALL_START"),
    (CallEnd, "CALL_END"),
    (AsyncCall, "ASYNC_CALL"),
    (ServConn, "SERV_CONN"),
    (ServDisconn, "SERV_DISCONN"),
    (ServEnd, "SERV_END"),
    (AdapterNotify, "ADAPTER_NOTIFY"),
    (MarkFlag, "MARK_FLAG"),
    (MarkPush, "MARK_PUSH"),
    (MarkPop, "MARK_POP"),
    (LifecycleApplicationStart, "LIFECYCLE_APPLICATION_START"),
    (LifecycleApplicationEnd, "LIFECYCLE_APPLICATION_END"),
    (LifecycleActivityStart, "LIFECYCLE_ACTIVITY_START"),
    (LifecycleActivityEnd, "LIFECYCLE_ACTIVITY_END"),
    (LifecycleServiceStart, "LIFECYCLE_SERVICE_START"),
    (LifecycleServiceEnd, "LIFECYCLE_SERVICE_END"),
    (LifecycleBroadcastReceiverStart, "LIFECYCLE_BROADCAST_RECEIVER_START"),
    (LifecycleBroadcastReceiverEnd, "LIFECYCLE_BROADCAST_RECEIVER_END"),
    (LifecycleContentProviderStart, "LIFECYCLE_CONTENT_PROVIDER_START"),
    (LifecycleContentProviderEnd, "LIFECYCLE_CONTENT_PROVIDER_END"),
    (LifecycleFragmentStart, "LIFECYCLE_FRAGMENT_START"),
    (LifecycleFragmentEnd, "LIFECYCLE_FRAGMENT_END"),
    (LifecycleViewStart, "LIFECYCLE_VIEW_START"),
    (LifecycleViewEnd, "LIFECYCLE_VIEW_END"),
    (TraceAbort, "TRACE_ABORT"),
    (TraceEnd, "TRACE_END"),
    (TraceStart, "TRACE_START"),
    (TraceBackwards, "TRACE_BACKWARDS"),
    (TraceTimeout, "TRACE_TIMEOUT"),
    (BlackboxTraceStart, "BLACKBOX_TRACE_START"),
    (Counter, "COUNTER"),
    (StackFrame, "STACK_FRAME"),
    (QplStart, "QPL_START"),
    (QplEnd, "QPL_END"),
    (QplCancel, "QPL_CANCEL"),
    (QplNote, "QPL_NOTE"),
    (QplPoint, "QPL_POINT"),
    (QplEvent, "QPL_EVENT"),
    (TraceAnnotation, "TRACE_ANNOTATION"),
    (WaitStart, "WAIT_START"),
    (WaitEnd, "WAIT_END"),
    (WaitSignal, "WAIT_SIGNAL"),
    (StringKey, "STRING_KEY"),
    (StringValue, "STRING_VALUE"),
    (QplTag, "QPL_TAG"),
    (QplAnnotation, "QPL_ANNOTATION"),
    (TraceThreadName, "TRACE_THREAD_NAME"),
    (TracePreEnd, "TRACE_PRE_END"),
    (TraceThreadPri, "TRACE_THREAD_PRI"),
    (MinorFault, "MINOR_FAULT"),
    (MajorFault, "MAJOR_FAULT"),
    (PerfeventsLost, "PERFEVENTS_LOST"),
    (ClassLoad, "CLASS_LOAD"),
    (JavascriptStackFrame, "JAVASCRIPT_STACK_FRAME"),
    (MessageStart, "MESSAGE_START"),
    (MessageEnd, "MESSAGE_END"),
    (ClassValue, "CLASS_VALUE"),
    (Http2RequestInitiated, "HTTP2_REQUEST_INITIATED"),
    (Http2FrameHeader, "HTTP2_FRAME_HEADER"),
    (Http2WindowUpdate, "HTTP2_WINDOW_UPDATE"),
    (Http2Priority, "HTTP2_PRIORITY"),
    (Http2EgressFrameHeader, "HTTP2_EGRESS_FRAME_HEADER"),
    (ProcessList, "PROCESS_LIST"),
    (IoStart, "IO_START"),
    (IoEnd, "IO_END"),
    (CpuCounter, "CPU_COUNTER"),
    (ClassLoadStart, "CLASS_LOAD_START"),
    (ClassLoadEnd, "CLASS_LOAD_END"),
    (ClassLoadFailed, "CLASS_LOAD_FAILED"),
    (StringName, "STRING_NAME"),
    (JavaFrameName, "JAVA_FRAME_NAME"),
    (BinderStart, "BINDER_START"),
    (BinderEnd, "BINDER_END"),
    (MemoryAllocation, "MEMORY_ALLOCATION"),
    (StkerrEmptystack, "STKERR_EMPTYSTACK"),
    (StkerrStackoverflow, "STKERR_STACKOVERFLOW"),
    (StkerrNostackforthread, "STKERR_NOSTACKFORTHREAD"),
    (StkerrSignalinterrupt, "STKERR_SIGNALINTERRUPT"),
    (StkerrNestedunwind, "STKERR_NESTEDUNWIND"),
    (Mapping, "MAPPING"),
    (LoggerPriority, "LOGGER_PRIORITY"),
    (ConditionalUploadRate, "CONDITIONAL_UPLOAD_RATE"),
    (NativeAlloc, "NATIVE_ALLOC"),
    (NativeFree, "NATIVE_FREE"),
    (NativeAllocFailure, "NATIVE_ALLOC_FAILURE"),
}

/// `{id, type, timestamp, tid, callid, matchid, extra}` - the fixed-size
/// record shape used for lifecycle markers, counters, and most punctual
/// events. Serialization tag 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardEntry {
    pub id: i32,
    pub entry_type: EntryType,
    pub timestamp: i64,
    pub tid: i32,
    pub callid: i32,
    pub matchid: i32,
    pub extra: i64,
}

/// `{id, type, timestamp, tid, matchid, frames:[i64]}` - a stack sample.
/// Serialization tag 2. `frames` is a borrowed little-endian `i64` array;
/// [`FramesEntry::get`] reads elements with an unaligned load so the borrow
/// never requires 8-byte alignment of the source buffer (which the codec
/// only guarantees to 4 bytes).
#[derive(Debug, Clone, Copy)]
pub struct FramesEntry<'a> {
    pub id: i32,
    pub entry_type: EntryType,
    pub timestamp: i64,
    pub tid: i32,
    pub matchid: i32,
    frames: &'a [u8],
}

impl<'a> FramesEntry<'a> {
    pub fn len(&self) -> usize {
        self.frames.len() / 8
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Reads the `i`-th frame value.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn get(&self, i: usize) -> i64 {
        let bytes: [u8; 8] = self.frames[i * 8..i * 8 + 8].try_into().unwrap();
        i64::from_le_bytes(bytes)
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// `{id, type, matchid, bytes:[u8]}` - a raw byte payload, used for interned
/// strings. Serialization tag 3. `bytes` is a borrowed slice into the source
/// buffer (no timestamp field, matching the original wire shape).
#[derive(Debug, Clone, Copy)]
pub struct BytesEntry<'a> {
    pub id: i32,
    pub entry_type: EntryType,
    pub matchid: i32,
    pub bytes: &'a [u8],
}

/// A decoded record: one of the three wire shapes. Variants holding borrowed
/// data are valid only as long as the buffer `unpack` was called on.
#[derive(Debug, Clone, Copy)]
pub enum Record<'a> {
    Standard(StandardEntry),
    Frames(FramesEntry<'a>),
    Bytes(BytesEntry<'a>),
}

impl<'a> Record<'a> {
    pub fn entry_type(&self) -> EntryType {
        match self {
            Record::Standard(e) => e.entry_type,
            Record::Frames(e) => e.entry_type,
            Record::Bytes(e) => e.entry_type,
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            Record::Standard(e) => e.id,
            Record::Frames(e) => e.id,
            Record::Bytes(e) => e.id,
        }
    }
}

/// Reads the serialization tag without decoding the rest of the record.
pub fn peek_type(src: &[u8]) -> Result<u8, CodecError> {
    src.first().copied().ok_or(CodecError::NullInput)
}

/// The exact number of bytes [`pack`] will write for `record`, including any
/// 4-byte alignment padding before a variable-length array.
pub fn calculate_size(record: &Record<'_>) -> usize {
    match record {
        Record::Standard(_) => 1 + 4 + 1 + 8 + 4 + 4 + 4 + 8,
        Record::Frames(e) => {
            let header = 1 + 4 + 1 + 8 + 4 + 4;
            let after_size_field = align4(header + 2);
            after_size_field + e.len() * 8
        }
        Record::Bytes(e) => {
            let header = 1 + 4 + 1 + 4;
            let after_size_field = align4(header + 2);
            after_size_field + e.bytes.len()
        }
    }
}

/// Packs `record` into `dst`. Returns the number of bytes written, always
/// equal to [`calculate_size`].
pub fn pack(record: &Record<'_>, dst: &mut [u8]) -> Result<usize, CodecError> {
    let needed = calculate_size(record);
    if dst.len() < needed {
        return Err(CodecError::OutOfRange { needed, available: dst.len() });
    }

    let written = match record {
        Record::Standard(e) => pack_standard(e, dst),
        Record::Frames(e) => pack_frames(e, dst),
        Record::Bytes(e) => pack_bytes(e, dst),
    };

    debug_assert_packed_len!(written, needed);
    Ok(written)
}

fn pack_standard(e: &StandardEntry, dst: &mut [u8]) -> usize {
    let mut off = 0;
    dst[off] = TAG_STANDARD;
    off += 1;
    dst[off..off + 4].copy_from_slice(&e.id.to_le_bytes());
    off += 4;
    dst[off] = e.entry_type as u8;
    off += 1;
    dst[off..off + 8].copy_from_slice(&e.timestamp.to_le_bytes());
    off += 8;
    dst[off..off + 4].copy_from_slice(&e.tid.to_le_bytes());
    off += 4;
    dst[off..off + 4].copy_from_slice(&e.callid.to_le_bytes());
    off += 4;
    dst[off..off + 4].copy_from_slice(&e.matchid.to_le_bytes());
    off += 4;
    dst[off..off + 8].copy_from_slice(&e.extra.to_le_bytes());
    off += 8;
    off
}

fn pack_frames(e: &FramesEntry<'_>, dst: &mut [u8]) -> usize {
    let mut off = 0;
    dst[off] = TAG_FRAMES;
    off += 1;
    dst[off..off + 4].copy_from_slice(&e.id.to_le_bytes());
    off += 4;
    dst[off] = e.entry_type as u8;
    off += 1;
    dst[off..off + 8].copy_from_slice(&e.timestamp.to_le_bytes());
    off += 8;
    dst[off..off + 4].copy_from_slice(&e.tid.to_le_bytes());
    off += 4;
    dst[off..off + 4].copy_from_slice(&e.matchid.to_le_bytes());
    off += 4;

    let count = e.len() as u16;
    dst[off..off + 2].copy_from_slice(&count.to_le_bytes());
    off += 2;
    off = align4(off);
    dst[off..off + e.frames.len()].copy_from_slice(e.frames);
    off += e.frames.len();
    off
}

fn pack_bytes(e: &BytesEntry<'_>, dst: &mut [u8]) -> usize {
    let mut off = 0;
    dst[off] = TAG_BYTES;
    off += 1;
    dst[off..off + 4].copy_from_slice(&e.id.to_le_bytes());
    off += 4;
    dst[off] = e.entry_type as u8;
    off += 1;
    dst[off..off + 4].copy_from_slice(&e.matchid.to_le_bytes());
    off += 4;

    let count = e.bytes.len() as u16;
    dst[off..off + 2].copy_from_slice(&count.to_le_bytes());
    off += 2;
    off = align4(off);
    dst[off..off + e.bytes.len()].copy_from_slice(e.bytes);
    off += e.bytes.len();
    off
}

/// Unpacks a record from `src`. The returned `Record`'s `Frames`/`Bytes`
/// variants borrow directly from `src` - see the module documentation.
pub fn unpack(src: &[u8]) -> Result<Record<'_>, CodecError> {
    let tag = peek_type(src)?;
    match tag {
        TAG_STANDARD => unpack_standard(src).map(Record::Standard),
        TAG_FRAMES => unpack_frames(src).map(Record::Frames),
        TAG_BYTES => unpack_bytes(src).map(Record::Bytes),
        other => Err(CodecError::UnknownType(other)),
    }
}

fn unpack_standard(src: &[u8]) -> Result<StandardEntry, CodecError> {
    check_tag(src, TAG_STANDARD)?;
    let mut off = 1;
    let id = read_i32(src, &mut off);
    let entry_type = EntryType::try_from(src[off])?;
    off += 1;
    let timestamp = read_i64(src, &mut off);
    let tid = read_i32(src, &mut off);
    let callid = read_i32(src, &mut off);
    let matchid = read_i32(src, &mut off);
    let extra = read_i64(src, &mut off);
    Ok(StandardEntry { id, entry_type, timestamp, tid, callid, matchid, extra })
}

fn unpack_frames(src: &[u8]) -> Result<FramesEntry<'_>, CodecError> {
    check_tag(src, TAG_FRAMES)?;
    let mut off = 1;
    let id = read_i32(src, &mut off);
    let entry_type = EntryType::try_from(src[off])?;
    off += 1;
    let timestamp = read_i64(src, &mut off);
    let tid = read_i32(src, &mut off);
    let matchid = read_i32(src, &mut off);
    let count = read_u16(src, &mut off) as usize;
    off = align4(off);
    let byte_len = count * 8;
    if src.len() < off + byte_len {
        return Err(CodecError::OutOfRange { needed: off + byte_len, available: src.len() });
    }
    let frames = &src[off..off + byte_len];
    Ok(FramesEntry { id, entry_type, timestamp, tid, matchid, frames })
}

fn unpack_bytes(src: &[u8]) -> Result<BytesEntry<'_>, CodecError> {
    check_tag(src, TAG_BYTES)?;
    let mut off = 1;
    let id = read_i32(src, &mut off);
    let entry_type = EntryType::try_from(src[off])?;
    off += 1;
    let matchid = read_i32(src, &mut off);
    let count = read_u16(src, &mut off) as usize;
    off = align4(off);
    if src.len() < off + count {
        return Err(CodecError::OutOfRange { needed: off + count, available: src.len() });
    }
    let bytes = &src[off..off + count];
    Ok(BytesEntry { id, entry_type, matchid, bytes })
}

fn check_tag(src: &[u8], expected: u8) -> Result<(), CodecError> {
    let found = peek_type(src)?;
    if found != expected {
        return Err(CodecError::InvalidTag { expected, found });
    }
    Ok(())
}

fn read_i32(src: &[u8], off: &mut usize) -> i32 {
    let v = i32::from_le_bytes(src[*off..*off + 4].try_into().unwrap());
    *off += 4;
    v
}

fn read_i64(src: &[u8], off: &mut usize) -> i64 {
    let v = i64::from_le_bytes(src[*off..*off + 8].try_into().unwrap());
    *off += 8;
    v
}

fn read_u16(src: &[u8], off: &mut usize) -> u16 {
    let v = u16::from_le_bytes(src[*off..*off + 2].try_into().unwrap());
    *off += 2;
    v
}
