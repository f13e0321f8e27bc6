//! C ABI for linking meshnet-core as a static library into C/C++ firmware hosts.
//!
//! Entry points that produce actions serialize them into a caller buffer:
//! 4 bytes count (LE), then per action: 1 byte kind (0 = send, 1 = deliver),
//! 6 bytes address (destination for send, source for deliver), 2 bytes
//! length (LE), then the bytes (frame for send, payload for deliver).
//!
//! Each entry point emits at most one action. Buffers shorter than
//! `MESHNET_MAX_ACTIONS_LEN` are rejected before the engine runs, so a `-1`
//! never loses engine output.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::slice;

use crate::address::{PhysicalAddress, ADDRESS_LEN};
use crate::engine::{Action, MeshEngine};
use crate::wire::MAX_FRAME_LEN;

/// Action kind byte for a frame the host must transmit.
pub const ACTION_SEND: u8 = 0;
/// Action kind byte for a payload delivered to the application.
pub const ACTION_DELIVER: u8 = 1;

const ACTION_HEADER: usize = 1 + ADDRESS_LEN + 2;

/// Output buffer size that always fits the actions of one entry point call.
#[no_mangle]
pub static MESHNET_MAX_ACTIONS_LEN: usize = 4 + ACTION_HEADER + MAX_FRAME_LEN;

fn out_buf_ok(out_buf: *mut u8, out_buf_len: usize) -> bool {
    !out_buf.is_null() && out_buf_len >= MESHNET_MAX_ACTIONS_LEN
}

unsafe fn read_address(ptr: *const u8) -> PhysicalAddress {
    let mut bytes = [0u8; ADDRESS_LEN];
    bytes.copy_from_slice(slice::from_raw_parts(ptr, ADDRESS_LEN));
    PhysicalAddress::new(bytes)
}

/// Create an engine with the default configuration for the 6-byte address at
/// `address_6`. Returns opaque handle, or null if the address is null or broadcast.
#[no_mangle]
pub extern "C" fn meshnet_engine_create(address_6: *const u8) -> *mut c_void {
    if address_6.is_null() {
        return std::ptr::null_mut();
    }
    let address = unsafe { read_address(address_6) };
    match MeshEngine::new(address) {
        Ok(engine) => Box::into_raw(Box::new(engine)) as *mut c_void,
        Err(_) => std::ptr::null_mut(),
    }
}

/// Destroy engine. No-op if h is null.
#[no_mangle]
pub extern "C" fn meshnet_engine_destroy(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let _ = unsafe { Box::from_raw(h as *mut MeshEngine) };
}

/// Set gateway mode (non-zero = gateway). Returns 0, or -1 if h is null.
#[no_mangle]
pub extern "C" fn meshnet_engine_set_gateway(h: *mut c_void, gateway: c_int) -> c_int {
    if h.is_null() {
        return -1;
    }
    let engine = unsafe { &mut *(h as *mut MeshEngine) };
    engine.set_gateway_mode(gateway != 0);
    0
}

/// Number of known peers, or -1 if h is null.
#[no_mangle]
pub extern "C" fn meshnet_engine_peer_count(h: *mut c_void) -> c_int {
    if h.is_null() {
        return -1;
    }
    let engine = unsafe { &*(h as *const MeshEngine) };
    engine.peer_count() as c_int
}

/// Write the nearest gateway's address to out_6. Returns 1 if found, 0 if none, -1 on error.
#[no_mangle]
pub extern "C" fn meshnet_engine_nearest_gateway(h: *mut c_void, out_6: *mut u8) -> c_int {
    if h.is_null() || out_6.is_null() {
        return -1;
    }
    let engine = unsafe { &*(h as *const MeshEngine) };
    match engine.nearest_gateway() {
        Some(peer) => {
            unsafe {
                out_6.copy_from_nonoverlapping(peer.address.as_bytes().as_ptr(), ADDRESS_LEN);
            }
            1
        }
        None => 0,
    }
}

/// Periodic tick at `now_ms`. Returns bytes written to out_buf, or -1 on error.
/// All action-producing calls need `out_buf_len >= MESHNET_MAX_ACTIONS_LEN`.
#[no_mangle]
pub extern "C" fn meshnet_engine_tick(
    h: *mut c_void,
    now_ms: u64,
    out_buf: *mut u8,
    out_buf_len: usize,
) -> c_int {
    if h.is_null() || !out_buf_ok(out_buf, out_buf_len) {
        return -1;
    }
    let engine = unsafe { &mut *(h as *mut MeshEngine) };
    let actions = engine.on_tick(now_ms);
    write_actions(&actions, out_buf, out_buf_len)
}

/// Feed one received frame. Returns bytes written to out_buf, or -1 on error.
#[no_mangle]
pub extern "C" fn meshnet_engine_receive(
    h: *mut c_void,
    frame: *const u8,
    frame_len: usize,
    now_ms: u64,
    out_buf: *mut u8,
    out_buf_len: usize,
) -> c_int {
    if h.is_null() || frame.is_null() || !out_buf_ok(out_buf, out_buf_len) {
        return -1;
    }
    let engine = unsafe { &mut *(h as *mut MeshEngine) };
    let bytes = unsafe { slice::from_raw_parts(frame, frame_len) };
    let actions = engine.on_receive(bytes, now_ms);
    write_actions(&actions, out_buf, out_buf_len)
}

/// Send data to the 6-byte destination. Returns bytes written to out_buf, or -1 on error.
#[no_mangle]
pub extern "C" fn meshnet_engine_send_data(
    h: *mut c_void,
    destination_6: *const u8,
    data: *const u8,
    data_len: usize,
    out_buf: *mut u8,
    out_buf_len: usize,
) -> c_int {
    if h.is_null()
        || destination_6.is_null()
        || (data.is_null() && data_len > 0)
        || !out_buf_ok(out_buf, out_buf_len)
    {
        return -1;
    }
    let engine = unsafe { &mut *(h as *mut MeshEngine) };
    let destination = unsafe { read_address(destination_6) };
    let payload: &[u8] = if data_len == 0 {
        &[]
    } else {
        unsafe { slice::from_raw_parts(data, data_len) }
    };
    let actions = engine.send_data(destination, payload);
    write_actions(&actions, out_buf, out_buf_len)
}

/// Broadcast a Discovery. Returns bytes written to out_buf, or -1 on error.
#[no_mangle]
pub extern "C" fn meshnet_engine_send_discovery(
    h: *mut c_void,
    out_buf: *mut u8,
    out_buf_len: usize,
) -> c_int {
    if h.is_null() || !out_buf_ok(out_buf, out_buf_len) {
        return -1;
    }
    let engine = unsafe { &mut *(h as *mut MeshEngine) };
    let actions = engine.send_discovery();
    write_actions(&actions, out_buf, out_buf_len)
}

/// Serialize actions to out_buf. Returns bytes written, or -1 if they do not fit.
fn write_actions(actions: &[Action], out_buf: *mut u8, out_buf_len: usize) -> c_int {
    let need = 4 + actions
        .iter()
        .map(|a| match a {
            Action::Send(_, bytes) | Action::Deliver(_, bytes) => ACTION_HEADER + bytes.len(),
        })
        .sum::<usize>();
    if out_buf_len < need {
        return -1;
    }
    let buf = unsafe { slice::from_raw_parts_mut(out_buf, out_buf_len) };
    buf[0..4].copy_from_slice(&(actions.len() as u32).to_le_bytes());
    let mut off = 4;
    for a in actions {
        let (kind, address, bytes) = match a {
            Action::Send(to, frame) => (ACTION_SEND, to, frame),
            Action::Deliver(from, payload) => (ACTION_DELIVER, from, payload),
        };
        buf[off] = kind;
        buf[off + 1..off + 1 + ADDRESS_LEN].copy_from_slice(address.as_bytes());
        off += 1 + ADDRESS_LEN;
        buf[off..off + 2].copy_from_slice(&(bytes.len() as u16).to_le_bytes());
        off += 2;
        buf[off..off + bytes.len()].copy_from_slice(bytes);
        off += bytes.len();
    }
    off as c_int
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire;

    const A: [u8; 6] = [0x02, 0, 0, 0, 0, 0x01];
    const B: [u8; 6] = [0x02, 0, 0, 0, 0, 0x02];

    /// Parse the action buffer back into (kind, address, bytes) triples.
    fn parse(buf: &[u8]) -> Vec<(u8, [u8; 6], Vec<u8>)> {
        let count = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        let mut off = 4;
        let mut out = Vec::new();
        for _ in 0..count {
            let kind = buf[off];
            let addr: [u8; 6] = buf[off + 1..off + 7].try_into().unwrap();
            let len = u16::from_le_bytes([buf[off + 7], buf[off + 8]]) as usize;
            off += ACTION_HEADER;
            out.push((kind, addr, buf[off..off + len].to_vec()));
            off += len;
        }
        out
    }

    fn receive(h: *mut c_void, frame: &[u8], now_ms: u64, out: &mut [u8]) -> c_int {
        meshnet_engine_receive(h, frame.as_ptr(), frame.len(), now_ms, out.as_mut_ptr(), out.len())
    }

    #[test]
    fn create_rejects_null_and_broadcast() {
        assert!(meshnet_engine_create(std::ptr::null()).is_null());
        let bcast = [0xFFu8; 6];
        assert!(meshnet_engine_create(bcast.as_ptr()).is_null());
        meshnet_engine_destroy(std::ptr::null_mut());
    }

    #[test]
    fn discovery_exchange_through_c_abi() {
        let a = meshnet_engine_create(A.as_ptr());
        let b = meshnet_engine_create(B.as_ptr());
        assert!(!a.is_null() && !b.is_null());
        assert_eq!(meshnet_engine_set_gateway(a, 1), 0);

        let mut buf = vec![0u8; 1024];
        let n = meshnet_engine_send_discovery(a, buf.as_mut_ptr(), buf.len());
        assert!(n > 0);
        let actions = parse(&buf[..n as usize]);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].0, ACTION_SEND);
        assert_eq!(actions[0].1, [0xFF; 6]);

        let frame = actions[0].2.clone();
        let mut out = vec![0u8; 1024];
        let n = receive(b, &frame, 10, &mut out);
        let replies = parse(&out[..n as usize]);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1, A);
        assert_eq!(meshnet_engine_peer_count(b), 1);

        let mut gw = [0u8; 6];
        assert_eq!(meshnet_engine_nearest_gateway(b, gw.as_mut_ptr()), 1);
        assert_eq!(gw, A);
        assert_eq!(meshnet_engine_nearest_gateway(a, gw.as_mut_ptr()), 0);

        meshnet_engine_destroy(a);
        meshnet_engine_destroy(b);
    }

    #[test]
    fn send_data_and_deliver() {
        let a = meshnet_engine_create(A.as_ptr());
        let b = meshnet_engine_create(B.as_ptr());
        let data = b"ping";
        let mut buf = vec![0u8; 512];
        let n = meshnet_engine_send_data(
            a,
            B.as_ptr(),
            data.as_ptr(),
            data.len(),
            buf.as_mut_ptr(),
            buf.len(),
        );
        let sent = parse(&buf[..n as usize]);
        assert_eq!(sent[0].1, B);
        let msg = wire::decode_frame(&sent[0].2).unwrap();
        assert_eq!(msg.payload, data);

        let mut out = vec![0u8; 512];
        let n = receive(b, &sent[0].2, 0, &mut out);
        let delivered = parse(&out[..n as usize]);
        assert_eq!(delivered, vec![(ACTION_DELIVER, A, data.to_vec())]);

        meshnet_engine_destroy(a);
        meshnet_engine_destroy(b);
    }

    #[test]
    fn small_buffer_and_null_handle() {
        let a = meshnet_engine_create(A.as_ptr());
        let mut tiny = [0u8; 8];
        assert_eq!(meshnet_engine_send_discovery(a, tiny.as_mut_ptr(), tiny.len()), -1);
        let mut buf = vec![0u8; MESHNET_MAX_ACTIONS_LEN];
        // Nothing due yet: empty action list.
        assert_eq!(meshnet_engine_tick(a, 0, buf.as_mut_ptr(), buf.len()), 4);
        let null = std::ptr::null_mut();
        assert_eq!(meshnet_engine_tick(null, 0, buf.as_mut_ptr(), buf.len()), -1);
        assert_eq!(meshnet_engine_peer_count(null), -1);
        meshnet_engine_destroy(a);
    }

    #[test]
    fn short_buffer_rejected_before_engine_runs() {
        let a = meshnet_engine_create(A.as_ptr());
        let b = meshnet_engine_create(B.as_ptr());
        let data = b"ping";
        let mut buf = vec![0u8; MESHNET_MAX_ACTIONS_LEN];
        let n = meshnet_engine_send_data(
            a,
            B.as_ptr(),
            data.as_ptr(),
            data.len(),
            buf.as_mut_ptr(),
            buf.len(),
        );
        let frame = parse(&buf[..n as usize])[0].2.clone();

        // Too small for the worst case: nothing happens, not even a peer insert.
        let mut short = vec![0u8; MESHNET_MAX_ACTIONS_LEN - 1];
        assert_eq!(receive(b, &frame, 0, &mut short), -1);
        assert_eq!(meshnet_engine_peer_count(b), 0);

        // The same frame can be fed again with a proper buffer.
        let n = receive(b, &frame, 0, &mut buf);
        assert_eq!(parse(&buf[..n as usize]), vec![(ACTION_DELIVER, A, data.to_vec())]);
        assert_eq!(meshnet_engine_peer_count(b), 1);

        // Sequence counter untouched by a rejected call.
        let mut tiny = [0u8; 8];
        assert_eq!(meshnet_engine_send_discovery(a, tiny.as_mut_ptr(), tiny.len()), -1);
        let n = meshnet_engine_send_discovery(a, buf.as_mut_ptr(), buf.len());
        let msg = wire::decode_frame(&parse(&buf[..n as usize])[0].2).unwrap();
        assert_eq!(msg.sequence, 1);

        meshnet_engine_destroy(a);
        meshnet_engine_destroy(b);
    }
}
