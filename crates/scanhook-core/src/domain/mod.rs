//! Platform-neutral value types shared by the framer, the router, and the
//! capture backends.
//!
//! Nothing in this module touches an OS API. Backends translate their native
//! structures (raw-input payloads, hook structs, libinput events) into these
//! types at the FFI boundary and everything downstream is portable.

pub mod device;
pub mod framing;
