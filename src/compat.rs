//! Small re-export shim so the rest of the crate spells atomics one way.

pub use std::{
    boxed::Box,
    cell::UnsafeCell,
    string::{String, ToString},
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    vec::Vec,
};

pub use hashbrown::HashMap;
