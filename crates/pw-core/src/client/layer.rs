//! Drawing surface handles
//!
//! Visible layers are numbered from 1 upwards, off-screen buffers from -1
//! downwards, and 0 is the default layer that always exists. Each kind is
//! backed by its own index pool, so pool value `n` maps to layer `n + 1` or
//! buffer `-n - 1`.

use std::fmt;

/// Layer or buffer index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layer(i32);

impl Layer {
    /// The default layer; never allocated or freed
    pub const DEFAULT: Layer = Layer(0);

    pub fn index(self) -> i32 {
        self.0
    }

    /// On-screen layer other than the default
    pub fn is_layer(self) -> bool {
        self.0 > 0
    }

    /// Off-screen buffer
    pub fn is_buffer(self) -> bool {
        self.0 < 0
    }

    pub fn is_default(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn from_layer_slot(slot: u32) -> Option<Self> {
        i32::try_from(slot).ok()?.checked_add(1).map(Self)
    }

    pub(crate) fn from_buffer_slot(slot: u32) -> Option<Self> {
        i32::try_from(slot).ok()?.checked_neg()?.checked_sub(1).map(Self)
    }

    /// Pool value behind a layer
    pub(crate) fn layer_slot(self) -> Option<u32> {
        if self.is_layer() {
            u32::try_from(self.0 - 1).ok()
        } else {
            None
        }
    }

    /// Pool value behind a buffer
    pub(crate) fn buffer_slot(self) -> Option<u32> {
        if self.is_buffer() {
            u32::try_from(-(self.0 + 1)).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
