//! Identity & lifetime registry.
//!
//! One registry per context, coordinating the two heaps:
//!
//! - the **export table** maps a host compound value's identity to the one
//!   guest-side stand-in for it, so exporting the same host value twice
//!   yields the same guest object, and keeps the host value alive while the
//!   stand-in is;
//! - the **pin table** holds the single strong guest reference backing all
//!   host-side handles of one guest value, as an arena of slots with a free
//!   list and per-slot reference counts.
//!
//! Mutation happens on the owning thread only: either from a proxy-creation
//! call or from a finalizer, and the guest collector runs finalizers
//! synchronously inside guest-driven operations, never on another thread.
//! Removal methods return the evicted values so callers can drop them after
//! releasing their borrow of the registry; a finalizer triggered by such a
//! drop re-enters the registry, which must not be borrowed at that point.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use hashbrown::HashMap;

use rivet_js::object::JsObject;
use rivet_js::Value;

use crate::host::HostValue;

/// Per-context table tracking live host↔guest pairings.
pub(crate) struct Registry {
    /// Host identity → its live guest-side stand-in.
    exported: HashMap<usize, ExportEntry>,
    /// Pinned guest values, arena-style.
    pins: Vec<Option<PinSlot>>,
    /// Free slots in `pins`.
    free: Vec<usize>,
    /// Guest object address → pin slot, for dedup.
    by_guest: HashMap<usize, usize>,
}

struct ExportEntry {
    /// Keeps the host side alive while the guest stand-in is.
    host: HostValue,
    /// The stand-in; weak so the guest collector stays in charge.
    guest: Weak<RefCell<JsObject>>,
}

struct PinSlot {
    /// The strong guest reference.
    value: Value,
    /// Number of live host-side handles sharing this slot.
    refs: usize,
    /// Guest object address, for `by_guest` cleanup.
    guest_ptr: usize,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            exported: HashMap::new(),
            pins: Vec::new(),
            free: Vec::new(),
            by_guest: HashMap::new(),
        }
    }

    /// Find the live guest stand-in for a host identity, if any.
    pub fn lookup_export(&self, identity: usize) -> Option<Value> {
        let entry = self.exported.get(&identity)?;
        entry.guest.upgrade().map(Value::Object)
    }

    /// Record the guest stand-in for a host identity. An evicted stale
    /// entry, if any, is returned for the caller to drop outside the
    /// registry borrow.
    pub fn insert_export(
        &mut self,
        identity: usize,
        host: HostValue,
        guest: &Rc<RefCell<JsObject>>,
    ) -> Option<HostValue> {
        log::trace!("registry: export host value {:#x}", identity);
        self.exported
            .insert(
                identity,
                ExportEntry {
                    host,
                    guest: Rc::downgrade(guest),
                },
            )
            .map(|entry| entry.host)
    }

    /// Remove the export entry for a host identity, if its stand-in is
    /// gone. Called from the stand-in's finalizer; the check protects a
    /// newer stand-in that may have been registered under the same
    /// identity. Returns the evicted host value for the caller to drop.
    pub fn release_export(&mut self, identity: usize) -> Option<HostValue> {
        let dead = self
            .exported
            .get(&identity)
            .map_or(false, |entry| entry.guest.strong_count() == 0);
        if !dead {
            return None;
        }
        log::trace!("registry: release host value {:#x}", identity);
        self.exported.remove(&identity).map(|entry| entry.host)
    }

    /// Pin a guest value, ensuring the guest collector will not reclaim it.
    /// Pinning the same guest object again shares the existing slot.
    pub fn pin(&mut self, value: Value) -> usize {
        let guest_ptr = match &value {
            Value::Object(obj) => Rc::as_ptr(obj) as usize,
            _ => 0,
        };
        if let Some(&slot) = self.by_guest.get(&guest_ptr) {
            if let Some(pin) = self.pins[slot].as_mut() {
                pin.refs += 1;
                return slot;
            }
        }
        let slot = match self.free.pop() {
            Some(slot) => {
                self.pins[slot] = Some(PinSlot {
                    value,
                    refs: 1,
                    guest_ptr,
                });
                slot
            }
            None => {
                self.pins.push(Some(PinSlot {
                    value,
                    refs: 1,
                    guest_ptr,
                }));
                self.pins.len() - 1
            }
        };
        self.by_guest.insert(guest_ptr, slot);
        log::trace!("registry: pin guest value in slot {}", slot);
        slot
    }

    /// The guest value held in a pin slot.
    pub fn pinned(&self, slot: usize) -> Option<Value> {
        self.pins.get(slot)?.as_ref().map(|pin| pin.value.clone())
    }

    /// Drop one reference to a pin slot. When the last reference goes, the
    /// strong guest value is evicted and returned for the caller to drop.
    pub fn unpin(&mut self, slot: usize) -> Option<Value> {
        let pin = self.pins.get_mut(slot)?.as_mut()?;
        pin.refs -= 1;
        if pin.refs > 0 {
            return None;
        }
        let pin = self.pins[slot].take()?;
        self.by_guest.remove(&pin.guest_ptr);
        self.free.push(slot);
        log::trace!("registry: unpin slot {}", slot);
        Some(pin.value)
    }

    /// Force-release everything; context teardown. Returns the evicted
    /// values for the caller to drop outside the registry borrow.
    pub fn take_all(&mut self) -> (Vec<HostValue>, Vec<Value>) {
        let hosts = self
            .exported
            .drain()
            .map(|(_, entry)| entry.host)
            .collect();
        let values = self
            .pins
            .drain(..)
            .flatten()
            .map(|pin| pin.value)
            .collect();
        self.free.clear();
        self.by_guest.clear();
        (hosts, values)
    }

    /// Number of live export entries.
    pub fn exported_len(&self) -> usize {
        self.exported.len()
    }

    /// Number of live pin slots.
    pub fn pinned_len(&self) -> usize {
        self.pins.iter().flatten().count()
    }
}
